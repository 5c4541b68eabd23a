//! 文档（.docx）处理器
//!
//! 对正文、页眉、页脚中的每个段落（含表格单元格、文本框里的嵌套段落）
//! 拼出段落文本，交给替换引擎找出命中片段，再把结果写回各个 `w:t`。
//! 未命中的字符留在原来的 run 里，格式不变；每个片段的占位符放在
//! 片段起点所在的 run 中。

use std::path::Path;

use veil_core::snippet::log_text;
use veil_core::substitute::{apply_spans, Span};
use veil_core::{Document, RedactContext, RedactionStats, Result, Substituter};

use crate::package::Package;
use crate::xml::{Element, Node, XmlDocument};
use crate::{open_package, parse_part, save_package};

const KIND: &str = "docx";
const MAIN_PART: &str = "word/document.xml";

pub struct WordDocument {
    package: Package,
}

impl WordDocument {
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// 正文 + 页眉 + 页脚
    fn text_parts(&self) -> Vec<String> {
        let mut parts = vec![MAIN_PART.to_string()];
        let mut extra: Vec<String> = self
            .package
            .names()
            .filter(|n| is_header_or_footer(n))
            .map(str::to_string)
            .collect();
        extra.sort();
        parts.extend(extra);
        parts
    }
}

fn is_header_or_footer(name: &str) -> bool {
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    if file.contains('/') || !file.ends_with(".xml") {
        return false;
    }
    let stem = &file[..file.len() - 4];
    ["header", "footer"].iter().any(|prefix| {
        stem.strip_prefix(prefix)
            .map(|rest| rest.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    })
}

impl Document for WordDocument {
    fn load(path: &Path) -> Result<Self> {
        let package = open_package(path, KIND, MAIN_PART)?;
        Ok(Self { package })
    }

    fn redact(&mut self, ctx: &RedactContext) -> Result<RedactionStats> {
        let mut stats = RedactionStats::default();

        for part in self.text_parts() {
            let mut doc = parse_part(&self.package, &part, KIND)?;
            let mut part_stats = RedactionStats::default();
            if let Some(root) = doc.root_mut() {
                redact_paragraphs(root, &ctx.substituter, &mut part_stats);
            }

            if part_stats.units_redacted > 0 {
                log::info!(
                    "[Word] {}: 检查 {} 个段落，改写 {} 个",
                    part,
                    part_stats.units_examined,
                    part_stats.units_redacted
                );
                let bytes = doc.to_bytes().map_err(|e| e.into_redact_error(KIND))?;
                self.package.replace(&part, bytes);
                part_stats.pages_touched = 1;
            }
            stats.merge(part_stats);
        }

        Ok(stats)
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_package(&self.package, path, KIND)
    }
}

/// 遍历所有段落，包括嵌套在表格、文本框中的段落
fn redact_paragraphs(el: &mut Element, substituter: &Substituter, stats: &mut RedactionStats) {
    if el.name == "w:p" {
        redact_paragraph(el, substituter, stats);
    }
    for child in el.elements_mut() {
        redact_paragraphs(child, substituter, stats);
    }
}

#[derive(Debug)]
enum SegmentKind {
    Text,
    /// w:tab / w:br / w:cr
    Separator,
}

#[derive(Debug)]
struct Segment {
    /// 相对段落元素的子节点下标路径
    path: Vec<usize>,
    kind: SegmentKind,
    start: usize,
    end: usize,
}

/// 收集段落自身的文本片段，不进入嵌套段落和属性元素
fn collect_segments(
    el: &Element,
    path: &mut Vec<usize>,
    text: &mut String,
    out: &mut Vec<Segment>,
) {
    for (index, child) in el.children.iter().enumerate() {
        let Node::Element(child) = child else {
            continue;
        };
        path.push(index);
        match child.name.as_str() {
            "w:p" | "w:pPr" | "w:rPr" | "w:delText" | "w:instrText" => {}
            "w:t" => {
                let start = text.len();
                text.push_str(&child.text());
                out.push(Segment {
                    path: path.clone(),
                    kind: SegmentKind::Text,
                    start,
                    end: text.len(),
                });
            }
            "w:tab" | "w:br" | "w:cr" => {
                let start = text.len();
                text.push(if child.name == "w:tab" { '\t' } else { '\n' });
                out.push(Segment {
                    path: path.clone(),
                    kind: SegmentKind::Separator,
                    start,
                    end: text.len(),
                });
            }
            _ => collect_segments(child, path, text, out),
        }
        path.pop();
    }
}

fn redact_paragraph(p: &mut Element, substituter: &Substituter, stats: &mut RedactionStats) {
    let mut text = String::new();
    let mut segments = Vec::new();
    collect_segments(p, &mut Vec::new(), &mut text, &mut segments);

    if text.trim().is_empty() {
        return;
    }
    stats.units_examined += 1;

    let spans = substituter.spans(&text);
    if spans.is_empty() {
        return;
    }
    let replaced = apply_spans(&text, &spans, substituter.placeholder());
    if replaced == text {
        return;
    }
    log::debug!("[Word] 段落改写: {}", log_text(&text));
    stats.units_redacted += 1;

    // 每个片段的占位符归属于与它相交的第一个文本 run
    let owners: Vec<Option<usize>> = spans
        .iter()
        .map(|span| {
            segments.iter().position(|seg| {
                matches!(seg.kind, SegmentKind::Text) && seg.start < span.end && seg.end > span.start
            })
        })
        .collect();

    let mut removals: Vec<Vec<usize>> = Vec::new();
    for (seg_index, seg) in segments.iter().enumerate() {
        match seg.kind {
            SegmentKind::Text => {
                let new_text = rewrite_segment(
                    &text,
                    seg,
                    seg_index,
                    &spans,
                    &owners,
                    substituter.placeholder(),
                );
                if new_text != text[seg.start..seg.end] {
                    if let Some(t) = p.descendant_mut(&seg.path) {
                        t.set_text(new_text);
                        t.set_attr("xml:space", "preserve");
                    }
                }
            }
            SegmentKind::Separator => {
                let covered = spans.iter().any(|s| s.start <= seg.start && s.end >= seg.end);
                if covered {
                    removals.push(seg.path.clone());
                }
            }
        }
    }

    // 从后往前删，前面节点的路径不受影响
    removals.sort();
    for path in removals.iter().rev() {
        if let Some((last, parent_path)) = path.split_last() {
            if let Some(parent) = p.descendant_mut(parent_path) {
                if *last < parent.children.len() {
                    parent.children.remove(*last);
                }
            }
        }
    }
}

fn rewrite_segment(
    text: &str,
    seg: &Segment,
    seg_index: usize,
    spans: &[Span],
    owners: &[Option<usize>],
    placeholder: &str,
) -> String {
    let mut out = String::new();
    let mut cursor = seg.start;
    for (span, owner) in spans.iter().zip(owners) {
        if span.end <= seg.start || span.start >= seg.end {
            continue;
        }
        if span.start > cursor {
            out.push_str(&text[cursor..span.start]);
        }
        if *owner == Some(seg_index) {
            out.push_str(placeholder);
        }
        cursor = cursor.max(span.end.min(seg.end));
    }
    if cursor < seg.end {
        out.push_str(&text[cursor..seg.end]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::RedactContext;

    fn paragraph(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    fn run_texts(el: &Element, out: &mut Vec<String>) {
        for child in el.elements() {
            if child.name == "w:t" {
                out.push(child.text());
            } else {
                run_texts(child, out);
            }
        }
    }

    #[test]
    fn test_span_across_runs_goes_to_first_run() {
        let ctx = RedactContext::default();
        let mut doc = paragraph(
            r#"<w:p><w:r><w:t xml:space="preserve">Contact Mr. Sm</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ith at 9876543210</w:t></w:r></w:p>"#,
        );
        let mut stats = RedactionStats::default();
        redact_paragraphs(doc.root_mut().unwrap(), &ctx.substituter, &mut stats);

        let mut texts = Vec::new();
        run_texts(doc.root().unwrap(), &mut texts);
        assert_eq!(texts, vec!["Contact ████████", " at ████████"]);
        assert_eq!(texts.concat(), "Contact ████████ at ████████");
        assert_eq!(stats.units_redacted, 1);
    }

    #[test]
    fn test_untouched_paragraph_keeps_markup() {
        let ctx = RedactContext::default();
        let xml = r#"<w:p><w:r><w:t>nothing here</w:t></w:r></w:p>"#;
        let mut doc = paragraph(xml);
        let mut stats = RedactionStats::default();
        redact_paragraphs(doc.root_mut().unwrap(), &ctx.substituter, &mut stats);
        assert_eq!(String::from_utf8(doc.to_bytes().unwrap()).unwrap(), xml);
        assert_eq!(stats.units_examined, 1);
        assert_eq!(stats.units_redacted, 0);
    }

    #[test]
    fn test_tab_stops_in_properties_are_not_text() {
        let mut text = String::new();
        let mut segments = Vec::new();
        let doc = paragraph(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/></w:r></w:p>"#,
        );
        collect_segments(doc.root().unwrap(), &mut Vec::new(), &mut text, &mut segments);
        assert_eq!(text, "a\tb\n");
        assert_eq!(segments.len(), 4);
    }

    #[test]
    fn test_nested_paragraph_is_separate() {
        let ctx = RedactContext::default();
        let mut doc = paragraph(
            r#"<w:p><w:r><w:t>Outer text</w:t><w:pict><w:txbxContent><w:p><w:r><w:t>mail a@b.com</w:t></w:r></w:p></w:txbxContent></w:pict></w:r></w:p>"#,
        );
        let mut stats = RedactionStats::default();
        redact_paragraphs(doc.root_mut().unwrap(), &ctx.substituter, &mut stats);
        let mut texts = Vec::new();
        run_texts(doc.root().unwrap(), &mut texts);
        assert_eq!(texts, vec!["Outer text", "mail ████████"]);
        assert_eq!(stats.units_examined, 2);
    }

    #[test]
    fn test_covered_line_break_is_removed() {
        let ctx = RedactContext::default();
        let mut doc = paragraph(
            r#"<w:p><w:r><w:t>John</w:t><w:br/><w:t>Smith</w:t></w:r></w:p>"#,
        );
        let mut stats = RedactionStats::default();
        redact_paragraphs(doc.root_mut().unwrap(), &ctx.substituter, &mut stats);
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(!out.contains("<w:br/>"));
        let mut texts = Vec::new();
        run_texts(doc.root().unwrap(), &mut texts);
        assert_eq!(texts.concat(), "████████");
    }

    #[test]
    fn test_header_footer_names() {
        assert!(is_header_or_footer("word/header1.xml"));
        assert!(is_header_or_footer("word/footer.xml"));
        assert!(!is_header_or_footer("word/_rels/header1.xml.rels"));
        assert!(!is_header_or_footer("word/headerstyles.xml"));
    }
}
