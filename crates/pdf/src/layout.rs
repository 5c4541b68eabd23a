//! 页面候选文本提取
//!
//! 优先用 pdfium 的文本段和字符框；pdfium 不可用时回退到内容流遍历，
//! 每个文字显示操作算一个片段。

use lopdf::{Document, ObjectId};
use pdfium_render::prelude::*;
use veil_core::Region;

use crate::text::collect_runs;
use crate::types::{Glyph, PageText, TextCandidate};
use crate::utils::get_page_content;
use crate::xobject::ContentScope;

/// 字形序列按空白、换行和大间距切成单词
pub fn group_words(glyphs: &[Glyph]) -> Vec<TextCandidate> {
    let mut words = Vec::new();
    let mut current: Option<TextCandidate> = None;
    let mut previous: Option<&Glyph> = None;

    for glyph in glyphs {
        if glyph.is_blank() {
            words.extend(current.take());
            previous = None;
            continue;
        }
        if let Some(prev) = previous {
            if breaks_line(prev, glyph) {
                words.extend(current.take());
            }
        }
        match current.as_mut() {
            Some(word) => {
                word.text.push_str(&glyph.text);
                word.region = word.region.union(&glyph.region);
            }
            None => {
                current = Some(TextCandidate {
                    text: glyph.text.clone(),
                    region: glyph.region,
                })
            }
        }
        previous = Some(glyph);
    }
    words.extend(current);
    words
}

/// 两个相邻字形之间是否换行或隔开
fn breaks_line(prev: &Glyph, next: &Glyph) -> bool {
    let height = prev.region.height().max(next.region.height()).max(1.0);
    let (_, prev_y) = prev.center();
    let (_, next_y) = next.center();
    if (prev_y - next_y).abs() > height * 0.5 {
        return true;
    }
    // 回到行首，或两字之间的空隙超过半个字高
    next.region.left < prev.region.left - height * 0.5
        || next.region.left - prev.region.right > height * 0.5
}

/// 由内容流字形序列构造候选
pub fn page_text_from_runs(runs: &[Vec<Glyph>]) -> PageText {
    let mut page = PageText::default();
    for run in runs {
        let visible: Vec<&Glyph> = run.iter().filter(|g| !g.is_blank()).collect();
        let Some(first) = visible.first() else {
            continue;
        };
        let region = visible
            .iter()
            .skip(1)
            .fold(first.region, |acc, g| acc.union(&g.region));
        page.spans.push(TextCandidate {
            text: run.iter().map(|g| g.text.as_str()).collect(),
            region,
        });
        page.words.extend(group_words(run));
    }
    page
}

/// 内容流回退版面，表单 XObject 里的文字一并提取
pub fn content_page_text(doc: &Document, page_id: ObjectId) -> Result<PageText, String> {
    let content = get_page_content(doc, page_id)?;
    if content.is_empty() {
        return Ok(PageText::default());
    }
    let mut scope = ContentScope::page(doc, page_id);
    let runs = collect_runs(&content, &mut scope)?;
    Ok(page_text_from_runs(&runs))
}

fn rect_region(rect: &PdfRect) -> Region {
    Region::new(
        rect.left().value,
        rect.bottom().value,
        rect.right().value,
        rect.top().value,
    )
}

/// pdfium 版面：文本段作为片段，字符按单词分组
pub fn pdfium_page_texts(pdfium: &Pdfium, pdf_bytes: &[u8]) -> Result<Vec<PageText>, String> {
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| format!("加载 PDF 失败: {}", e))?;

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| format!("页面 {} 提取文本失败: {}", index + 1, e))?;

        let mut page_text = PageText::default();
        for segment in text.segments().iter() {
            let value = segment.text();
            if value.trim().is_empty() {
                continue;
            }
            page_text.spans.push(TextCandidate {
                text: value,
                region: rect_region(&segment.bounds()),
            });
        }

        let glyphs: Vec<Glyph> = text
            .chars()
            .iter()
            .filter_map(|ch| {
                let c = ch.unicode_char()?;
                let bounds = ch.loose_bounds().or_else(|_| ch.tight_bounds()).ok()?;
                Some(Glyph {
                    text: c.to_string(),
                    region: rect_region(&bounds),
                })
            })
            .collect();
        page_text.words = group_words(&glyphs);

        log::debug!(
            "[Pdfium] 页面 {}: {} 个片段, {} 个单词",
            index + 1,
            page_text.spans.len(),
            page_text.words.len()
        );
        pages.push(page_text);
    }
    Ok(pages)
}
