//! 工作簿（.xlsx）处理器
//!
//! 逐个工作表、逐行、逐单元格判定。字符串整格替换为占位符；
//! 数值只做窄判定（10 位连续数字或 4 位以上纯数字）；日期格式的数值、
//! 布尔值、错误值和空单元格不动。

use std::collections::{HashMap, HashSet};
use std::path::Path;

use veil_core::snippet::log_text;
use veil_core::{decimal_text, ContentUnit, Document, RedactContext, RedactionStats, Result};

use crate::package::Package;
use crate::xml::{Element, Node, XmlDocument};
use crate::{open_package, parse_part, save_package};

const KIND: &str = "xlsx";
const WORKBOOK: &str = "xl/workbook.xml";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const STYLES: &str = "xl/styles.xml";

pub struct SpreadsheetDocument {
    package: Package,
}

impl SpreadsheetDocument {
    pub fn package(&self) -> &Package {
        &self.package
    }

    fn worksheet_parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = self
            .package
            .names()
            .filter(|n| n.starts_with("xl/worksheets/") && n.ends_with(".xml"))
            .filter(|n| !n["xl/worksheets/".len()..].contains('/'))
            .map(str::to_string)
            .collect();
        parts.sort();
        parts
    }
}

impl Document for SpreadsheetDocument {
    fn load(path: &Path) -> Result<Self> {
        let package = open_package(path, KIND, WORKBOOK)?;
        Ok(Self { package })
    }

    fn redact(&mut self, ctx: &RedactContext) -> Result<RedactionStats> {
        let mut stats = RedactionStats::default();
        let placeholder = ctx.placeholder();

        let date_styles = if self.package.contains(STYLES) {
            date_style_indices(&parse_part(&self.package, STYLES, KIND)?)
        } else {
            HashSet::new()
        };

        // 共享字符串：同一下标的所有引用单元格取值相同，判定一次即可
        let mut shared = match self.package.get(SHARED_STRINGS) {
            Some(_) => Some(parse_part(&self.package, SHARED_STRINGS, KIND)?),
            None => None,
        };
        let shared_sensitive: Vec<bool> = match shared.as_ref().and_then(|d| d.root()) {
            Some(sst) => sst
                .elements()
                .filter(|e| e.local_name() == "si")
                .map(|si| ctx.classifier.is_sensitive(&ContentUnit::text(string_item_text(si))))
                .collect(),
            None => Vec::new(),
        };
        let mut shared_used: HashSet<usize> = HashSet::new();

        for part in self.worksheet_parts() {
            let mut doc = parse_part(&self.package, &part, KIND)?;
            let mut sheet_stats = RedactionStats::default();
            let mut modified = false;

            if let Some(root) = doc.root_mut() {
                if let Some(sheet_data) = root.elements_mut().find(|e| e.local_name() == "sheetData") {
                    for row in sheet_data.elements_mut().filter(|e| e.local_name() == "row") {
                        for cell in row.elements_mut().filter(|e| e.local_name() == "c") {
                            let outcome = redact_cell(
                                cell,
                                ctx,
                                &date_styles,
                                &shared_sensitive,
                                placeholder,
                            );
                            match outcome {
                                CellOutcome::Skipped => {}
                                CellOutcome::Kept => sheet_stats.units_examined += 1,
                                CellOutcome::Replaced => {
                                    modified = true;
                                    sheet_stats.units_examined += 1;
                                    sheet_stats.units_redacted += 1;
                                }
                                CellOutcome::Shared { index, sensitive } => {
                                    sheet_stats.units_examined += 1;
                                    if sensitive {
                                        sheet_stats.units_redacted += 1;
                                        shared_used.insert(index);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if sheet_stats.units_redacted > 0 {
                log::info!(
                    "[Sheet] {}: 检查 {} 个单元格，遮盖 {} 个",
                    part,
                    sheet_stats.units_examined,
                    sheet_stats.units_redacted
                );
                sheet_stats.pages_touched = 1;
            }
            if modified {
                let bytes = doc.to_bytes().map_err(|e| e.into_redact_error(KIND))?;
                self.package.replace(&part, bytes);
            }
            stats.merge(sheet_stats);
        }

        if let Some(sst_doc) = shared.as_mut() {
            let rewritten = rewrite_shared_strings(sst_doc, &shared_sensitive, placeholder);
            if rewritten > 0 {
                log::info!(
                    "[Sheet] 共享字符串改写 {} 条（被单元格引用 {} 条）",
                    rewritten,
                    shared_used.len()
                );
                let bytes = sst_doc.to_bytes().map_err(|e| e.into_redact_error(KIND))?;
                self.package.replace(SHARED_STRINGS, bytes);
            }
        }

        Ok(stats)
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_package(&self.package, path, KIND)
    }
}

enum CellOutcome {
    /// 空、布尔、错误、日期单元格
    Skipped,
    Kept,
    Replaced,
    Shared { index: usize, sensitive: bool },
}

fn redact_cell(
    cell: &mut Element,
    ctx: &RedactContext,
    date_styles: &HashSet<usize>,
    shared_sensitive: &[bool],
    placeholder: &str,
) -> CellOutcome {
    let cell_type = cell.attr("t").unwrap_or("n").to_string();

    // 公式单元格的值是 "=" 加公式文本
    let formula_value = cell.elements().find(|e| e.local_name() == "f").map(|formula| format!("={}", formula.text()));
    if let Some(value) = formula_value {
        return replace_if(cell, ctx.classifier.is_sensitive(&ContentUnit::text(&value)), &value, placeholder);
    }

    match cell_type.as_str() {
        "s" => {
            let index = match cell_value(cell).and_then(|v| v.trim().parse::<usize>().ok()) {
                Some(index) => index,
                None => return CellOutcome::Skipped,
            };
            let sensitive = shared_sensitive.get(index).copied().unwrap_or(false);
            CellOutcome::Shared { index, sensitive }
        }
        "inlineStr" => {
            let text = cell
                .elements()
                .find(|e| e.local_name() == "is")
                .map(string_item_text)
                .unwrap_or_default();
            if text.is_empty() {
                return CellOutcome::Skipped;
            }
            replace_if(cell, ctx.classifier.is_sensitive(&ContentUnit::text(&text)), &text, placeholder)
        }
        "str" => match cell_value(cell) {
            Some(text) if !text.is_empty() => {
                replace_if(cell, ctx.classifier.is_sensitive(&ContentUnit::text(&text)), &text, placeholder)
            }
            _ => CellOutcome::Skipped,
        },
        "n" => {
            let style = cell.attr("s").and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
            if date_styles.contains(&style) {
                return CellOutcome::Skipped;
            }
            let decimal = match cell_value(cell).and_then(|v| decimal_text(&v)) {
                Some(decimal) => decimal,
                None => return CellOutcome::Skipped,
            };
            replace_if(cell, ctx.classifier.is_sensitive(&ContentUnit::number(&decimal)), &decimal, placeholder)
        }
        // b / e / d
        _ => CellOutcome::Skipped,
    }
}

fn replace_if(cell: &mut Element, sensitive: bool, value: &str, placeholder: &str) -> CellOutcome {
    if !sensitive {
        return CellOutcome::Kept;
    }
    log::debug!(
        "[Sheet] 遮盖单元格 {}: {}",
        cell.attr("r").unwrap_or("?"),
        log_text(value)
    );
    set_inline_string(cell, placeholder);
    CellOutcome::Replaced
}

/// 把单元格改写成内联字符串，去掉公式和缓存值
fn set_inline_string(cell: &mut Element, text: &str) {
    cell.children.retain(|node| match node {
        Node::Element(e) => !matches!(e.local_name(), "f" | "v" | "is"),
        _ => true,
    });
    cell.set_attr("t", "inlineStr");

    let mut t = Element::with_text(prefixed(&cell.name, "t"), text);
    t.set_attr("xml:space", "preserve");
    let mut is = Element::new(prefixed(&cell.name, "is"));
    is.children.push(Node::Element(t));

    // <is> 必须位于 <extLst> 之前
    let position = cell
        .children
        .iter()
        .position(|n| matches!(n, Node::Element(e) if e.local_name() == "extLst"))
        .unwrap_or(cell.children.len());
    cell.children.insert(position, Node::Element(is));
    cell.self_closing = false;
}

/// 沿用所在元素的命名空间前缀
fn prefixed(sibling: &str, local: &str) -> String {
    match sibling.rsplit_once(':') {
        Some((prefix, _)) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

fn cell_value(cell: &Element) -> Option<String> {
    cell.elements()
        .find(|e| e.local_name() == "v")
        .map(|v| v.text())
}

/// `<si>` / `<is>` 的文本：直接的 `<t>` 加各个 `<r>` 中的 `<t>`，忽略注音 `<rPh>`
fn string_item_text(item: &Element) -> String {
    let mut out = String::new();
    for child in item.elements() {
        match child.local_name() {
            "t" => out.push_str(&child.text()),
            "r" => {
                for t in child.elements().filter(|e| e.local_name() == "t") {
                    out.push_str(&t.text());
                }
            }
            _ => {}
        }
    }
    out
}

fn rewrite_shared_strings(doc: &mut XmlDocument, sensitive: &[bool], placeholder: &str) -> usize {
    let Some(sst) = doc.root_mut() else {
        return 0;
    };
    let mut rewritten = 0;
    for (index, si) in sst
        .elements_mut()
        .filter(|e| e.local_name() == "si")
        .enumerate()
    {
        if !sensitive.get(index).copied().unwrap_or(false) {
            continue;
        }
        let mut t = Element::with_text(prefixed(&si.name, "t"), placeholder);
        t.set_attr("xml:space", "preserve");
        si.children = vec![Node::Element(t)];
        si.self_closing = false;
        rewritten += 1;
    }
    rewritten
}

// ============================================================================
// 日期格式识别
// ============================================================================

/// 内置的日期 / 时间格式编号
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// 自定义格式代码是否表示日期或时间
fn is_date_format_code(code: &str) -> bool {
    if code.eq_ignore_ascii_case("general") {
        return false;
    }
    // 只看第一个分段
    let section = code.split(';').next().unwrap_or("");

    let mut stripped = String::new();
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for inner in chars.by_ref() {
                    if inner == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut bracket = String::new();
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    bracket.push(inner);
                }
                // [h] [mm] [ss] 是经过时间
                let lower = bracket.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            other => stripped.push(other),
        }
    }

    stripped
        .chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'd' | 'm' | 'y' | 'h' | 's'))
}

/// styles.xml 中 cellXfs 下使用日期格式的样式下标
fn date_style_indices(styles: &XmlDocument) -> HashSet<usize> {
    let mut result = HashSet::new();
    let Some(root) = styles.root() else {
        return result;
    };

    let custom: HashMap<u32, String> = root
        .elements()
        .find(|e| e.local_name() == "numFmts")
        .map(|fmts| {
            fmts.elements()
                .filter(|e| e.local_name() == "numFmt")
                .filter_map(|f| {
                    let id = f.attr("numFmtId")?.parse::<u32>().ok()?;
                    Some((id, f.attr("formatCode").unwrap_or("").to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(xfs) = root.elements().find(|e| e.local_name() == "cellXfs") {
        for (index, xf) in xfs.elements().filter(|e| e.local_name() == "xf").enumerate() {
            let id = xf
                .attr("numFmtId")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0);
            let is_date = match custom.get(&id) {
                Some(code) => is_date_format_code(code),
                None => is_builtin_date_format(id),
            };
            if is_date {
                result.insert(index);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format_codes() {
        assert!(is_date_format_code("yyyy-mm-dd"));
        assert!(is_date_format_code("[$-409]d-mmm-yy;@"));
        assert!(is_date_format_code("[h]:mm:ss"));
        assert!(!is_date_format_code("General"));
        assert!(!is_date_format_code("0.00"));
        assert!(!is_date_format_code("#,##0 \"days\""));
        assert!(!is_date_format_code("[Red]0.00"));
    }

    #[test]
    fn test_date_style_indices() {
        let styles = XmlDocument::parse(
            br#"<styleSheet><numFmts count="2"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/><numFmt numFmtId="165" formatCode="0.000"/></numFmts><cellXfs count="4"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/><xf numFmtId="165"/></cellXfs></styleSheet>"#,
        )
        .unwrap();
        let dates = date_style_indices(&styles);
        assert_eq!(dates, HashSet::from([1, 2]));
    }

    #[test]
    fn test_string_item_text_skips_phonetic() {
        let doc = XmlDocument::parse(
            br#"<si><r><t>John </t></r><r><t>Smith</t></r><rPh><t>x</t></rPh></si>"#,
        )
        .unwrap();
        assert_eq!(string_item_text(doc.root().unwrap()), "John Smith");
    }

    #[test]
    fn test_set_inline_string_drops_formula() {
        let mut doc = XmlDocument::parse(
            br#"<c r="A1" s="2"><f>CONCAT("a","b")</f><v>ab</v></c>"#,
        )
        .unwrap();
        let cell = doc.root_mut().unwrap();
        set_inline_string(cell, "XX");
        assert_eq!(cell.attr("t"), Some("inlineStr"));
        assert_eq!(cell.attr("s"), Some("2"));
        assert!(cell.child("f").is_none());
        assert!(cell.child("v").is_none());
        assert_eq!(string_item_text(cell.child("is").unwrap()), "XX");
    }
}
