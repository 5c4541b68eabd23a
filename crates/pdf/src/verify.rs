//! 烧录后校验
//!
//! 重新提取已处理页面的文字：被脱敏的候选文本不应再出现，
//! 脱敏区域内也不应再有可提取的字符。

use std::collections::BTreeMap;

use lopdf::{Document, ObjectId};
use pdfium_render::prelude::*;
use veil_core::snippet::log_text;
use veil_core::Region;

/// 短于该长度的候选不做全文比对
const MIN_CHECK_LEN: usize = 4;

/// 一个已烧录页面的校验输入
#[derive(Debug, Clone)]
pub struct PageCheck {
    pub page_no: u32,
    pub page_id: ObjectId,
    pub regions: Vec<Region>,
    pub texts: Vec<String>,
}

fn normalize(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 返回仍然泄露的页面及泄露的文本
pub fn find_leaks(
    doc: &Document,
    checks: &[PageCheck],
    pdfium: Option<&Pdfium>,
) -> BTreeMap<u32, Vec<String>> {
    let mut leaks: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for check in checks {
        let page_text = match doc.extract_text(&[check.page_no]) {
            Ok(text) => normalize(&text),
            Err(e) => {
                log::debug!("[Verify] 页面 {} 文本提取失败: {}", check.page_no, e);
                continue;
            }
        };
        for text in &check.texts {
            let needle = normalize(text);
            if needle.chars().count() >= MIN_CHECK_LEN && page_text.contains(&needle) {
                leaks.entry(check.page_no).or_default().push(text.clone());
            }
        }
    }

    if let Some(pdfium) = pdfium {
        match region_leaks(doc, checks, pdfium) {
            Ok(found) => {
                for (page_no, texts) in found {
                    leaks.entry(page_no).or_default().extend(texts);
                }
            }
            Err(e) => log::warn!("[Verify] pdfium 校验失败: {}", e),
        }
    }

    for (page_no, texts) in &leaks {
        for text in texts {
            log::warn!("[Verify] 页面 {} 仍可提取: {}", page_no, log_text(text));
        }
    }
    leaks
}

/// 用 pdfium 检查区域内是否还有字符
fn region_leaks(
    doc: &Document,
    checks: &[PageCheck],
    pdfium: &Pdfium,
) -> Result<BTreeMap<u32, Vec<String>>, String> {
    let mut bytes = Vec::new();
    doc.clone()
        .save_to(&mut bytes)
        .map_err(|e| format!("序列化失败: {}", e))?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(|e| format!("加载 PDF 失败: {}", e))?;

    let mut leaks = BTreeMap::new();
    for check in checks {
        let page = document
            .pages()
            .get((check.page_no - 1) as u16)
            .map_err(|e| format!("获取页面 {} 失败: {}", check.page_no, e))?;
        let text = page
            .text()
            .map_err(|e| format!("页面 {} 提取文本失败: {}", check.page_no, e))?;

        let mut leaked = String::new();
        for ch in text.chars().iter() {
            let Some(c) = ch.unicode_char() else {
                continue;
            };
            if c.is_whitespace() {
                continue;
            }
            let Ok(bounds) = ch.tight_bounds() else {
                continue;
            };
            let x = (bounds.left().value + bounds.right().value) / 2.0;
            let y = (bounds.bottom().value + bounds.top().value) / 2.0;
            if check.regions.iter().any(|r| r.contains(x, y, 0.0)) {
                leaked.push(c);
            }
        }
        if !leaked.is_empty() {
            leaks.insert(check.page_no, vec![leaked]);
        }
    }
    Ok(leaks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ignores_whitespace() {
        assert_eq!(normalize(" 98 76\n54 "), "987654");
    }

    #[test]
    fn test_short_candidates_are_not_compared() {
        let doc = Document::with_version("1.5");
        let checks = vec![PageCheck {
            page_no: 1,
            page_id: (1, 0),
            regions: Vec::new(),
            texts: vec!["Dr".to_string()],
        }];
        assert!(find_leaks(&doc, &checks, None).is_empty());
    }
}
