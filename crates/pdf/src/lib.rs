//! PDF 处理器
//!
//! 逐页提取候选文本（版面片段 + 单词），判定敏感后把其外接矩形登记为脱敏区域。
//! 文字页直接烧录：区域内字形从内容流里抹掉，再盖上黑框；
//! 路径绘制或混合页面用 pdfium 渲染成图片后替换整页。

pub mod annotations;
pub mod fonts;
pub mod layout;
pub mod metadata;
pub mod render;
pub mod text;
pub mod types;
pub mod utils;
pub mod verify;
pub mod xobject;

use std::path::Path;

use lopdf::{dictionary, Document as LoDocument, Object, ObjectId, Stream};
use pdfium_render::prelude::Pdfium;
use veil_core::snippet::log_text;
use veil_core::{
    Classifier, Document, PdfMode, RedactContext, RedactError, RedactionStats, Region, Result,
};

pub use types::{Glyph, PageAction, PageContentType, PageText, TextCandidate};

const KIND: &str = "pdf";

/// 已加载的 PDF：lopdf 对象树 + 原始字节（供 pdfium 使用）
pub struct PdfDocument {
    doc: LoDocument,
    source: Vec<u8>,
}

impl PdfDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let doc = LoDocument::load_mem(&bytes).map_err(|e| RedactError::invalid(KIND, e))?;
        if doc.is_encrypted() {
            return Err(RedactError::invalid(KIND, "encrypted documents are not supported"));
        }
        Ok(Self { doc, source: bytes })
    }
}

/// PDF 脱敏：读取 `input`，写出到 `output`
pub fn redact_pdf(input: &Path, output: &Path, ctx: &RedactContext) -> Result<RedactionStats> {
    PdfDocument::redact_file(input, output, ctx)
}

/// 按页面内容类型和配置决定处理方式
pub fn choose_action(
    mode: PdfMode,
    content_type: PageContentType,
    rasterizable: bool,
) -> PageAction {
    let wanted = match mode {
        PdfMode::Burn => PageAction::Burn,
        PdfMode::Rasterize => PageAction::Rasterize,
        PdfMode::Auto => match content_type {
            PageContentType::Text | PageContentType::Empty => PageAction::Burn,
            PageContentType::PathDrawn | PageContentType::ImageBased | PageContentType::Mixed => {
                PageAction::Rasterize
            }
        },
    };
    if wanted == PageAction::Rasterize && !rasterizable {
        log::warn!("[PDF] 无法栅格化（pdfium 不可用或页面有旋转），改为烧录");
        return PageAction::Burn;
    }
    wanted
}

/// 判定页面候选，返回脱敏区域和对应文本
pub fn select_regions(
    page: &PageText,
    classifier: &Classifier,
    stats: &mut RedactionStats,
) -> (Vec<Region>, Vec<String>) {
    let mut regions = Vec::new();
    let mut texts = Vec::new();
    for candidate in page.candidates() {
        if candidate.text.trim().is_empty() {
            continue;
        }
        stats.units_examined += 1;
        if classifier.is_sensitive_text(&candidate.text) && !candidate.region.is_empty() {
            log::debug!("[PDF] 命中: {}", log_text(&candidate.text));
            stats.units_redacted += 1;
            regions.push(candidate.region);
            texts.push(candidate.text.clone());
        }
    }
    (regions, texts)
}

/// 烧录单页：抹字（含表单 XObject）、包裹原内容、追加黑框
fn burn_page(
    doc: &mut LoDocument,
    page_id: ObjectId,
    regions: &[Region],
) -> std::result::Result<usize, String> {
    let content = utils::get_page_content(doc, page_id)?;
    let mut scope = xobject::ContentScope::page(doc, page_id);
    let (new_content, blanked) = text::burn_content(&content, &mut scope, regions)?;
    let forms = scope.forms.write_back(doc)?;
    if forms > 0 {
        log::info!("[Burn] 页面 {:?} 改写 {} 个表单 XObject", page_id, forms);
    }

    let content_id = doc.add_object(Stream::new(dictionary! {}, new_content));
    match doc.get_object_mut(page_id) {
        Ok(Object::Dictionary(page)) => {
            page.set("Contents", content_id);
            Ok(blanked)
        }
        _ => Err(format!("无法获取页面 {:?}", page_id)),
    }
}

fn rasterize_page(
    doc: &mut LoDocument,
    pdfium: &Pdfium,
    source: &[u8],
    page_index: usize,
    page_id: ObjectId,
    regions: &[Region],
    dpi: u32,
) -> std::result::Result<(), String> {
    let media_box = utils::get_media_box(doc, page_id);
    let image = render::render_and_redact_page(pdfium, source, page_index, regions, media_box, dpi)?;
    render::replace_page_with_image(doc, page_id, &image, media_box)
}

impl Document for PdfDocument {
    fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    fn redact(&mut self, ctx: &RedactContext) -> Result<RedactionStats> {
        let config = &ctx.config.pdf;
        let pdfium = match render::bind_pdfium(config.pdfium_library_path.as_deref()) {
            Ok(pdfium) => Some(pdfium),
            Err(e) => {
                log::warn!("[PDF] {}，使用内容流版面", e);
                None
            }
        };

        let pages: Vec<(u32, ObjectId)> = self.doc.get_pages().into_iter().collect();
        let layouts = pdfium.as_ref().and_then(|p| match layout::pdfium_page_texts(p, &self.source) {
            Ok(layouts) if layouts.len() == pages.len() => Some(layouts),
            Ok(layouts) => {
                log::warn!(
                    "[PDF] pdfium 页数 {} 与文档页数 {} 不一致，使用内容流版面",
                    layouts.len(),
                    pages.len()
                );
                None
            }
            Err(e) => {
                log::warn!("[PDF] pdfium 版面提取失败: {}，使用内容流版面", e);
                None
            }
        });

        let mut stats = RedactionStats::default();
        let mut burned: Vec<verify::PageCheck> = Vec::new();

        for (index, (page_no, page_id)) in pages.iter().enumerate() {
            let page_text = match layouts.as_ref().and_then(|l| l.get(index)) {
                Some(page_text) => page_text.clone(),
                None => layout::content_page_text(&self.doc, *page_id).unwrap_or_else(|e| {
                    log::warn!("[PDF] 页面 {} 版面提取失败: {}", page_no, e);
                    PageText::default()
                }),
            };

            let (regions, texts) = select_regions(&page_text, &ctx.classifier, &mut stats);
            if regions.is_empty() {
                continue;
            }
            stats.pages_touched += 1;

            let content_type = utils::get_page_content(&self.doc, *page_id)
                .map(|c| utils::detect_page_content_type(&c))
                .unwrap_or(PageContentType::Mixed);
            let rotation = utils::get_page_rotation(&self.doc, *page_id);
            let rasterizable = pdfium.is_some() && rotation == 0;
            let mut action = choose_action(config.mode, content_type, rasterizable);

            log::info!(
                "[PDF] 页面 {}: {:?}, {} 个区域, 处理方式 {:?}",
                page_no,
                content_type,
                regions.len(),
                action
            );

            if action == PageAction::Rasterize {
                if let Some(pdfium) = pdfium.as_ref() {
                    if let Err(e) = rasterize_page(
                        &mut self.doc,
                        pdfium,
                        &self.source,
                        index,
                        *page_id,
                        &regions,
                        config.dpi,
                    ) {
                        log::warn!("[PDF] 页面 {} 栅格化失败: {}，改为烧录", page_no, e);
                        action = PageAction::Burn;
                    }
                }
            }

            if action == PageAction::Burn {
                burn_page(&mut self.doc, *page_id, &regions).map_err(|e| {
                    RedactError::invalid(KIND, format!("page {}: {}", page_no, e))
                })?;
                burned.push(verify::PageCheck {
                    page_no: *page_no,
                    page_id: *page_id,
                    regions: regions.clone(),
                    texts,
                });
            }

            match annotations::redact_annotations(&mut self.doc, *page_id, &regions) {
                Ok(result) if result.items_removed > 0 => {
                    log::info!("[PDF] 页面 {} 注释清理 {} 项", page_no, result.items_removed);
                }
                Ok(_) => {}
                Err(e) => log::warn!("[PDF] 页面 {} 注释处理失败: {}", page_no, e),
            }
        }

        if config.verify && !burned.is_empty() {
            let leaks = verify::find_leaks(&self.doc, &burned, pdfium.as_ref());
            for check in burned.iter().filter(|c| leaks.contains_key(&c.page_no)) {
                let rotation = utils::get_page_rotation(&self.doc, check.page_id);
                match pdfium.as_ref() {
                    Some(pdfium) if rotation == 0 => {
                        let index = (check.page_no - 1) as usize;
                        match rasterize_page(
                            &mut self.doc,
                            pdfium,
                            &self.source,
                            index,
                            check.page_id,
                            &check.regions,
                            config.dpi,
                        ) {
                            Ok(()) => log::info!("[Verify] 页面 {} 已改为栅格化", check.page_no),
                            Err(e) => log::warn!("[Verify] 页面 {} 栅格化失败: {}", check.page_no, e),
                        }
                    }
                    _ => log::warn!(
                        "[Verify] 页面 {} 仍有残留文字，无法栅格化，请人工复核",
                        check.page_no
                    ),
                }
            }
        }

        if config.clean_metadata {
            let mut cleaned = metadata::CleanResult::new();
            for step in [metadata::clean_info_dict, metadata::clean_xmp_metadata] {
                match step(&mut self.doc) {
                    Ok(result) => cleaned.merge(result),
                    Err(e) => log::warn!("[PDF] 元数据清理失败: {}", e),
                }
            }
            for detail in &cleaned.details {
                log::debug!("[Clean] {}", detail);
            }
            log::info!("[Clean] 元数据清理 {} 项", cleaned.items_removed);
        }
        if stats.pages_touched > 0 {
            if let Err(e) = metadata::set_redaction_metadata(&mut self.doc) {
                log::warn!("[PDF] 写入脱敏元信息失败: {}", e);
            }
        }

        if stats.pages_touched > 0 {
            // 被替换的旧内容流仍带着原文，不能留在文件里
            let pruned = self.doc.prune_objects();
            log::debug!("[PDF] 移除 {} 个不再引用的对象", pruned.len());
        }
        self.doc.compress();
        log::info!(
            "[PDF] 检查 {} 个候选，脱敏 {} 个，涉及 {} 页",
            stats.units_examined,
            stats.units_redacted,
            stats.pages_touched
        );
        Ok(stats)
    }

    fn save(&self, path: &Path) -> Result<()> {
        veil_core::write_atomically(path, |file| {
            let mut doc = self.doc.clone();
            doc.save_to(file)
                .map(|_| ())
                .map_err(|e| RedactError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_action() {
        assert_eq!(choose_action(PdfMode::Auto, PageContentType::Text, true), PageAction::Burn);
        assert_eq!(
            choose_action(PdfMode::Auto, PageContentType::PathDrawn, true),
            PageAction::Rasterize
        );
        assert_eq!(choose_action(PdfMode::Auto, PageContentType::Mixed, false), PageAction::Burn);
        assert_eq!(choose_action(PdfMode::Rasterize, PageContentType::Text, false), PageAction::Burn);
        assert_eq!(choose_action(PdfMode::Burn, PageContentType::PathDrawn, true), PageAction::Burn);
    }

    #[test]
    fn test_select_regions() {
        let region = Region::new(72.0, 698.0, 140.0, 710.0);
        let page = PageText {
            spans: vec![TextCandidate {
                text: "salary: 50000".to_string(),
                region,
            }],
            words: vec![
                TextCandidate {
                    text: "salary:".to_string(),
                    region: Region::new(72.0, 698.0, 110.0, 710.0),
                },
                TextCandidate {
                    text: "50000".to_string(),
                    region: Region::new(112.0, 698.0, 140.0, 710.0),
                },
            ],
        };
        let mut stats = RedactionStats::default();
        let (regions, texts) = select_regions(&page, &Classifier::default(), &mut stats);
        assert_eq!(stats.units_examined, 3);
        assert!(texts.contains(&"50000".to_string()));
        assert!(regions.contains(&Region::new(112.0, 698.0, 140.0, 710.0)));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = PdfDocument::from_bytes(b"not a pdf".to_vec()).err().unwrap();
        assert!(matches!(err, RedactError::InvalidFormat { .. }));
    }
}
