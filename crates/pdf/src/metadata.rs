//! 元数据清理
//!
//! 作者、标题等文档信息本身就可能是个人信息，脱敏后一并清理。

use chrono::Local;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// 写入 Producer 的工具名
pub const PRODUCER: &str = "Veil";

/// 清理结果
#[derive(Debug, Clone, Default)]
pub struct CleanResult {
    pub items_removed: usize,
    pub details: Vec<String>,
}

impl CleanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, detail: String) {
        self.items_removed += 1;
        self.details.push(detail);
    }

    pub fn merge(&mut self, other: CleanResult) {
        self.items_removed += other.items_removed;
        self.details.extend(other.details);
    }
}

/// 清理 Info 字典（文档信息）
///
/// 删除 Title, Author, Subject, Keywords, Creator, Producer, CreationDate, ModDate
pub fn clean_info_dict(doc: &mut Document) -> Result<CleanResult, String> {
    let mut result = CleanResult::new();

    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => *id,
        Ok(Object::Dictionary(_)) => {
            // 直接内嵌在 trailer 里的 Info
            doc.trailer.remove(b"Info");
            result.add("已移除内嵌 Info 字典".to_string());
            return Ok(result);
        }
        _ => return Ok(result),
    };

    if let Ok(Object::Dictionary(ref mut info_dict)) = doc.get_object_mut(info_id) {
        let fields_to_remove = [
            b"Title".as_slice(),
            b"Author".as_slice(),
            b"Subject".as_slice(),
            b"Keywords".as_slice(),
            b"Creator".as_slice(),
            b"Producer".as_slice(),
            b"CreationDate".as_slice(),
            b"ModDate".as_slice(),
        ];

        for field in &fields_to_remove {
            if info_dict.has(field) {
                info_dict.remove(field);
                result.add(format!("已移除 Info/{}", String::from_utf8_lossy(field)));
            }
        }
    }

    // 清空后整个移除
    if let Ok(Object::Dictionary(info_dict)) = doc.get_object(info_id) {
        if info_dict.is_empty() {
            doc.trailer.remove(b"Info");
            doc.objects.remove(&info_id);
            result.add("已移除空的 Info 字典".to_string());
        }
    }

    log::debug!("[Metadata] Info 字典清理: {} 项", result.items_removed);
    Ok(result)
}

/// 清理 XMP 元数据（Catalog 中的 /Metadata 流）
pub fn clean_xmp_metadata(doc: &mut Document) -> Result<CleanResult, String> {
    let mut result = CleanResult::new();
    let catalog_id = get_catalog_id(doc)?;

    let metadata_ref = match doc.get_object(catalog_id) {
        Ok(Object::Dictionary(catalog)) => match catalog.get(b"Metadata") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(_) => None,
            Err(_) => return Ok(result),
        },
        _ => None,
    };

    if let Some(metadata_id) = metadata_ref {
        doc.objects.remove(&metadata_id);
        result.add(format!("已移除 XMP Metadata 流 {:?}", metadata_id));
    }
    if let Ok(Object::Dictionary(ref mut catalog)) = doc.get_object_mut(catalog_id) {
        if catalog.has(b"Metadata") {
            catalog.remove(b"Metadata");
            result.add("已从 Catalog 移除 Metadata 引用".to_string());
        }
    }

    log::debug!("[Metadata] XMP 清理: {} 项", result.items_removed);
    Ok(result)
}

fn get_catalog_id(doc: &Document) -> Result<ObjectId, String> {
    match doc.trailer.get(b"Root") {
        Ok(Object::Reference(id)) => Ok(*id),
        _ => Err("无法获取文档 Catalog".to_string()),
    }
}

fn literal(value: &str) -> Object {
    Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
}

/// 标记文档已脱敏：Producer、ModDate 以及 Redacted 字段
pub fn set_redaction_metadata(doc: &mut Document) -> Result<(), String> {
    let info_id = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => *id,
        _ => {
            let new_id = doc.add_object(Object::Dictionary(Dictionary::new()));
            doc.trailer.set(b"Info", Object::Reference(new_id));
            new_id
        }
    };

    // PDF 日期格式 D:YYYYMMDDHHmmSS+hhmm
    let pdf_date = format!("D:{}", Local::now().format("%Y%m%d%H%M%S%z"));
    let producer = format!("{} v{}", PRODUCER, env!("CARGO_PKG_VERSION"));

    if let Ok(Object::Dictionary(ref mut info_dict)) = doc.get_object_mut(info_id) {
        info_dict.set(b"Producer", literal(&producer));
        info_dict.set(b"ModDate", literal(&pdf_date));
        info_dict.set(b"Redacted", literal("true"));
        info_dict.set(b"RedactedAt", literal(&pdf_date));
    }

    log::info!("[Metadata] 已设置脱敏元信息: Producer={}, ModDate={}", producer, pdf_date);
    Ok(())
}
