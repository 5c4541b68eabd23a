//! 注释处理模块
//!
//! 与脱敏区域相交的注释（批注、链接、表单控件外观等）整体移除

use lopdf::{Dictionary, Document, Object, ObjectId};
use veil_core::Region;

use crate::metadata::CleanResult;
use crate::utils::get_number;

/// 移除与任一区域相交的注释
pub fn redact_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    regions: &[Region],
) -> Result<CleanResult, String> {
    let mut result = CleanResult::new();

    if regions.is_empty() {
        return Ok(result);
    }

    let annot_ids: Vec<ObjectId> = match doc.get_object(page_id) {
        Ok(Object::Dictionary(page_dict)) => match page_dict.get(b"Annots") {
            Ok(annots_ref) => get_annot_ids(doc, annots_ref),
            Err(_) => Vec::new(),
        },
        _ => return Err(format!("无法获取页面 {:?}", page_id)),
    };

    let annots_to_remove: Vec<ObjectId> = annot_ids
        .into_iter()
        .filter(|annot_id| match doc.get_object(*annot_id) {
            Ok(Object::Dictionary(annot_dict)) => get_annot_rect(annot_dict)
                .map(|rect| regions.iter().any(|r| r.intersects(&rect)))
                .unwrap_or(false),
            _ => false,
        })
        .collect();

    if annots_to_remove.is_empty() {
        return Ok(result);
    }

    for annot_id in &annots_to_remove {
        let subtype = match doc.get_object(*annot_id) {
            Ok(Object::Dictionary(annot_dict)) => match annot_dict.get(b"Subtype") {
                Ok(Object::Name(st)) => String::from_utf8_lossy(st).to_string(),
                _ => "Unknown".to_string(),
            },
            _ => "Unknown".to_string(),
        };

        doc.objects.remove(annot_id);
        result.add(format!("已移除注释 {:?} (类型: {})", annot_id, subtype));
    }

    update_page_annots(doc, page_id, &annots_to_remove, &mut result);

    log::info!("[Annots] 页面 {:?} 移除 {} 个注释", page_id, annots_to_remove.len());
    Ok(result)
}

// ============ 辅助函数 ============

fn reference_ids(arr: &[Object]) -> Vec<ObjectId> {
    arr.iter()
        .filter_map(|o| match o {
            Object::Reference(id) => Some(*id),
            _ => None,
        })
        .collect()
}

/// 获取注释 ID 列表
fn get_annot_ids(doc: &Document, annots_ref: &Object) -> Vec<ObjectId> {
    match annots_ref {
        Object::Array(arr) => reference_ids(arr),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => reference_ids(arr),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// 获取注释的矩形区域
fn get_annot_rect(annot_dict: &Dictionary) -> Option<Region> {
    match annot_dict.get(b"Rect") {
        Ok(Object::Array(rect)) if rect.len() == 4 => {
            let values: Vec<f32> = rect.iter().filter_map(get_number).collect();
            if values.len() == 4 {
                Some(Region::new(values[0], values[1], values[2], values[3]))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// 从页面的 Annots 数组中去掉已删除的注释
fn update_page_annots(
    doc: &mut Document,
    page_id: ObjectId,
    removed_ids: &[ObjectId],
    result: &mut CleanResult,
) {
    // 先取出数组，避免借用冲突
    let annots_data: Option<Vec<Object>> = match doc.get_object(page_id) {
        Ok(Object::Dictionary(page_dict)) => match page_dict.get(b"Annots") {
            Ok(Object::Array(arr)) => Some(arr.clone()),
            Ok(Object::Reference(arr_id)) => match doc.get_object(*arr_id) {
                Ok(Object::Array(arr)) => Some(arr.clone()),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    };

    let Some(annots_arr) = annots_data else {
        return;
    };
    let new_annots: Vec<Object> = annots_arr
        .into_iter()
        .filter(|o| match o {
            Object::Reference(id) => !removed_ids.contains(id),
            _ => true,
        })
        .collect();

    if let Ok(Object::Dictionary(ref mut page_dict)) = doc.get_object_mut(page_id) {
        if new_annots.is_empty() {
            page_dict.remove(b"Annots");
            result.add(format!("页面 {:?} 的 Annots 数组已清空并移除", page_id));
        } else {
            page_dict.set(b"Annots", Object::Array(new_annots));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_only_intersecting_annotations_removed() {
        let mut doc = Document::with_version("1.5");
        let hit = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => vec![100.into(), 100.into(), 200.into(), 120.into()],
        });
        let miss = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Link",
            "Rect" => vec![300.into(), 300.into(), 350.into(), 320.into()],
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Annots" => vec![hit.into(), miss.into()],
        });

        let regions = [Region::new(150.0, 110.0, 250.0, 130.0)];
        let result = redact_annotations(&mut doc, page_id, &regions).unwrap();
        assert_eq!(result.items_removed, 1);
        assert!(doc.get_object(hit).is_err());
        assert!(doc.get_object(miss).is_ok());

        let page = doc.get_dictionary(page_id).unwrap();
        let annots = page.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);
    }

    #[test]
    fn test_annots_entry_dropped_when_empty() {
        let mut doc = Document::with_version("1.5");
        let hit = doc.add_object(dictionary! {
            "Subtype" => "Highlight",
            "Rect" => vec![0.into(), 0.into(), 10.into(), 10.into()],
        });
        let page_id = doc.add_object(dictionary! { "Annots" => vec![hit.into()] });
        let regions = [Region::new(5.0, 5.0, 6.0, 6.0)];
        let result = redact_annotations(&mut doc, page_id, &regions).unwrap();
        assert_eq!(result.items_removed, 2);
        assert!(doc.get_dictionary(page_id).unwrap().get(b"Annots").is_err());
    }
}
