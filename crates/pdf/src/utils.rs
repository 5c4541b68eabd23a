use lopdf::{content::Content, Dictionary, Document, Object, ObjectId, Stream};

use crate::types::PageContentType;

/// 页面字典层级上限，防止 Parent 循环引用
const MAX_TREE_DEPTH: usize = 32;

/// 从 Object 获取数值
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 解引用：Reference 取目标对象，其余原样返回
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// 从数组对象中提取边界框坐标
fn extract_box_values(arr: &[Object]) -> Option<(f32, f32, f32, f32)> {
    let values: Vec<f32> = arr.iter().filter_map(get_number).collect();
    if values.len() == 4 {
        Some((
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ))
    } else {
        None
    }
}

/// 沿 Parent 链查找可继承的页面属性
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict: &Dictionary = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(obj) = dict.get(key) {
            return resolve(doc, obj);
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => dict = doc.get_dictionary(*parent).ok()?,
            _ => return None,
        }
    }
    None
}

/// 获取页面的旋转角度（归一化到 0/90/180/270）
pub fn get_page_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    inherited(doc, page_id, b"Rotate")
        .and_then(get_number)
        .map(|r| (r as i32).rem_euclid(360))
        .unwrap_or(0)
}

/// 获取页面的有效边界框（优先使用 CropBox，否则使用 MediaBox）
/// 返回 (llx, lly, urx, ury)
pub fn get_media_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    let found = [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .iter()
        .find_map(|key| match inherited(doc, page_id, key) {
            Some(Object::Array(arr)) => extract_box_values(arr),
            _ => None,
        });

    found.unwrap_or_else(|| {
        log::warn!("[MediaBox] 页面 {:?} 无边界框，使用默认 Letter 尺寸", page_id);
        (0.0, 0.0, 612.0, 792.0)
    })
}

/// 获取流内容（支持压缩和未压缩的流）
pub fn get_stream_content(stream: &Stream) -> Result<Vec<u8>, String> {
    match stream.decompressed_content() {
        Ok(data) => Ok(data),
        Err(_) => Ok(stream.content.clone()),
    }
}

/// 获取页面的内容流数据，多个内容流用换行拼接
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, String> {
    let dict = doc.get_dictionary(page_id).map_err(|e| e.to_string())?;
    let contents = match dict.get(b"Contents") {
        Ok(obj) => resolve(doc, obj),
        // 没有内容流的页面是空白页
        Err(_) => return Ok(Vec::new()),
    };

    match contents {
        Some(Object::Stream(stream)) => get_stream_content(stream),
        Some(Object::Array(arr)) => {
            let mut all_content = Vec::new();
            for item in arr {
                if let Some(Object::Stream(stream)) = resolve(doc, item) {
                    all_content.extend(get_stream_content(stream)?);
                    all_content.push(b'\n');
                }
            }
            Ok(all_content)
        }
        _ => Err(format!("无法获取页面 {:?} 的内容", page_id)),
    }
}

/// 检测页面内容类型
pub fn detect_page_content_type(content_data: &[u8]) -> PageContentType {
    let content = match Content::decode(content_data) {
        Ok(c) => c,
        Err(_) => return PageContentType::Empty,
    };

    let mut has_image_ops = false;
    let mut path_op_count = 0;
    let mut text_op_count = 0;

    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" | "TJ" | "'" | "\"" => text_op_count += 1,
            "m" | "l" | "c" | "v" | "y" | "h" | "re" => path_op_count += 1,
            "Do" | "BI" => has_image_ops = true,
            _ => {}
        }
    }

    log::debug!(
        "[ContentType] text_ops={}, path_ops={}, image_ops={}",
        text_op_count,
        path_op_count,
        has_image_ops
    );

    let has_text_ops = text_op_count > 0;
    let has_path_ops = path_op_count > 0;

    // 纯图片页面（扫描件）
    if !has_text_ops && !has_path_ops && has_image_ops {
        return PageContentType::ImageBased;
    }
    // 表格边框等少量路径不影响文字型判断
    if has_text_ops && path_op_count < 500 {
        return PageContentType::Text;
    }
    if !has_text_ops && path_op_count > 500 {
        return PageContentType::PathDrawn;
    }
    if has_text_ops || has_path_ops || has_image_ops {
        return PageContentType::Mixed;
    }

    PageContentType::Empty
}
