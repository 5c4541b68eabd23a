//! 栅格化脱敏
//!
//! 使用 pdfium-render 将页面渲染为图片，在图片上绘制黑框，
//! 然后用图片替换原页面内容。这样底层文字完全被销毁，无法复制。

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdfium_render::prelude::*;
use veil_core::Region;

/// 栅格图在页面资源里的名字
const RASTER_NAME: &str = "VeilRaster";

/// 获取 pdfium 库的搜索路径
fn get_pdfium_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());

            // .app/Contents/MacOS/veil -> .app/Contents/Resources/libs
            #[cfg(target_os = "macos")]
            {
                if let Some(contents_dir) = exe_dir.parent() {
                    paths.push(contents_dir.join("Resources").join("libs"));
                    paths.push(contents_dir.join("Resources"));
                }
            }

            #[cfg(target_os = "linux")]
            {
                if let Ok(appdir) = std::env::var("APPDIR") {
                    let appdir_path = PathBuf::from(appdir);
                    paths.push(appdir_path.join("usr").join("lib").join("libs"));
                    paths.push(appdir_path.join("usr").join("lib"));
                }
            }
        }
    }

    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

/// 绑定 pdfium 库：配置路径优先，其次默认位置，最后系统库
pub fn bind_pdfium(configured: Option<&str>) -> Result<Pdfium, String> {
    if let Some(path) = configured {
        let path = PathBuf::from(path);
        // 配置的可能是库文件本身，也可能是所在目录
        let lib_path = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path.clone()
        };
        match Pdfium::bind_to_library(&lib_path) {
            Ok(bindings) => {
                log::info!("[Pdfium] 从配置路径 {:?} 加载", lib_path);
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => log::warn!("[Pdfium] 配置路径 {:?} 加载失败: {}", lib_path, e),
        }
    }

    for path in &get_pdfium_search_paths() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(path);
        log::debug!("[Pdfium] 尝试加载: {:?}", lib_path);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::info!("[Pdfium] 成功从 {:?} 加载", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| format!("Pdfium 库不可用: {}", e))
}

/// 区域（用户空间）换算为像素矩形，超出画布的部分裁掉
pub fn region_to_pixels(
    region: &Region,
    media_box: (f32, f32, f32, f32),
    width: u32,
    height: u32,
) -> Option<Rect> {
    let (llx, lly, urx, ury) = media_box;
    let box_w = urx - llx;
    let box_h = ury - lly;
    if box_w <= 0.0 || box_h <= 0.0 {
        return None;
    }
    let sx = width as f32 / box_w;
    let sy = height as f32 / box_h;

    let left = ((region.left - llx) * sx).floor().max(0.0);
    let top = ((ury - region.top) * sy).floor().max(0.0);
    let right = ((region.right - llx) * sx).ceil().min(width as f32);
    let bottom = ((ury - region.bottom) * sy).ceil().min(height as f32);
    if right <= left || bottom <= top {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}

/// 渲染单页并把区域涂黑
pub fn render_and_redact_page(
    pdfium: &Pdfium,
    pdf_bytes: &[u8],
    page_index: usize,
    regions: &[Region],
    media_box: (f32, f32, f32, f32),
    dpi: u32,
) -> Result<RgbaImage, String> {
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| format!("加载 PDF 失败: {}", e))?;

    let page = document
        .pages()
        .get(page_index as u16)
        .map_err(|e| format!("获取页面 {} 失败: {}", page_index, e))?;

    // PDF 默认 72 DPI
    let scale = dpi as f32 / 72.0;
    let target_width = (page.width().value * scale).round().max(1.0) as i32;
    let target_height = (page.height().value * scale).round().max(1.0) as i32;

    log::info!(
        "[Rasterize] 页面 {}: {}x{} px (DPI: {})",
        page_index + 1,
        target_width,
        target_height,
        dpi
    );

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_target_height(target_height);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("渲染页面失败: {}", e))?;

    let mut image: RgbaImage = bitmap.as_image().to_rgba8();
    let black = Rgba([0u8, 0u8, 0u8, 255u8]);
    let (width, height) = image.dimensions();

    for region in regions {
        if let Some(rect) = region_to_pixels(region, media_box, width, height) {
            draw_filled_rect_mut(&mut image, rect, black);
            log::debug!(
                "[Rasterize] 绘制黑框: ({}, {}, {}, {})",
                rect.left(),
                rect.top(),
                rect.width(),
                rect.height()
            );
        }
    }

    Ok(image)
}

/// 用一张图片替换页面的全部内容和资源
pub fn replace_page_with_image(
    doc: &mut Document,
    page_id: ObjectId,
    image: &RgbaImage,
    media_box: (f32, f32, f32, f32),
) -> Result<(), String> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut jpeg = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| format!("编码 JPEG 失败: {}", e))?;

    let (llx, lly, urx, ury) = media_box;
    let image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => rgb.width() as i64,
            "Height" => rgb.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    )
    .with_compression(false);
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(urx - llx),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(ury - lly),
                    Object::Real(llx),
                    Object::Real(lly),
                ],
            ),
            Operation::new("Do", vec![Object::Name(RASTER_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content.encode().map_err(|e| e.to_string())?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) else {
        return Err(format!("无法获取页面 {:?}", page_id));
    };
    page.set("Contents", content_id);
    page.set(
        "Resources",
        dictionary! {
            "XObject" => dictionary! { RASTER_NAME => image_id },
        },
    );
    page.set(
        "MediaBox",
        vec![
            Object::Real(llx),
            Object::Real(lly),
            Object::Real(urx),
            Object::Real(ury),
        ],
    );
    page.remove(b"CropBox");
    Ok(())
}
