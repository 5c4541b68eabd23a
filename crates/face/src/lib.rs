//! 图片人脸脱敏
//!
//! 检测器只负责给出人脸框；外扩、裁剪和高斯模糊都在这里完成，与检测算法无关。

mod det;
mod error;
mod preprocess;
mod threading;

pub use det::{decode, nms, OnnxFaceDetector};
pub use error::FaceError;

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, ImageReader, Pixel};
use veil_core::{ImageConfig, RedactError, RedactionStats, Result};

/// 检测到的人脸框（原图像素坐标）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

impl FaceRegion {
    pub fn area(&self) -> u32 {
        self.width * self.height
    }
}

/// 人脸检测器接口
pub trait FaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> std::result::Result<Vec<FaceRegion>, FaceError>;
}

/// 外扩后的模糊区域，右下角不含
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BlurRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// 四周外扩 `padding` 像素并裁到图像范围内；完全落在图外时返回 None
pub fn padded_rect(face: &FaceRegion, padding: u32, width: u32, height: u32) -> Option<BlurRect> {
    let x0 = face.x.saturating_sub(padding).min(width);
    let y0 = face.y.saturating_sub(padding).min(height);
    let x1 = face
        .x
        .saturating_add(face.width)
        .saturating_add(padding)
        .min(width);
    let y1 = face
        .y
        .saturating_add(face.height)
        .saturating_add(padding)
        .min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(BlurRect { x0, y0, x1, y1 })
}

fn blur_buffer<P>(buffer: &mut ImageBuffer<P, Vec<u8>>, rect: &BlurRect, sigma: f32)
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let patch = image::imageops::crop_imm(&*buffer, rect.x0, rect.y0, rect.width(), rect.height()).to_image();
    let blurred = imageproc::filter::gaussian_blur_f32(&patch, sigma);
    image::imageops::replace(buffer, &blurred, rect.x0 as i64, rect.y0 as i64);
}

/// 对每个区域单独做高斯模糊，区域外的像素不变
pub fn blur_regions(image: &mut DynamicImage, rects: &[BlurRect], sigma: f32) {
    if rects.is_empty() {
        return;
    }
    match image {
        DynamicImage::ImageLuma8(buffer) => rects.iter().for_each(|r| blur_buffer(buffer, r, sigma)),
        DynamicImage::ImageLumaA8(buffer) => rects.iter().for_each(|r| blur_buffer(buffer, r, sigma)),
        DynamicImage::ImageRgb8(buffer) => rects.iter().for_each(|r| blur_buffer(buffer, r, sigma)),
        DynamicImage::ImageRgba8(buffer) => rects.iter().for_each(|r| blur_buffer(buffer, r, sigma)),
        other => {
            log::debug!("[Face] 颜色类型 {:?} 转为 RGBA8 处理", other.color());
            let mut buffer = other.to_rgba8();
            rects.iter().for_each(|r| blur_buffer(&mut buffer, r, sigma));
            *other = DynamicImage::ImageRgba8(buffer);
        }
    }
}

fn load_image(input: &Path) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let reader = ImageReader::open(input)?
        .with_guessed_format()
        .map_err(|e| RedactError::Load(e.to_string()))?;
    let format = reader.format();
    let image = reader.decode().map_err(|e| RedactError::Load(e.to_string()))?;
    Ok((image, format))
}

fn save_image(image: &DynamicImage, output: &Path, format: ImageFormat) -> Result<()> {
    // JPEG 不支持透明通道
    let converted;
    let image = if format == ImageFormat::Jpeg && image.color().has_alpha() {
        converted = DynamicImage::ImageRgb8(image.to_rgb8());
        &converted
    } else {
        image
    };
    veil_core::write_atomically(output, |file| {
        image
            .write_to(file, format)
            .map_err(|e| RedactError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    })
}

/// 图片脱敏：检测人脸、外扩、模糊后按原格式写出
pub fn redact_image(
    input: &Path,
    output: &Path,
    detector: &mut dyn FaceDetector,
    config: &ImageConfig,
) -> Result<RedactionStats> {
    let (mut image, input_format) = load_image(input)?;
    let format = ImageFormat::from_path(output)
        .ok()
        .or(input_format)
        .ok_or_else(|| RedactError::UnsupportedKind(output.display().to_string()))?;

    let (width, height) = (image.width(), image.height());
    let faces = detector
        .detect(&image.to_luma8())
        .map_err(|e| RedactError::Detector(e.to_string()))?;

    let rects: Vec<BlurRect> = faces
        .iter()
        .filter_map(|face| padded_rect(face, config.padding, width, height))
        .collect();
    for rect in &rects {
        log::debug!(
            "[Face] 模糊区域: ({}, {}) {}x{}",
            rect.x0,
            rect.y0,
            rect.width(),
            rect.height()
        );
    }
    blur_regions(&mut image, &rects, config.blur_sigma);

    save_image(&image, output, format)?;

    log::info!(
        "[Face] {}x{} 图片，检测 {} 张人脸，模糊 {} 个区域",
        width,
        height,
        faces.len(),
        rects.len()
    );
    Ok(RedactionStats {
        units_examined: faces.len(),
        units_redacted: rects.len(),
        pages_touched: usize::from(!rects.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn face(x: u32, y: u32, width: u32, height: u32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width,
            height,
            score: 0.9,
        }
    }

    #[test]
    fn test_padded_rect_clamps_to_bounds() {
        let rect = padded_rect(&face(5, 20, 60, 60), 10, 70, 200).unwrap();
        assert_eq!(rect, BlurRect { x0: 0, y0: 10, x1: 70, y1: 90 });
    }

    #[test]
    fn test_padded_rect_outside_image() {
        assert!(padded_rect(&face(500, 500, 60, 60), 10, 100, 100).is_none());
    }

    #[test]
    fn test_blur_regions_only_touches_rects() {
        let mut buffer = RgbImage::new(40, 40);
        for (x, y, pixel) in buffer.enumerate_pixels_mut() {
            *pixel = if (x + y) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        }
        let original = buffer.clone();
        let mut image = DynamicImage::ImageRgb8(buffer);
        let rect = BlurRect { x0: 10, y0: 10, x1: 20, y1: 20 };
        blur_regions(&mut image, &[rect], 3.0);

        let result = image.to_rgb8();
        for (x, y, pixel) in result.enumerate_pixels() {
            if !rect.contains(x, y) {
                assert_eq!(pixel, original.get_pixel(x, y));
            }
        }
        assert_ne!(result.get_pixel(15, 15), original.get_pixel(15, 15));
    }
}
