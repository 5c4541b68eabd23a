//! 图像预处理模块
//!
//! UltraFace 模型输入为 320x240 的 RGB 图像，归一化方式 (x - 127) / 128

use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;

pub const INPUT_WIDTH: u32 = 320;
pub const INPUT_HEIGHT: u32 = 240;

const MEAN: f32 = 127.0;
const SCALE: f32 = 128.0;

/// 为检测模型准备 NCHW 输入，灰度值复制到三个通道
pub fn prepare_input(gray: &GrayImage) -> Array4<f32> {
    let resized = image::imageops::resize(gray, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

    let (w, h) = (INPUT_WIDTH as usize, INPUT_HEIGHT as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = (pixel[0] as f32 - MEAN) / SCALE;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = value;
        }
    }
    tensor
}
