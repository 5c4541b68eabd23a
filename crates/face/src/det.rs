//! 人脸检测模块
//!
//! 使用 UltraFace (RFB-320) ONNX 模型：输出每个先验框的背景/人脸得分
//! 和归一化坐标 (x1, y1, x2, y2)，再按阈值、最小尺寸和 NMS 过滤

use ndarray::ArrayViewD;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use image::GrayImage;
use veil_core::ImageConfig;

use crate::error::FaceError;
use crate::preprocess;
use crate::threading::apply_session_threads;
use crate::{FaceDetector, FaceRegion};

/// NMS 的 IoU 阈值
const IOU_THRESH: f32 = 0.3;

/// ONNX 人脸检测器
pub struct OnnxFaceDetector {
    session: Session,
    score_threshold: f32,
    min_face_size: u32,
}

impl OnnxFaceDetector {
    /// 从 ONNX 模型文件创建检测器
    pub fn new(model_path: &Path, config: &ImageConfig) -> Result<Self, FaceError> {
        if !model_path.exists() {
            return Err(FaceError::ModelLoad(format!("模型文件不存在: {}", model_path.display())));
        }
        log::info!("[Face] 加载检测模型: {}", model_path.display());

        let builder = Session::builder()
            .map_err(|e: ort::Error| FaceError::ModelLoad(e.to_string()))?;
        let builder = apply_session_threads(builder)
            .map_err(|e| FaceError::ModelLoad(e.to_string()))?;
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| FaceError::ModelLoad(format!("加载检测模型失败: {}", e)))?;

        Ok(Self {
            session,
            score_threshold: config.score_threshold,
            min_face_size: config.min_face_size,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceRegion>, FaceError> {
        let (orig_w, orig_h) = gray.dimensions();
        let input = preprocess::prepare_input(gray);
        let input_tensor = Tensor::from_array(input)
            .map_err(|e| FaceError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| FaceError::Inference(format!("检测推理失败: {}", e)))?;
        if outputs.len() < 2 {
            return Err(FaceError::Inference(format!("模型输出数量不足: {}", outputs.len())));
        }

        // 复制数据以避免借用冲突
        let first = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| FaceError::Inference(e.to_string()))?
            .to_owned();
        let second = outputs[1]
            .try_extract_array::<f32>()
            .map_err(|e| FaceError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);

        // 导出的模型输出顺序不固定，按最后一维区分得分(2)和坐标(4)
        let (scores, boxes) = if first.shape().last() == Some(&4) {
            (second, first)
        } else {
            (first, second)
        };

        let candidates = decode(
            &scores.view(),
            &boxes.view(),
            orig_w,
            orig_h,
            self.score_threshold,
            self.min_face_size,
        )?;
        let faces = nms(candidates, IOU_THRESH);
        log::info!("[Face] 检测到 {} 张人脸", faces.len());
        Ok(faces)
    }
}

/// 解码模型输出为像素坐标的人脸框
pub fn decode(
    scores: &ArrayViewD<f32>,
    boxes: &ArrayViewD<f32>,
    orig_w: u32,
    orig_h: u32,
    score_threshold: f32,
    min_face_size: u32,
) -> Result<Vec<FaceRegion>, FaceError> {
    let (score_shape, box_shape) = (scores.shape(), boxes.shape());
    if score_shape.len() != 3 || box_shape.len() != 3 || score_shape[2] != 2 || box_shape[2] != 4 {
        return Err(FaceError::Inference(format!(
            "意外的输出形状: {:?} / {:?}",
            score_shape, box_shape
        )));
    }
    let count = score_shape[1].min(box_shape[1]);
    let (w, h) = (orig_w as f32, orig_h as f32);

    let mut faces = Vec::new();
    for i in 0..count {
        let score = scores[[0, i, 1]];
        if score < score_threshold {
            continue;
        }
        let x1 = (boxes[[0, i, 0]] * w).clamp(0.0, w);
        let y1 = (boxes[[0, i, 1]] * h).clamp(0.0, h);
        let x2 = (boxes[[0, i, 2]] * w).clamp(0.0, w);
        let y2 = (boxes[[0, i, 3]] * h).clamp(0.0, h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        let face = FaceRegion {
            x: x1.round() as u32,
            y: y1.round() as u32,
            width: (x2 - x1).round() as u32,
            height: (y2 - y1).round() as u32,
            score,
        };
        if face.width < min_face_size || face.height < min_face_size {
            log::debug!("[Face] 丢弃过小的人脸框: {}x{}", face.width, face.height);
            continue;
        }
        faces.push(face);
    }
    Ok(faces)
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = (a.x + a.width).min(b.x + b.width);
    let bottom = (a.y + a.height).min(b.y + b.height);
    if right <= left || bottom <= top {
        return 0.0;
    }
    let inter = ((right - left) * (bottom - top)) as f32;
    let union = a.area() as f32 + b.area() as f32 - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// 非极大值抑制，按得分从高到低保留
pub fn nms(mut candidates: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<FaceRegion> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn outputs(rows: &[(f32, [f32; 4])]) -> (Array3<f32>, Array3<f32>) {
        let mut scores = Array3::<f32>::zeros((1, rows.len(), 2));
        let mut boxes = Array3::<f32>::zeros((1, rows.len(), 4));
        for (i, (score, bbox)) in rows.iter().enumerate() {
            scores[[0, i, 0]] = 1.0 - score;
            scores[[0, i, 1]] = *score;
            for (j, v) in bbox.iter().enumerate() {
                boxes[[0, i, j]] = *v;
            }
        }
        (scores, boxes)
    }

    #[test]
    fn test_decode_filters_score_and_size() {
        let (scores, boxes) = outputs(&[
            (0.95, [0.1, 0.1, 0.3, 0.4]),
            (0.8, [0.11, 0.12, 0.31, 0.41]),
            (0.9, [0.5, 0.5, 0.55, 0.55]),
            (0.5, [0.6, 0.1, 0.9, 0.6]),
        ]);
        let faces = decode(
            &scores.view().into_dyn(),
            &boxes.view().into_dyn(),
            640,
            480,
            0.7,
            60,
        )
        .unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].x, 64);
        assert_eq!(faces[0].y, 48);
        assert_eq!(faces[0].width, 128);
        assert_eq!(faces[0].height, 144);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let scores = Array3::<f32>::zeros((1, 4, 3));
        let boxes = Array3::<f32>::zeros((1, 4, 4));
        let result = decode(&scores.view().into_dyn(), &boxes.view().into_dyn(), 10, 10, 0.5, 1);
        assert!(matches!(result, Err(FaceError::Inference(_))));
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let face = |x: u32, score: f32| FaceRegion {
            x,
            y: 10,
            width: 100,
            height: 100,
            score,
        };
        let kept = nms(vec![face(12, 0.8), face(10, 0.95), face(300, 0.75)], IOU_THRESH);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].x, 10);
        assert_eq!(kept[1].x, 300);
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxFaceDetector::new(Path::new("/nonexistent/face.onnx"), &ImageConfig::default());
        assert!(matches!(result, Err(FaceError::ModelLoad(_))));
    }
}
