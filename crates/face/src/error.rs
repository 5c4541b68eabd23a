//! 人脸检测错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("模型加载失败: {0}")]
    ModelLoad(String),

    #[error("推理失败: {0}")]
    Inference(String),
}
