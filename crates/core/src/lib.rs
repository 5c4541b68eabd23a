//! Veil 脱敏核心
//!
//! 敏感类别目录、判定器、文本替换引擎、配置与统一文档接口。
//! 各格式适配器（office / pdf / face）都只依赖这里的规则。

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod document;
pub mod snippet;
pub mod substitute;
pub mod unit;

pub use catalog::{Catalog, CatalogOptions, Category, MatchMode, MatchRule};
pub use classifier::Classifier;
pub use config::{
    load_config, save_config, ConfigError, ImageConfig, PdfConfig, PdfMode, RedactConfig,
};
pub use document::{write_atomically, Document, RedactContext, RedactionStats};
pub use substitute::{Span, SubstitutionStrategy, Substituter, DEFAULT_PLACEHOLDER};
pub use unit::{decimal_text, ContentUnit, Region, UnitValue};

pub type Result<T> = std::result::Result<T, RedactError>;

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("invalid {kind} file: {reason}")]
    InvalidFormat { kind: String, reason: String },
    #[error("failed to load image: {0}")]
    Load(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported file kind: {0}")]
    UnsupportedKind(String),
    #[error("face detector error: {0}")]
    Detector(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RedactError {
    pub fn invalid(kind: &str, reason: impl std::fmt::Display) -> Self {
        RedactError::InvalidFormat {
            kind: kind.to_string(),
            reason: reason.to_string(),
        }
    }
}
