use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::{Catalog, CatalogOptions, Category};
use crate::classifier::Classifier;
use crate::substitute::{SubstitutionStrategy, Substituter, DEFAULT_PLACEHOLDER};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactConfig {
    // ============ 文本替换 ============
    /// 文本占位符
    pub placeholder: String,
    /// 关闭的敏感类别
    pub disabled_categories: Vec<Category>,
    /// 电话号码使用严格规则
    pub strict_phone: bool,
    /// 文档段落替换策略
    pub word_strategy: SubstitutionStrategy,

    // ============ 分格式配置 ============
    pub pdf: PdfConfig,
    pub image: ImageConfig,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            disabled_categories: Vec::new(),
            strict_phone: false,
            word_strategy: SubstitutionStrategy::default(),
            pdf: PdfConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

/// PDF 页面处理方式
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PdfMode {
    /// 按页面内容类型自动选择
    #[default]
    Auto,
    /// 从内容流中删除字形并覆盖黑块
    Burn,
    /// 整页渲染为图片后涂黑
    Rasterize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct PdfConfig {
    pub mode: PdfMode,
    /// 栅格化分辨率
    pub dpi: u32,
    /// Pdfium 动态库路径，未设置时按默认位置查找
    pub pdfium_library_path: Option<String>,
    /// 处理后重新提取文本校验
    pub verify: bool,
    /// 清理文档信息字典和 XMP 元数据
    pub clean_metadata: bool,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            mode: PdfMode::Auto,
            dpi: 150,
            pdfium_library_path: None,
            verify: true,
            clean_metadata: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageConfig {
    /// 人脸框四周外扩的像素
    pub padding: u32,
    /// 高斯模糊 sigma
    pub blur_sigma: f32,
    /// ONNX 人脸检测模型路径
    pub face_model_path: Option<String>,
    pub score_threshold: f32,
    /// 小于该边长（像素）的人脸框被丢弃
    pub min_face_size: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            padding: 10,
            blur_sigma: 30.0,
            face_model_path: None,
            score_threshold: 0.7,
            min_face_size: 60,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl RedactConfig {
    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            disabled: self.disabled_categories.iter().copied().collect::<HashSet<_>>(),
            strict_phone: self.strict_phone,
        }
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::with_options(&self.catalog_options())
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.catalog())
    }

    pub fn substituter(&self, catalog: Arc<Catalog>) -> Substituter {
        Substituter::new(catalog, self.word_strategy, self.placeholder.clone())
    }

    /// 校验配置
    ///
    /// 占位符不能含字母数字，也不能被判定为敏感，否则替换结果会再次命中规则。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.placeholder.trim().is_empty() {
            return Err(ConfigError::Invalid("placeholder must not be empty".into()));
        }
        if self.placeholder.chars().any(|c| c.is_alphanumeric()) {
            return Err(ConfigError::Invalid(format!(
                "placeholder {:?} contains alphanumeric characters",
                self.placeholder
            )));
        }
        if Classifier::standard().is_sensitive_text(&self.placeholder) {
            return Err(ConfigError::Invalid(format!(
                "placeholder {:?} is itself classified as sensitive",
                self.placeholder
            )));
        }
        if !(36..=1200).contains(&self.pdf.dpi) {
            return Err(ConfigError::Invalid(format!(
                "pdf.dpi must be within 36..=1200, got {}",
                self.pdf.dpi
            )));
        }
        if !(self.image.blur_sigma > 0.0 && self.image.blur_sigma.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "image.blurSigma must be positive, got {}",
                self.image.blur_sigma
            )));
        }
        if !(0.0..=1.0).contains(&self.image.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "image.scoreThreshold must be within 0..=1, got {}",
                self.image.score_threshold
            )));
        }
        Ok(())
    }

    /// 环境变量覆盖（VEIL_PDFIUM_PATH / VEIL_PDF_DPI / VEIL_FACE_MODEL）
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("VEIL_PDFIUM_PATH") {
            if !path.trim().is_empty() {
                self.pdf.pdfium_library_path = Some(path);
            }
        }
        if let Some(dpi) = std::env::var("VEIL_PDF_DPI")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            self.pdf.dpi = dpi;
        }
        if let Ok(path) = std::env::var("VEIL_FACE_MODEL") {
            if !path.trim().is_empty() {
                self.image.face_model_path = Some(path);
            }
        }
    }
}

/// 读取配置文件；文件不存在时返回默认配置
pub fn load_config(path: &Path) -> Result<RedactConfig, ConfigError> {
    if !path.exists() {
        return Ok(RedactConfig::default());
    }
    let raw = fs::read_to_string(path)?;
    let config: RedactConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &RedactConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}
