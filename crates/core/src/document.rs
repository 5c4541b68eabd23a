//! 统一文档接口定义
//!
//! 所有格式适配器都实现 `Document` trait：加载 → 原地脱敏 → 保存。

use crate::catalog::Catalog;
use crate::classifier::Classifier;
use crate::config::RedactConfig;
use crate::substitute::Substituter;
use crate::{RedactError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// 单个文档的脱敏统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionStats {
    /// 检查过的候选单元数
    pub units_examined: usize,
    /// 被遮盖的单元数
    pub units_redacted: usize,
    /// 有改动的页面 / 工作表 / 部件数
    pub pages_touched: usize,
}

impl RedactionStats {
    pub fn merge(&mut self, other: RedactionStats) {
        self.units_examined += other.units_examined;
        self.units_redacted += other.units_redacted;
        self.pages_touched += other.pages_touched;
    }
}

/// 一次脱敏所需的只读上下文
#[derive(Debug, Clone)]
pub struct RedactContext {
    pub classifier: Classifier,
    pub substituter: Substituter,
    pub config: RedactConfig,
}

impl RedactContext {
    pub fn new(config: RedactConfig) -> Self {
        let catalog: Arc<Catalog> = Arc::new(config.catalog());
        let substituter = config.substituter(catalog.clone());
        let classifier = Classifier::new((*catalog).clone());
        Self {
            classifier,
            substituter,
            config,
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.config.placeholder
    }
}

impl Default for RedactContext {
    fn default() -> Self {
        Self::new(RedactConfig::default())
    }
}

/// 统一文档接口
pub trait Document: Sized {
    /// 加载文档，格式不符时返回 `InvalidFormat`
    fn load(path: &Path) -> Result<Self>;

    /// 原地遮盖所有敏感单元
    fn redact(&mut self, ctx: &RedactContext) -> Result<RedactionStats>;

    /// 序列化到输出路径
    fn save(&self, path: &Path) -> Result<()>;

    /// 加载、脱敏并保存，失败时不留下输出文件
    fn redact_file(input: &Path, output: &Path, ctx: &RedactContext) -> Result<RedactionStats> {
        let mut doc = Self::load(input)?;
        let stats = doc.redact(ctx)?;
        doc.save(output)?;
        Ok(stats)
    }
}

/// 先写入目标目录下的临时文件，成功后再原子替换到目标路径
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut std::fs::File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.persist(path).map_err(|e| RedactError::Io(e.error))?;
    Ok(())
}
