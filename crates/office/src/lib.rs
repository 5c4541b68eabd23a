//! Office Open XML 文档处理器
//!
//! 实现 `Document` trait，支持 .xlsx 工作簿和 .docx 文档的加载、脱敏和保存。

pub mod package;
pub mod sheet;
pub mod word;
pub mod xml;

use std::path::Path;

use veil_core::{Document, RedactContext, RedactError, RedactionStats};

pub use package::Package;
pub use sheet::SpreadsheetDocument;
pub use word::WordDocument;
pub use xml::{Element, Node, XmlDocument};

#[derive(Debug, thiserror::Error)]
pub enum OfficeError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(String),
    #[error("missing part: {0}")]
    MissingPart(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OfficeError {
    /// 转换为适配器边界上的错误；IO 问题保持为 IO，其余视为格式错误
    pub fn into_redact_error(self, kind: &str) -> RedactError {
        match self {
            OfficeError::Io(e) => RedactError::Io(e),
            other => RedactError::invalid(kind, other),
        }
    }
}

/// 工作簿脱敏：读取 `input`，写出到 `output`
pub fn redact_spreadsheet(
    input: &Path,
    output: &Path,
    ctx: &RedactContext,
) -> Result<RedactionStats, RedactError> {
    SpreadsheetDocument::redact_file(input, output, ctx)
}

/// 文档脱敏：读取 `input`，写出到 `output`
pub fn redact_document(
    input: &Path,
    output: &Path,
    ctx: &RedactContext,
) -> Result<RedactionStats, RedactError> {
    WordDocument::redact_file(input, output, ctx)
}

/// 打开包并确认主部件存在
pub(crate) fn open_package(path: &Path, kind: &str, main_part: &str) -> Result<Package, RedactError> {
    let bytes = std::fs::read(path)?;
    let package = Package::from_bytes(bytes).map_err(|e| e.into_redact_error(kind))?;
    if !package.contains(main_part) {
        return Err(OfficeError::MissingPart(main_part.to_string()).into_redact_error(kind));
    }
    Ok(package)
}

pub(crate) fn save_package(package: &Package, path: &Path, kind: &str) -> Result<(), RedactError> {
    veil_core::write_atomically(path, |file| {
        package
            .write_to(file)
            .map_err(|e| e.into_redact_error(kind))
    })
}

pub(crate) fn parse_part(package: &Package, name: &str, kind: &str) -> Result<XmlDocument, RedactError> {
    let bytes = package
        .get(name)
        .ok_or_else(|| OfficeError::MissingPart(name.to_string()).into_redact_error(kind))?;
    XmlDocument::parse(bytes).map_err(|e| RedactError::invalid(kind, format!("{}: {}", name, e)))
}
