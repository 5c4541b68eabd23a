//! Veil 脱敏入口
//!
//! 根据文件类型选择对应的处理器，统一返回脱敏报告。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use veil_core::{ImageConfig, RedactConfig, RedactContext, RedactError, RedactionStats};
use veil_face::{FaceDetector, OnnxFaceDetector};

pub use veil_core::{load_config, save_config};

/// 支持的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Xlsx,
    Docx,
    Pdf,
    Image,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff", "webp"];

impl FileKind {
    /// 根据文件扩展名判断类型
    pub fn from_path(path: &Path) -> Result<Self, RedactError> {
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        extension.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Xlsx => "xlsx",
            FileKind::Docx => "docx",
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
        }
    }
}

impl FromStr for FileKind {
    type Err = RedactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().trim_start_matches('.').to_lowercase();
        match value.as_str() {
            "xlsx" => Ok(FileKind::Xlsx),
            "docx" => Ok(FileKind::Docx),
            "pdf" => Ok(FileKind::Pdf),
            "image" => Ok(FileKind::Image),
            other if IMAGE_EXTENSIONS.contains(&other) => Ok(FileKind::Image),
            other => Err(RedactError::UnsupportedKind(other.to_string())),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次脱敏请求
#[derive(Debug, Clone)]
pub struct RedactRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// 未指定时按输入扩展名判断
    pub kind: Option<FileKind>,
}

impl RedactRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: FileKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn resolve_kind(&self) -> Result<FileKind, RedactError> {
        match self.kind {
            Some(kind) => Ok(kind),
            None => FileKind::from_path(&self.input),
        }
    }
}

/// 单个文档的脱敏报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionReport {
    pub kind: FileKind,
    pub units_examined: usize,
    pub units_redacted: usize,
    pub pages_touched: usize,
}

impl RedactionReport {
    fn new(kind: FileKind, stats: RedactionStats) -> Self {
        Self {
            kind,
            units_examined: stats.units_examined,
            units_redacted: stats.units_redacted,
            pages_touched: stats.pages_touched,
        }
    }
}

/// 按配置打开 ONNX 人脸检测器；未配置模型时返回 None
pub fn open_face_detector(config: &ImageConfig) -> Result<Option<OnnxFaceDetector>, RedactError> {
    let Some(model_path) = config.face_model_path.as_deref() else {
        return Ok(None);
    };
    OnnxFaceDetector::new(Path::new(model_path), config)
        .map(Some)
        .map_err(|e| RedactError::Detector(e.to_string()))
}

/// 输出路径不能解析到输入文件本身，否则原文件会被替换
pub fn ensure_distinct_paths(input: &Path, output: &Path) -> Result<(), RedactError> {
    // 输入不存在时由处理器报加载错误
    let Ok(source) = input.canonicalize() else {
        return Ok(());
    };
    let target = match output.canonicalize() {
        Ok(path) => path,
        Err(_) => {
            let parent = match output.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            match (parent.canonicalize(), output.file_name()) {
                (Ok(dir), Some(name)) => dir.join(name),
                _ => return Ok(()),
            }
        }
    };
    if source == target {
        return Err(RedactError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("output {} would overwrite the input", output.display()),
        )));
    }
    Ok(())
}

/// 脱敏单个文件
///
/// 失败时输出路径上不会留下任何文件，输入文件始终不变。图片需要传入人脸检测器。
pub fn redact_file(
    request: &RedactRequest,
    config: &RedactConfig,
    detector: Option<&mut dyn FaceDetector>,
) -> Result<RedactionReport, RedactError> {
    config.validate()?;
    let kind = request.resolve_kind()?;
    let (input, output) = (request.input.as_path(), request.output.as_path());
    ensure_distinct_paths(input, output)?;

    log::info!(
        "[Redact] 开始处理 {} ({}) -> {}",
        input.display(),
        kind,
        output.display()
    );

    let stats = match kind {
        FileKind::Xlsx => veil_office::redact_spreadsheet(input, output, &RedactContext::new(config.clone()))?,
        FileKind::Docx => veil_office::redact_document(input, output, &RedactContext::new(config.clone()))?,
        FileKind::Pdf => veil_pdf::redact_pdf(input, output, &RedactContext::new(config.clone()))?,
        FileKind::Image => {
            let detector = detector
                .ok_or_else(|| RedactError::Detector("no face detector configured".to_string()))?;
            veil_face::redact_image(input, output, detector, &config.image)?
        }
    };

    let report = RedactionReport::new(kind, stats);
    log::info!(
        "[Redact] 完成: 检查 {} 个单元，脱敏 {} 个，涉及 {} 页",
        report.units_examined,
        report.units_redacted,
        report.pages_touched
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.pdf");
        std::fs::write(&input, b"%PDF").unwrap();

        assert!(ensure_distinct_paths(&input, &dir.path().join("b.pdf")).is_ok());
        assert!(ensure_distinct_paths(&input, Path::new("relative-out.pdf")).is_ok());
        // 写法不同但指向同一个文件
        let dotted = dir.path().join(".").join("a.pdf");
        let err = ensure_distinct_paths(&input, &dotted).unwrap_err();
        assert!(matches!(err, RedactError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput));
        // 输入不存在时不拦截
        let missing = dir.path().join("missing.pdf");
        assert!(ensure_distinct_paths(&missing, &missing).is_ok());
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(FileKind::from_path(Path::new("a/b.XLSX")).unwrap(), FileKind::Xlsx);
        assert_eq!(FileKind::from_path(Path::new("report.docx")).unwrap(), FileKind::Docx);
        assert_eq!(FileKind::from_path(Path::new("scan.pdf")).unwrap(), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("me.jpeg")).unwrap(), FileKind::Image);
        assert_eq!(FileKind::from_path(Path::new("me.webp")).unwrap(), FileKind::Image);
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            FileKind::from_path(Path::new("notes.txt")),
            Err(RedactError::UnsupportedKind(ext)) if ext == "txt"
        ));
        assert!(FileKind::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(".pdf".parse::<FileKind>().unwrap(), FileKind::Pdf);
        assert_eq!("Image".parse::<FileKind>().unwrap(), FileKind::Image);
        assert_eq!(FileKind::Docx.to_string(), "docx");
    }

    #[test]
    fn test_explicit_kind_wins() {
        let request = RedactRequest::new("upload.bin", "out.bin").with_kind(FileKind::Pdf);
        assert_eq!(request.resolve_kind().unwrap(), FileKind::Pdf);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = RedactionReport::new(
            FileKind::Xlsx,
            RedactionStats {
                units_examined: 4,
                units_redacted: 2,
                pages_touched: 1,
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "xlsx");
        assert_eq!(json["unitsRedacted"], 2);
        assert_eq!(json["pagesTouched"], 1);
    }

    #[test]
    fn test_no_model_no_detector() {
        assert!(open_face_detector(&ImageConfig::default()).unwrap().is_none());
    }
}
