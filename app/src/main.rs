//! `veil` 命令行入口

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use veil_core::{load_config, RedactConfig, SubstitutionStrategy};
use veil_face::FaceDetector;
use veil_redact::{open_face_detector, redact_file, FileKind, RedactRequest};

/// Veil - 遮盖文档、PDF 和照片中的敏感信息
#[derive(Parser)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 输入文件
    input: PathBuf,

    /// 输出文件（格式与输入相同）
    #[arg(short, long)]
    output: PathBuf,

    /// 文件类型：xlsx / docx / pdf / image，默认按扩展名判断
    #[arg(short, long)]
    kind: Option<FileKind>,

    /// 配置文件 (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ONNX 人脸检测模型
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// 文档段落替换策略：single-scan / sequential
    #[arg(long)]
    strategy: Option<SubstitutionStrategy>,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("VEIL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<RedactConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RedactConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(model) = &cli.face_model {
        config.image.face_model_path = Some(model.display().to_string());
    }
    if let Some(strategy) = cli.strategy {
        config.word_strategy = strategy;
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_settings(&cli)?;
    let request = RedactRequest {
        input: cli.input,
        output: cli.output,
        kind: cli.kind,
    };

    let mut detector = if request.resolve_kind()? == FileKind::Image {
        open_face_detector(&config.image)?
    } else {
        None
    };

    let report = redact_file(
        &request,
        &config,
        detector.as_mut().map(|d| d as &mut dyn FaceDetector),
    )
    .with_context(|| format!("failed to redact {}", request.input.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
