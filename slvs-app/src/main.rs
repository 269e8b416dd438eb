use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use slvs_config::{AppConfig, ConfigError, ReportFormat};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod report;

use report::LoadReport;

#[derive(Parser)]
#[command(name = "slvs-app", version)]
#[command(about = "加载 SolveSpace 草图文件并输出实体与约束的构造报告")]
struct Cli {
    /// 要加载的 `.slvs` 文件
    file: PathBuf,

    /// 配置文件路径，缺省时依次尝试 `SLVS_CONFIG` 与 `./config/default.toml`
    #[arg(long)]
    config: Option<PathBuf>,

    /// 输出格式，覆盖配置中的 `report.format`
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// 逐个列出实体及其参数
    #[arg(long)]
    entities: bool,

    /// 日志等级或过滤表达式，覆盖配置中的 `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("错误：{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let (mut config, fallback) = load_configuration(cli.config);
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.format {
        config.report.format = format.into();
    }
    if cli.entities {
        config.report.show_entities = true;
    }

    init_logging(&config);
    if let Some(fallback) = &fallback {
        fallback.warn();
    }
    info!(path = %cli.file.display(), "加载草图");

    let loaded = slvs_engine::pipeline::load_path(&cli.file)
        .with_context(|| format!("加载草图 {} 失败", cli.file.display()))?;
    let report = LoadReport::new(&cli.file, &loaded, config.report.show_entities);

    let output = match config.report.format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Json => serde_json::to_string_pretty(&report).context("序列化报告失败")?,
    };
    println!("{output}");
    Ok(())
}

/// 配置加载失败后回退到默认值的记录，等日志初始化后再输出。
struct ConfigFallback {
    explicit: bool,
    error: ConfigError,
}

impl ConfigFallback {
    fn warn(&self) {
        let err = &self.error;
        match (self.explicit, err) {
            (true, ConfigError::Io { path, .. } | ConfigError::Parse { path, .. }) => {
                warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            }
            (true, ConfigError::Context { .. }) => {
                warn!(error = %err, "加载指定配置失败，使用默认配置");
            }
            (false, ConfigError::Io { path, .. } | ConfigError::Parse { path, .. }) => {
                warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
            }
            (false, ConfigError::Context { .. }) => {
                warn!(error = %err, "加载默认配置失败，使用内建默认值");
            }
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> (AppConfig, Option<ConfigFallback>) {
    let explicit = override_path.is_some();
    let loaded = match override_path {
        Some(path) => AppConfig::from_file(&path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(error) => (AppConfig::default(), Some(ConfigFallback { explicit, error })),
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    // 日志写到 stderr，stdout 只留给报告
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
