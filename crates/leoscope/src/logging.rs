use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::{LogRotation, LoggingArgs};

pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(args: &LoggingArgs) -> Result<LoggingGuard, anyhow::Error> {
    let filter = build_filter(args)?;

    use std::io::IsTerminal as _;
    let console_ansi = std::io::stdout().is_terminal();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(console_ansi)
        .with_writer(std::io::stdout);

    let mut file_guard = None;
    let mut file_layer = None;

    if let Some(log_file) = args.log_file.as_deref() {
        let config = LogFileConfig::new(log_file)?;
        std::fs::create_dir_all(&config.directory)?;

        let rotation = match args.log_rotation {
            LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
            LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        };
        let appender = tracing_appender::rolling::RollingFileAppender::new(
            rotation,
            &config.directory,
            &config.prefix,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        file_layer = Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        );
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn build_filter(args: &LoggingArgs) -> Result<tracing_subscriber::EnvFilter, anyhow::Error> {
    let filter_str = if let Some(filter) = args.log.as_deref() {
        filter.to_string()
    } else if let Ok(filter) = std::env::var("RUST_LOG") {
        filter
    } else {
        "info,tower_http=warn".to_string()
    };

    Ok(tracing_subscriber::EnvFilter::try_new(filter_str)?)
}

#[derive(Debug, Clone)]
struct LogFileConfig {
    directory: PathBuf,
    prefix: String,
}

impl LogFileConfig {
    fn new(path: &Path) -> Result<Self, anyhow::Error> {
        let prefix = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("log file path must include a file name"))?
            .to_string_lossy()
            .to_string();

        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        Ok(Self { directory, prefix })
    }
}
