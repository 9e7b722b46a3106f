use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tracing_subscriber::Registry;

/// ログファイル名
const LOG_FILE_NAME: &str = "scorewatch.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// ファイル出力のフラッシュ用ガード
///
/// プロセス終了までドロップしないこと。
#[derive(Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// ログシステムを初期化
///
/// `RUST_LOG` が設定されていればそちらを優先する。
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };
    layers.push(console);

    let mut guard = LogGuard::default();
    if let Some(dir) = &config.log_dir {
        ensure_log_dir(dir)?;
        let (writer, file_guard) = non_blocking(rolling::daily(dir, LOG_FILE_NAME));
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_target(true)
                .with_line_number(true)
                .boxed(),
        );
        guard._file = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(env_filter))
        .try_init()?;

    tracing::info!(
        level = %config.level,
        json = config.json,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );

    Ok(guard)
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
