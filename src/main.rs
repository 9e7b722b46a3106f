//! scorewatch Binary Entry Point
//!
//! 設定を読み込み、ログを初期化して HTTP API サーバーを起動する。

use anyhow::{Context, Result};
use clap::Parser;
use scorewatch::config::ConfigLoader;
use scorewatch::http_server;
use scorewatch::logging::init_logging;
use scorewatch::service::ServiceState;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "scorewatch")]
#[command(version, about = "Engagement score anomaly detection service", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SCOREWATCH_CONFIG")]
    config: Option<String>,

    /// Address to bind, overrides server.bind_addr
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level, overrides logging.level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = ConfigLoader::new()
        .load_from_file(cli.config.as_deref())
        .load_from_env()
        .build()?;

    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _log_guard = init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.server.bind_addr,
        requests_per_minute = config.rate_limit.requests_per_minute,
        api_key_configured = config.server.api_key.is_some(),
        "Starting scorewatch"
    );

    let bind_addr = config.server.bind_addr.clone();
    let state = ServiceState::bootstrap(config)
        .await
        .context("Failed to initialize service state")?;

    http_server::serve(state, &bind_addr).await
}
