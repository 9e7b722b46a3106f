//! Configuration
//!
//! デフォルト値 → 設定ファイル → 環境変数 の順で読み込む

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    AlertsConfig, AppConfig, CacheConfig, LoggingConfig, ModelConfig, RateLimitConfig,
    ServerConfig,
};
