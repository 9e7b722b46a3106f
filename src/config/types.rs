use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Admission control (token bucket) configuration
    pub rate_limit: RateLimitConfig,

    /// Outlier model configuration
    pub model: ModelConfig,

    /// Result cache configuration
    pub cache: CacheConfig,

    /// Alerting configuration
    pub alerts: AlertsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_addr: String,

    /// CORS allowed origins
    pub allowed_origins: Vec<String>,

    /// Shared API key for alert/metrics routes (None disables the gate)
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            api_key: None,
        }
    }
}

/// トークンバケット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 有効/無効
    pub enabled: bool,
    /// 1分あたりのリクエスト数（バケット容量）
    pub requests_per_minute: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60.0,
        }
    }
}

/// Isolation Forest 設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ツリー数
    pub n_estimators: usize,
    /// 想定異常率 (0, 0.5]
    pub contamination: f64,
    /// 乱数シード
    pub random_state: u64,
    /// ツリーごとのサブサンプル上限
    pub max_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            contamination: 0.2,
            random_state: 42,
            max_samples: 256,
        }
    }
}

/// 結果キャッシュ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL（秒）
    pub ttl_seconds: u64,
    /// 最大エントリ数
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            capacity: 100,
        }
    }
}

/// アラート設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// システムアラートの送信元 / デフォルト宛先
    pub from_address: String,
    /// 顧客別アラート設定の保存先
    pub config_path: PathBuf,
    /// アラート履歴の最大保持数
    pub max_history: usize,
    /// 通知用Webhook（未設定ならログ出力のみ）
    pub webhook_url: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            from_address: "alerts@customerengagement.com".to_string(),
            config_path: PathBuf::from("data/alert_configs.json"),
            max_history: 10_000,
            webhook_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit JSON lines on the console
    pub json: bool,

    /// Directory for daily-rolling log files (None disables file output)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        let contamination = self.model.contamination;
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(Error::Config(format!(
                "model.contamination must be in (0, 0.5], got {}",
                contamination
            )));
        }
        if self.model.n_estimators == 0 {
            return Err(Error::Config(
                "model.n_estimators must be at least 1".to_string(),
            ));
        }
        if self.model.max_samples == 0 {
            return Err(Error::Config(
                "model.max_samples must be at least 1".to_string(),
            ));
        }
        // 容量1未満のバケットは初回から全リクエストを拒否する
        if !(self.rate_limit.requests_per_minute >= 1.0) {
            return Err(Error::Config(format!(
                "rate_limit.requests_per_minute must be at least 1, got {}",
                self.rate_limit.requests_per_minute
            )));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.model.contamination, 0.2);
        assert_eq!(config.rate_limit.requests_per_minute, 60.0);
    }

    #[test]
    fn test_contamination_bounds() {
        let mut config = AppConfig::default();
        config.model.contamination = 0.0;
        assert!(config.validate().is_err());

        config.model.contamination = 0.5;
        assert!(config.validate().is_ok());

        config.model.contamination = 0.51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_must_be_positive() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_minute = 0.0;
        assert!(config.validate().is_err());

        config.rate_limit.requests_per_minute = 0.5;
        assert!(config.validate().is_err());

        config.rate_limit.requests_per_minute = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"model": {"n_estimators": 10}}"#).unwrap();
        assert_eq!(config.model.n_estimators, 10);
        assert_eq!(config.model.random_state, 42);
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    }
}
