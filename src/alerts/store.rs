//! Alert Config Stores
//!
//! 顧客別アラート設定の永続化

use super::types::AlertConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// 顧客ID → 設定
pub type AlertConfigMap = HashMap<String, AlertConfig>;

/// アラート設定ストア
#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    /// 全設定を読み込み
    async fn load_all(&self) -> Result<AlertConfigMap>;

    /// 全設定を書き込み
    async fn save_all(&self, configs: &AlertConfigMap) -> Result<()>;
}

/// JSON ファイルストア
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AlertConfigStore for JsonFileStore {
    async fn load_all(&self) -> Result<AlertConfigMap> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let configs: AlertConfigMap = serde_json::from_str(&content).map_err(|e| {
            Error::Persistence(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        info!(
            "Loaded alert configurations for {} customers",
            configs.len()
        );
        Ok(configs)
    }

    async fn save_all(&self, configs: &AlertConfigMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Persistence(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(configs)?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            Error::Persistence(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        info!("Saved alert configurations for {} customers", configs.len());
        Ok(())
    }
}

/// メモリ内ストア（テスト・永続化不要時用）
#[derive(Debug, Default)]
pub struct MemoryStore {
    configs: Mutex<AlertConfigMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初期データ付きで作成
    pub fn with_configs(configs: AlertConfigMap) -> Self {
        Self {
            configs: Mutex::new(configs),
        }
    }
}

#[async_trait]
impl AlertConfigStore for MemoryStore {
    async fn load_all(&self) -> Result<AlertConfigMap> {
        Ok(self.configs.lock().await.clone())
    }

    async fn save_all(&self, configs: &AlertConfigMap) -> Result<()> {
        *self.configs.lock().await = configs.clone();
        Ok(())
    }
}
