//! Alert Engine
//!
//! 検知結果と顧客別設定からアラート送信を判定する。
//! 同一顧客の判定はロックで直列化し、クールダウンの確認と更新の間に割り込ませない。

use super::notifier::NotificationSender;
use super::store::{AlertConfigMap, AlertConfigStore};
use super::types::{AlertConfig, AlertDecision, AlertRecord, Severity, SuppressionReason};
use crate::analytics::{DetectionMetadata, DetectionResult};
use crate::clock::Clock;
use crate::config::AlertsConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// 設定と検知結果からアラートの重要度を判定
///
/// 抑制理由は disabled → cooldown → insufficient points → below threshold の順に評価し、
/// 最初に該当したものを返す。
pub fn assess(
    config: &AlertConfig,
    metadata: &DetectionMetadata,
    now: DateTime<Utc>,
) -> std::result::Result<Severity, SuppressionReason> {
    if !config.enabled {
        return Err(SuppressionReason::Disabled);
    }
    if config.in_cooldown(now) {
        return Err(SuppressionReason::Cooldown);
    }
    if metadata.anomaly_count < config.thresholds.min_anomaly_points {
        return Err(SuppressionReason::InsufficientPoints);
    }

    let fraction = metadata.anomaly_percentage / 100.0;
    if fraction >= config.thresholds.critical_threshold {
        Ok(Severity::Critical)
    } else if fraction >= config.thresholds.warning_threshold {
        Ok(Severity::Warning)
    } else {
        Err(SuppressionReason::BelowThreshold)
    }
}

/// 通知の件名と本文を作成
pub fn render_message(
    customer_id: &str,
    severity: Severity,
    metadata: &DetectionMetadata,
) -> (String, String) {
    let label = severity.as_str().to_uppercase();
    let subject = format!(
        "{} Alert: Anomaly Detection for Customer {}",
        label, customer_id
    );
    let body = format!(
        "Anomaly Alert Details:\n\
         ---------------------\n\
         Severity: {label}\n\
         Customer ID: {customer_id}\n\
         Anomaly Percentage: {percentage:.2}%\n\
         Number of Anomalies: {count}\n\
         Total Data Points: {total}\n\
         Mean Score: {mean}\n\
         Standard Deviation: {std}\n\
         Detected at: {processed_at}\n\
         \n\
         Please review the customer engagement dashboard for more details.\n",
        label = label,
        customer_id = customer_id,
        percentage = metadata.anomaly_percentage,
        count = metadata.anomaly_count,
        total = metadata.total_points,
        mean = metadata.mean_score,
        std = metadata.std_score,
        processed_at = metadata.processed_at.to_rfc3339(),
    );
    (subject, body)
}

/// アラートエンジン
pub struct AlertEngine {
    settings: AlertsConfig,
    /// 明示的に保存された顧客別設定
    configs: RwLock<AlertConfigMap>,
    /// 送信履歴（古い順）
    history: RwLock<VecDeque<AlertRecord>>,
    /// 顧客ごとの判定ロック
    customer_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// 保存処理の直列化
    persist_lock: Mutex<()>,
    sender: Arc<dyn NotificationSender>,
    store: Arc<dyn AlertConfigStore>,
    clock: Arc<dyn Clock>,
}

impl AlertEngine {
    /// 新しいアラートエンジンを作成
    pub fn new(
        settings: AlertsConfig,
        sender: Arc<dyn NotificationSender>,
        store: Arc<dyn AlertConfigStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            configs: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            customer_locks: Mutex::new(HashMap::new()),
            persist_lock: Mutex::new(()),
            sender,
            store,
            clock,
        }
    }

    /// ストアから設定を読み込む（起動時）
    pub async fn load_configs(&self) -> Result<usize> {
        let mut loaded = self.store.load_all().await?;
        loaded.retain(|customer_id, config| match config.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(customer_id = %customer_id, "Skipping invalid stored alert configuration: {}", e);
                false
            }
        });
        let count = loaded.len();
        *self.configs.write().await = loaded;
        info!(
            count,
            sender = self.sender.name(),
            "Alert configurations loaded"
        );
        Ok(count)
    }

    /// システムのデフォルト設定
    pub fn default_config(&self) -> AlertConfig {
        AlertConfig::system_default(&self.settings.from_address)
    }

    /// 顧客の設定を取得（未保存ならデフォルト）
    pub async fn get_config(&self, customer_id: &str) -> AlertConfig {
        self.resolve(customer_id).await.0
    }

    /// 顧客の設定を保存
    pub async fn set_config(&self, customer_id: &str, config: AlertConfig) -> Result<AlertConfig> {
        config.validate()?;

        let lock = self.customer_lock(customer_id).await;
        {
            let _guard = lock.lock().await;
            self.configs
                .write()
                .await
                .insert(customer_id.to_string(), config.clone());
            info!(customer_id = %customer_id, "Alert configuration updated");
            self.persist().await;
        }
        self.release_customer_lock(customer_id, lock).await;
        Ok(config)
    }

    /// 送信履歴を新しい順に取得
    pub async fn history(&self, customer_id: Option<&str>, limit: usize) -> Vec<AlertRecord> {
        let history = self.history.read().await;
        let mut records: Vec<AlertRecord> = history
            .iter()
            .rev()
            .filter(|record| customer_id.map_or(true, |id| record.customer_id == id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        records
    }

    /// 検知結果を評価し、必要なら通知する
    pub async fn evaluate(&self, customer_id: &str, result: &DetectionResult) -> AlertDecision {
        let lock = self.customer_lock(customer_id).await;
        let decision = {
            let _guard = lock.lock().await;
            self.evaluate_locked(customer_id, result).await
        };
        self.release_customer_lock(customer_id, lock).await;
        decision
    }

    async fn evaluate_locked(&self, customer_id: &str, result: &DetectionResult) -> AlertDecision {
        let now = self.clock.now();
        let (config, stored) = self.resolve(customer_id).await;

        let severity = match assess(&config, &result.metadata, now) {
            Ok(severity) => severity,
            Err(reason) => {
                debug!(customer_id = %customer_id, reason = %reason, "Alert suppressed");
                return AlertDecision::suppressed(reason, None, now);
            }
        };

        let (subject, body) = render_message(customer_id, severity, &result.metadata);
        if let Err(e) = self
            .sender
            .send(&config.email_recipients, &subject, &body)
            .await
        {
            warn!(customer_id = %customer_id, severity = %severity, "Failed to send alert: {}", e);
            let detail = match e {
                Error::Notification(detail) => detail,
                other => other.to_string(),
            };
            return AlertDecision::suppressed(
                SuppressionReason::NotificationFailed(detail),
                Some(severity),
                now,
            );
        }

        self.record(AlertRecord {
            id: uuid::Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            severity,
            timestamp: now,
            details: result.metadata.clone(),
        })
        .await;

        // デフォルト設定の顧客はクールダウンを保持しない
        if stored {
            if let Some(entry) = self.configs.write().await.get_mut(customer_id) {
                entry.last_alert_time = Some(now);
            }
            self.persist().await;
        }

        info!(customer_id = %customer_id, severity = %severity, "Alert sent");
        AlertDecision::notified(severity, now)
    }

    async fn resolve(&self, customer_id: &str) -> (AlertConfig, bool) {
        match self.configs.read().await.get(customer_id) {
            Some(config) => (config.clone(), true),
            None => (self.default_config(), false),
        }
    }

    async fn customer_lock(&self, customer_id: &str) -> Arc<Mutex<()>> {
        self.customer_locks
            .lock()
            .await
            .entry(customer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_customer_lock(&self, customer_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.customer_locks.lock().await;
        // マップと自分以外に保持者がいなければ削除
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(customer_id);
        }
        drop(lock);
    }

    async fn record(&self, record: AlertRecord) {
        let mut history = self.history.write().await;
        history.push_back(record);
        while history.len() > self.settings.max_history {
            history.pop_front();
        }
    }

    /// 設定を保存（失敗はログのみ）
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.configs.read().await.clone();
        if let Err(e) = self.store.save_all(&snapshot).await {
            warn!("Failed to save alert configurations: {}", e);
        }
    }
}
