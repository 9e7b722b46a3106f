//! Service State
//!
//! 検知パイプライン全体の共有状態。
//! キャッシュ参照 → （ミス時）特徴量抽出・スコアリング → キャッシュ保存 → アラート評価。

use crate::alerts::{
    AlertConfigStore, AlertDecision, AlertEngine, JsonFileStore, LogNotifier, NotificationSender,
    Severity, WebhookNotifier,
};
use crate::analytics::{AnomalyDetector, DetectionRequest, DetectionResult, ScoreSeries};
use crate::cache::{fingerprint, CacheStats, ResultCache};
use crate::clock::{elapsed_secs, Clock, SystemClock};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::security::AdmissionController;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// `/detect` のレスポンス
///
/// 顧客IDがなければ検知結果のみ、あればアラート判定と組で返す。
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DetectionResponse {
    Plain(Arc<DetectionResult>),
    WithAlert {
        anomaly_detection: Arc<DetectionResult>,
        alert: AlertDecision,
    },
}

impl DetectionResponse {
    /// 検知結果
    pub fn result(&self) -> &Arc<DetectionResult> {
        match self {
            DetectionResponse::Plain(result) => result,
            DetectionResponse::WithAlert {
                anomaly_detection, ..
            } => anomaly_detection,
        }
    }

    /// アラート判定（顧客IDがある場合のみ）
    pub fn alert(&self) -> Option<&AlertDecision> {
        match self {
            DetectionResponse::Plain(_) => None,
            DetectionResponse::WithAlert { alert, .. } => Some(alert),
        }
    }
}

/// サービスカウンタ
#[derive(Debug, Default)]
pub struct ServiceStats {
    detections_computed: AtomicU64,
    requests_throttled: AtomicU64,
    warning_alerts: AtomicU64,
    critical_alerts: AtomicU64,
}

impl ServiceStats {
    pub fn record_detection(&self) {
        self.detections_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.requests_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self, decision: &AlertDecision) {
        if !decision.sent {
            return;
        }
        match decision.severity {
            Some(Severity::Warning) => {
                self.warning_alerts.fetch_add(1, Ordering::Relaxed);
            }
            Some(Severity::Critical) => {
                self.critical_alerts.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }
}

/// 重要度別の送信数
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertCounts {
    pub warning: u64,
    pub critical: u64,
}

/// `/metrics/summary` で返す統計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub detections_computed: u64,
    pub requests_throttled: u64,
    pub alerts_sent: AlertCounts,
    pub cache: CacheStats,
    pub uptime_seconds: f64,
}

/// サービス全体の共有状態
pub struct ServiceState {
    config: AppConfig,
    admission: AdmissionController,
    cache: ResultCache,
    detector: Arc<AnomalyDetector>,
    alerts: AlertEngine,
    stats: ServiceStats,
    clock: Arc<dyn Clock>,
    /// フィンガープリントごとの計算ロック
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    started_at: DateTime<Utc>,
}

impl ServiceState {
    /// 依存を指定して作成
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        sender: Arc<dyn NotificationSender>,
        store: Arc<dyn AlertConfigStore>,
    ) -> Self {
        let admission = AdmissionController::new(config.rate_limit.clone(), clock.clone());
        let cache = ResultCache::new(
            config.cache.capacity,
            config.cache.ttl_seconds,
            clock.clone(),
        );
        let detector = Arc::new(AnomalyDetector::new(config.model.clone()));
        let alerts = AlertEngine::new(config.alerts.clone(), sender, store, clock.clone());
        let started_at = clock.now();

        Self {
            config,
            admission,
            cache,
            detector,
            alerts,
            stats: ServiceStats::default(),
            clock,
            inflight: Mutex::new(HashMap::new()),
            started_at,
        }
    }

    /// 設定から本番用の状態を構築し、保存済みアラート設定を読み込む
    pub async fn bootstrap(config: AppConfig) -> Result<Arc<Self>> {
        let sender: Arc<dyn NotificationSender> = match &config.alerts.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(LogNotifier),
        };
        let store = Arc::new(JsonFileStore::new(config.alerts.config_path.clone()));

        let state = Self::new(config, Arc::new(SystemClock), sender.clone(), store);
        let loaded = state.alerts.load_configs().await?;
        info!(
            customers = loaded,
            notifier = sender.name(),
            "Service state initialized"
        );
        Ok(Arc::new(state))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// リクエストを検証して検知し、顧客IDがあればアラートを評価
    pub async fn detect(
        &self,
        request: &DetectionRequest,
        customer_id: Option<&str>,
    ) -> Result<DetectionResponse> {
        let series = ScoreSeries::from_request(request)?;
        let result = self.score(&series).await?;

        let Some(customer_id) = customer_id else {
            return Ok(DetectionResponse::Plain(result));
        };

        let alert = self.alerts.evaluate(customer_id, &result).await;
        self.stats.record_alert(&alert);
        Ok(DetectionResponse::WithAlert {
            anomaly_detection: result,
            alert,
        })
    }

    /// 検証済み系列をスコアリング（キャッシュ経由）
    ///
    /// 同じフィンガープリントの計算は同時に1つだけ走る。
    pub async fn score(&self, series: &ScoreSeries) -> Result<Arc<DetectionResult>> {
        let key = fingerprint(series);
        if let Some(hit) = self.cache.lookup(&key).await {
            return Ok(hit);
        }

        let flight = self.inflight_lock(&key).await;
        let outcome = {
            let _guard = flight.lock().await;
            self.compute_once(&key, series).await
        };
        self.release_inflight(&key, flight).await;
        outcome
    }

    async fn compute_once(&self, key: &str, series: &ScoreSeries) -> Result<Arc<DetectionResult>> {
        // 待機中に他のリクエストが計算済みならそれを使う
        if let Some(hit) = self.cache.peek(key).await {
            return Ok(hit);
        }

        let detector = self.detector.clone();
        let owned = series.clone();
        let processed_at = self.clock.now();
        let computed = tokio::task::spawn_blocking(move || detector.detect(&owned, processed_at))
            .await
            .map_err(|e| Error::Internal(format!("Scoring task failed: {}", e)))?;

        let result = match computed {
            Ok(result) => Arc::new(result),
            Err(e) => {
                error!(points = series.len(), "Error in anomaly detection: {}", e);
                return Err(e);
            }
        };

        self.cache.store(key.to_string(), result.clone()).await;
        self.stats.record_detection();
        Ok(result)
    }

    async fn inflight_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.inflight
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_inflight(&self, key: &str, flight: Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().await;
        // マップと自分以外に保持者がいなければ削除
        if Arc::strong_count(&flight) <= 2 {
            inflight.remove(key);
        }
        drop(flight);
    }

    /// 現在の統計
    pub async fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            detections_computed: self.stats.detections_computed.load(Ordering::Relaxed),
            requests_throttled: self.stats.requests_throttled.load(Ordering::Relaxed),
            alerts_sent: AlertCounts {
                warning: self.stats.warning_alerts.load(Ordering::Relaxed),
                critical: self.stats.critical_alerts.load(Ordering::Relaxed),
            },
            cache: self.cache.stats().await,
            uptime_seconds: elapsed_secs(self.started_at, self.clock.now()),
        }
    }
}
