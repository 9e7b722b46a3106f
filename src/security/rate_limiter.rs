use crate::clock::{elapsed_secs, Clock};
use crate::config::RateLimitConfig;
use crate::error::Error;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// 浮動小数点の誤差で1トークン未満と判定されないための許容幅
const TOKEN_EPSILON: f64 = 1e-9;

/// 判定結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// 許可（残りトークン数）
    Allowed { remaining: f64 },
    /// 拒否（再試行までの目安秒数）
    Denied { retry_after_secs: f64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// (クライアント, ルート) ごとのトークンバケット方式によるレート制限
#[derive(Debug)]
pub struct AdmissionController {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String), TokenBucket>>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl AdmissionController {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// バケット容量（= 1分あたりのリクエスト数）
    pub fn capacity(&self) -> f64 {
        self.config.requests_per_minute
    }

    /// 1秒あたりの補充量
    pub fn refill_rate(&self) -> f64 {
        self.capacity() / 60.0
    }

    /// 拒否時の再試行目安（秒）
    pub fn retry_after_secs(&self) -> f64 {
        60.0 / self.capacity()
    }

    /// リクエストの実行許可をチェック
    ///
    /// バケットの読み出しから更新までをロック内で行う。拒否時は状態を変更しない。
    pub async fn admit(&self, client_id: &str, route: &str) -> Admission {
        if !self.config.enabled {
            return Admission::Allowed {
                remaining: self.capacity(),
            };
        }

        let now = self.clock.now();
        let capacity = self.capacity();
        let key = (client_id.to_string(), route.to_string());

        let mut buckets = self.buckets.lock().await;
        let tokens = match buckets.get(&key) {
            Some(bucket) => {
                let elapsed = elapsed_secs(bucket.last_refill, now);
                (bucket.tokens + elapsed * self.refill_rate()).min(capacity)
            }
            None => capacity,
        };

        if tokens + TOKEN_EPSILON < 1.0 {
            drop(buckets);
            warn!(client = %client_id, route = %route, "Request throttled");
            return Admission::Denied {
                retry_after_secs: self.retry_after_secs(),
            };
        }

        let remaining = (tokens - 1.0).max(0.0);
        buckets.insert(
            key,
            TokenBucket {
                tokens: remaining,
                last_refill: now,
            },
        );

        Admission::Allowed { remaining }
    }

    /// 許可されなければ `Error::RateLimited` を返す
    pub async fn check_rate_limit(&self, client_id: &str, route: &str) -> Result<(), Error> {
        match self.admit(client_id, route).await {
            Admission::Allowed { .. } => Ok(()),
            Admission::Denied { retry_after_secs } => Err(Error::RateLimited { retry_after_secs }),
        }
    }

    /// 設定情報を取得
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// 現在のバケット状態を取得（デバッグ用）
    pub async fn bucket_status(&self, client_id: &str, route: &str) -> Option<(f64, f64)> {
        let buckets = self.buckets.lock().await;
        buckets
            .get(&(client_id.to_string(), route.to_string()))
            .map(|bucket| (bucket.tokens, self.capacity()))
    }
}
