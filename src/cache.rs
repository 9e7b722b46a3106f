//! Result Cache
//!
//! 入力系列のフィンガープリントをキーに検知結果を保持する。
//! TTL で失効し、容量上限に達したら最も長く参照されていないエントリを追い出す。

use crate::analytics::{DetectionResult, ScoreSeries};
use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// TTLの上限（10年）
const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// 系列のフィンガープリントを計算
///
/// 順序付きの (日付文字列, 値) の組だけから決まる。クライアントや顧客IDには依存しない。
pub fn fingerprint(series: &ScoreSeries) -> String {
    let mut hasher = Sha256::new();
    hasher.update((series.len() as u64).to_le_bytes());
    for (date, point) in series.raw_dates().iter().zip(series.points()) {
        hasher.update((date.len() as u64).to_le_bytes());
        hasher.update(date.as_bytes());
        hasher.update(point.value.to_bits().to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// キャッシュエントリ
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: Arc<DetectionResult>,
    pub expires_at: DateTime<Utc>,
    last_access: u64,
}

#[derive(Debug, Default)]
struct CacheTable {
    entries: HashMap<String, CacheEntry>,
    /// 参照順序のカウンタ
    tick: u64,
}

impl CacheTable {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// 有効なエントリを取得（期限切れなら削除）
    fn get_fresh(&mut self, key: &str, now: DateTime<Utc>) -> Option<Arc<DetectionResult>> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let tick = self.next_tick();
        self.entries.get_mut(key).map(|entry| {
            entry.last_access = tick;
            entry.result.clone()
        })
    }

    /// 期限切れエントリをクリーンアップ
    fn cleanup_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// 最も長く参照されていないエントリを削除
    fn evict_least_recent(&mut self) -> Option<String> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// キャッシュ統計
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_ratio: f64,
}

/// 検知結果キャッシュ
#[derive(Debug)]
pub struct ResultCache {
    table: Mutex<CacheTable>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// 新しいキャッシュを作成
    pub fn new(capacity: usize, ttl_seconds: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(CacheTable::default()),
            ttl: Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64),
            capacity: capacity.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// 結果を参照（ヒット/ミスを記録）
    pub async fn lookup(&self, key: &str) -> Option<Arc<DetectionResult>> {
        let now = self.clock.now();
        let found = self.table.lock().await.get_fresh(key, now);
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %key, "Cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    /// 結果を参照（統計に含めない）
    pub async fn peek(&self, key: &str) -> Option<Arc<DetectionResult>> {
        let now = self.clock.now();
        self.table.lock().await.get_fresh(key, now)
    }

    /// 結果を保存
    pub async fn store(&self, key: String, result: Arc<DetectionResult>) {
        let now = self.clock.now();
        let mut table = self.table.lock().await;

        if !table.entries.contains_key(&key) && table.entries.len() >= self.capacity {
            table.cleanup_expired(now);
            if table.entries.len() >= self.capacity {
                if let Some(evicted) = table.evict_least_recent() {
                    debug!(fingerprint = %evicted, "Evicted least recently used entry");
                }
            }
        }

        let tick = table.next_tick();
        table.entries.insert(
            key,
            CacheEntry {
                result,
                expires_at: now + self.ttl,
                last_access: tick,
            },
        );
    }

    /// 現在のエントリ数（期限切れは除外）
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.table.lock().await;
        table.cleanup_expired(now);
        table.entries.len()
    }

    /// 空かどうか
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 全エントリを削除
    pub async fn clear(&self) {
        self.table.lock().await.entries.clear();
    }

    /// 容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// ヒット/ミス統計
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = (hits + misses).max(1);
        CacheStats {
            hits,
            misses,
            size: self.len().await,
            hit_ratio: crate::analytics::anomaly::round2(hits as f64 / total as f64 * 100.0),
        }
    }
}
