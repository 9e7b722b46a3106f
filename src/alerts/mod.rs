//! Alerting Module
//!
//! 顧客別アラート判定・通知・設定の永続化

pub mod engine;
pub mod notifier;
pub mod store;
pub mod types;

pub use engine::{assess, render_message, AlertEngine};
pub use notifier::{LogNotifier, NotificationSender, WebhookNotifier};
pub use store::{AlertConfigMap, AlertConfigStore, JsonFileStore, MemoryStore};
pub use types::{
    AlertConfig, AlertDecision, AlertRecord, AlertThresholds, Severity, SuppressionReason,
};
