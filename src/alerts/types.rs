//! Alert Types
//!
//! アラート設定・判定結果・履歴の型定義

use crate::analytics::DetectionMetadata;
use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// アラート閾値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// 異常点の割合がこれ以上で warning (0.0-1.0)
    pub warning_threshold: f64,
    /// 異常点の割合がこれ以上で critical (0.0-1.0)
    pub critical_threshold: f64,
    /// アラートに必要な最小異常点数
    pub min_anomaly_points: usize,
    /// 同一顧客へのアラート間隔（分）
    pub cooldown_minutes: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            warning_threshold: 0.15,
            critical_threshold: 0.30,
            min_anomaly_points: 3,
            cooldown_minutes: 60,
        }
    }
}

/// クールダウンの上限（分）。chrono の Duration がミリ秒で表現できる範囲
pub const MAX_COOLDOWN_MINUTES: i64 = i64::MAX / 60_000;

impl AlertThresholds {
    /// クールダウン期間（範囲外は最大値に丸める）
    pub fn cooldown(&self) -> Duration {
        Duration::try_minutes(self.cooldown_minutes.clamp(0, MAX_COOLDOWN_MINUTES))
            .unwrap_or(Duration::MAX)
    }

    /// 閾値の整合性をチェック
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("warning_threshold", self.warning_threshold),
            ("critical_threshold", self.critical_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidThresholds(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(ValidationError::InvalidThresholds(format!(
                "warning_threshold ({}) must not exceed critical_threshold ({})",
                self.warning_threshold, self.critical_threshold
            )));
        }
        if self.cooldown_minutes < 0 {
            return Err(ValidationError::InvalidThresholds(
                "cooldown_minutes cannot be negative".to_string(),
            ));
        }
        if self.cooldown_minutes > MAX_COOLDOWN_MINUTES {
            return Err(ValidationError::InvalidThresholds(format!(
                "cooldown_minutes must not exceed {}, got {}",
                MAX_COOLDOWN_MINUTES, self.cooldown_minutes
            )));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

/// 顧客別アラート設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 通知先
    pub email_recipients: Vec<String>,
    #[serde(default)]
    pub thresholds: AlertThresholds,
    /// 最後に通知に成功した時刻
    #[serde(default)]
    pub last_alert_time: Option<DateTime<Utc>>,
}

impl AlertConfig {
    /// システムのデフォルト設定（宛先はシステムのアラートアドレス）
    pub fn system_default(from_address: &str) -> Self {
        Self {
            enabled: true,
            email_recipients: vec![from_address.to_string()],
            thresholds: AlertThresholds::default(),
            last_alert_time: None,
        }
    }

    /// 設定を検証
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.thresholds.validate()
    }

    /// クールダウン中かどうか
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_alert_time {
            Some(last) => now.signed_duration_since(last) < self.thresholds.cooldown(),
            None => false,
        }
    }
}

/// アラートの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知しなかった理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressionReason {
    /// アラート無効
    Disabled,
    /// クールダウン中
    Cooldown,
    /// 異常点数が最小値未満
    InsufficientPoints,
    /// 割合が閾値未満
    BelowThreshold,
    /// 通知送信に失敗
    NotificationFailed(String),
}

impl SuppressionReason {
    /// レスポンスに載せる理由コード
    pub fn code(&self) -> &'static str {
        match self {
            SuppressionReason::Disabled => "disabled",
            SuppressionReason::Cooldown => "cooldown",
            SuppressionReason::InsufficientPoints => "insufficient points",
            SuppressionReason::BelowThreshold => "below threshold",
            SuppressionReason::NotificationFailed(_) => "notification failed",
        }
    }

    /// 人が読むメッセージ
    pub fn message(&self) -> String {
        match self {
            SuppressionReason::Disabled => "Alerts disabled for customer".to_string(),
            SuppressionReason::Cooldown => "Alert cooldown period active".to_string(),
            SuppressionReason::InsufficientPoints => {
                "Not enough anomaly points to trigger alert".to_string()
            }
            SuppressionReason::BelowThreshold => "No alert conditions met".to_string(),
            SuppressionReason::NotificationFailed(reason) => {
                format!("Failed to send alert: {}", reason)
            }
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// アラート判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub sent: bool,
    pub severity: Option<Severity>,
    /// 抑制理由（送信時は None）
    pub reason: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertDecision {
    /// 送信成功
    pub fn notified(severity: Severity, timestamp: DateTime<Utc>) -> Self {
        Self {
            sent: true,
            severity: Some(severity),
            reason: None,
            message: format!("{} alert sent successfully", severity.as_str().to_uppercase()),
            timestamp,
        }
    }

    /// 抑制（送信失敗時のみ重要度を保持する）
    pub fn suppressed(
        reason: SuppressionReason,
        severity: Option<Severity>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sent: false,
            severity,
            reason: Some(reason.code().to_string()),
            message: reason.message(),
            timestamp,
        }
    }
}

/// アラート履歴レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: String,
    pub customer_id: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// 通知時点の検知メタデータ
    pub details: DetectionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let thresholds = AlertThresholds::default();
        assert_eq!(thresholds.warning_threshold, 0.15);
        assert_eq!(thresholds.critical_threshold, 0.30);
        assert_eq!(thresholds.min_anomaly_points, 3);
        assert_eq!(thresholds.cooldown(), Duration::minutes(60));
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let inverted = AlertThresholds {
            warning_threshold: 0.5,
            critical_threshold: 0.2,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidThresholds(_))
        ));

        let out_of_range = AlertThresholds {
            critical_threshold: 1.5,
            ..Default::default()
        };
        assert!(out_of_range.validate().is_err());

        let nan = AlertThresholds {
            warning_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_cooldown_upper_bound() {
        let huge = AlertThresholds {
            cooldown_minutes: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ValidationError::InvalidThresholds(_))
        ));
        // 検証を経ない値でもパニックしない
        assert_eq!(huge.cooldown(), Duration::try_minutes(MAX_COOLDOWN_MINUTES).unwrap());

        let longest = AlertThresholds {
            cooldown_minutes: MAX_COOLDOWN_MINUTES,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());

        let config = AlertConfig {
            enabled: true,
            email_recipients: vec!["ops@example.com".to_string()],
            thresholds: huge,
            last_alert_time: Some(Utc::now()),
        };
        assert!(config.in_cooldown(Utc::now()));
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: AlertConfig =
            serde_json::from_str(r#"{"email_recipients": ["ops@example.com"]}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.thresholds, AlertThresholds::default());
        assert!(config.last_alert_time.is_none());
    }

    #[test]
    fn test_cooldown_window() {
        let now = Utc::now();
        let mut config = AlertConfig::system_default("alerts@example.com");
        assert!(!config.in_cooldown(now));

        config.last_alert_time = Some(now - Duration::minutes(59));
        assert!(config.in_cooldown(now));

        config.last_alert_time = Some(now - Duration::minutes(60));
        assert!(!config.in_cooldown(now));
    }

    #[test]
    fn test_decision_messages() {
        let now = Utc::now();
        let sent = AlertDecision::notified(Severity::Critical, now);
        assert!(sent.sent);
        assert_eq!(sent.message, "CRITICAL alert sent successfully");

        let failed = AlertDecision::suppressed(
            SuppressionReason::NotificationFailed("timeout".to_string()),
            Some(Severity::Warning),
            now,
        );
        assert!(!failed.sent);
        assert_eq!(failed.severity, Some(Severity::Warning));
        assert_eq!(failed.reason.as_deref(), Some("notification failed"));
        assert_eq!(failed.message, "Failed to send alert: timeout");
    }

    #[test]
    fn test_severity_serialization() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(Severity::Warning.to_string(), "warning");
    }
}
