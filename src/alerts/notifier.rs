//! Notification Senders
//!
//! アラート通知の送信先

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// 通知送信トレイト
///
/// 失敗は `Err` で返す。呼び出し側で抑制理由に変換される。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;

    /// 送信方式の名前
    fn name(&self) -> &'static str;
}

/// ログ出力のみの送信
///
/// 送信手段が設定されていない場合に使う。
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        warn!("Notification transport not configured, alert logged only");
        info!(recipients = ?recipients, subject = %subject, "{}", body);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipients: &'a [String],
    subject: &'a str,
    body: &'a str,
}

/// Webhook への JSON POST による送信
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// 新しい Webhook 送信を作成
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSender for WebhookNotifier {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        let payload = WebhookPayload {
            recipients,
            subject,
            body,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Notification(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "Webhook responded with status {}",
                status
            )));
        }

        info!(recipients = ?recipients, "Alert notification sent via webhook");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        let result = notifier
            .send(&["ops@example.com".to_string()], "subject", "body")
            .await;
        assert!(result.is_ok());
        assert_eq!(notifier.name(), "log");
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_notification_error() {
        // ポート0には接続できない
        let notifier = WebhookNotifier::new("http://127.0.0.1:0/alerts").unwrap();
        assert_eq!(notifier.url(), "http://127.0.0.1:0/alerts");

        let result = notifier.send(&[], "subject", "body").await;
        assert!(matches!(result, Err(Error::Notification(_))));
    }

    #[test]
    fn test_webhook_payload_shape() {
        let recipients = vec!["a@example.com".to_string()];
        let payload = WebhookPayload {
            recipients: &recipients,
            subject: "s",
            body: "b",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["recipients"][0], "a@example.com");
        assert_eq!(json["subject"], "s");
        assert_eq!(json["body"], "b");
    }
}
