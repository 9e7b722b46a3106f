//! Error types for the scorewatch service.

use thiserror::Error;

/// Result type alias for scorewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for detection, admission and alerting
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any processing
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Admission controller denied the request
    #[error("Rate limit exceeded, retry after {retry_after_secs:.2}s")]
    RateLimited { retry_after_secs: f64 },

    /// Feature extraction or scoring failed
    #[error("Computation error: {0}")]
    Computation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Notification delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Alert configuration could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 呼び出し元に返すべきエラーかどうか
    ///
    /// 通知・永続化エラーは検知レスポンスを失敗させない。
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::RateLimited { .. }
                | Error::Computation(_)
                | Error::Internal(_)
        )
    }
}

/// 入力検証エラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// スコアが空
    #[error("Scores list cannot be empty")]
    EmptyScores,

    /// 日付が空
    #[error("Dates list cannot be empty")]
    EmptyDates,

    /// データ点数が上限を超過
    #[error("Too many data points: {actual}. Maximum allowed is {max}")]
    TooManyPoints { max: usize, actual: usize },

    /// 日付とスコアの件数不一致
    #[error("Number of dates ({dates}) must match number of scores ({scores})")]
    LengthMismatch { dates: usize, scores: usize },

    /// 負のスコア
    #[error("Scores cannot be negative (index {index})")]
    NegativeScore { index: usize },

    /// NaN / 無限大
    #[error("All scores must be finite numbers (index {index})")]
    NonFiniteScore { index: usize },

    /// 日付の形式不正
    #[error("Invalid date format at index {index}: '{value}'. Use ISO format")]
    InvalidTimestamp { index: usize, value: String },

    /// アラート閾値の不正
    #[error("Invalid alert thresholds: {0}")]
    InvalidThresholds(String),

    /// リクエストボディを解釈できない
    #[error("{0}")]
    InvalidBody(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_conversion() {
        let err: Error = ValidationError::EmptyScores.into();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyScores)));
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_caller_visibility() {
        assert!(Error::RateLimited {
            retry_after_secs: 1.0
        }
        .is_caller_visible());
        assert!(Error::Computation("degenerate".to_string()).is_caller_visible());
        assert!(!Error::Notification("smtp down".to_string()).is_caller_visible());
        assert!(!Error::Persistence("disk full".to_string()).is_caller_visible());
    }

    #[test]
    fn test_too_many_points_message() {
        let err = ValidationError::TooManyPoints {
            max: 1000,
            actual: 1001,
        };
        assert!(err.to_string().contains("1001"));
        assert!(err.to_string().contains("1000"));
    }
}
