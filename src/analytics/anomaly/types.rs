//! Anomaly Detection Types
//!
//! 異常検知の入出力型定義

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1リクエストあたりの最大データ点数
pub const MAX_POINTS: usize = 1000;

/// 検知リクエスト（受信形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// ISO形式の日付文字列
    pub dates: Vec<String>,
    /// 非負のスコア
    pub scores: Vec<f64>,
}

/// 検証済みのデータ点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// 検証済みスコア系列
///
/// 生成後は不変。受信した日付文字列もフィンガープリント用に保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSeries {
    raw_dates: Vec<String>,
    points: Vec<ScorePoint>,
}

impl ScoreSeries {
    /// リクエストを検証して系列を作成
    pub fn from_request(request: &DetectionRequest) -> Result<Self, ValidationError> {
        let scores = &request.scores;
        let dates = &request.dates;

        if scores.is_empty() {
            return Err(ValidationError::EmptyScores);
        }
        if scores.len() > MAX_POINTS {
            return Err(ValidationError::TooManyPoints {
                max: MAX_POINTS,
                actual: scores.len(),
            });
        }
        for (index, &score) in scores.iter().enumerate() {
            if !score.is_finite() {
                return Err(ValidationError::NonFiniteScore { index });
            }
            if score < 0.0 {
                return Err(ValidationError::NegativeScore { index });
            }
        }

        if dates.is_empty() {
            return Err(ValidationError::EmptyDates);
        }
        if dates.len() != scores.len() {
            return Err(ValidationError::LengthMismatch {
                dates: dates.len(),
                scores: scores.len(),
            });
        }

        let points = dates
            .iter()
            .zip(scores.iter())
            .enumerate()
            .map(|(index, (date, &value))| {
                parse_timestamp(date)
                    .map(|timestamp| ScorePoint { timestamp, value })
                    .ok_or_else(|| ValidationError::InvalidTimestamp {
                        index,
                        value: date.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw_dates: dates.clone(),
            points,
        })
    }

    /// データ点数
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 空かどうか（検証済み系列では常にfalse）
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// データ点
    pub fn points(&self) -> &[ScorePoint] {
        &self.points
    }

    /// スコア値のみ
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// 受信時の日付文字列
    pub fn raw_dates(&self) -> &[String] {
        &self.raw_dates
    }
}

impl TryFrom<&DetectionRequest> for ScoreSeries {
    type Error = ValidationError;

    fn try_from(request: &DetectionRequest) -> Result<Self, Self::Error> {
        Self::from_request(request)
    }
}

/// ISO 8601 形式の日付を解析
///
/// RFC 3339、タイムゾーンなしの日時、日付のみを受け付ける（タイムゾーンなしはUTC扱い）。
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 検知結果のメタデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    pub total_points: usize,
    pub anomaly_count: usize,
    /// 0-100、小数点以下2桁
    pub anomaly_percentage: f64,
    pub processed_at: DateTime<Utc>,
    pub mean_score: f64,
    pub std_score: f64,
}

/// 検知結果
///
/// `new` 以外から作らないこと。件数と割合はフラグ列から導出される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub anomalies: Vec<bool>,
    pub metadata: DetectionMetadata,
}

impl DetectionResult {
    /// フラグ列と元の値からメタデータを計算して結果を作成
    pub fn new(anomalies: Vec<bool>, values: &[f64], processed_at: DateTime<Utc>) -> Self {
        let total_points = anomalies.len();
        let anomaly_count = anomalies.iter().filter(|&&flag| flag).count();
        let anomaly_percentage = if total_points == 0 {
            0.0
        } else {
            round2(anomaly_count as f64 / total_points as f64 * 100.0)
        };

        let (mean, std_dev) = mean_and_sample_std(values);

        Self {
            anomalies,
            metadata: DetectionMetadata {
                total_points,
                anomaly_count,
                anomaly_percentage,
                processed_at,
                mean_score: round2(mean),
                std_score: round2(std_dev),
            },
        }
    }

    /// 異常点の割合（0.0-1.0）
    pub fn anomaly_fraction(&self) -> f64 {
        self.metadata.anomaly_percentage / 100.0
    }
}

/// 小数点以下2桁に丸める
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 平均と標本標準偏差（n-1）。1点以下の場合の標準偏差は0
fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
