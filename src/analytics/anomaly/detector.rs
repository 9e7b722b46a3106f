//! Anomaly Detector Implementation
//!
//! 特徴量抽出 → 標準化 → Isolation Forest によるバッチ異常検知

use super::features::{FeatureExtractor, FEATURE_COUNT};
use super::isolation_forest::IsolationForest;
use super::scaler::StandardScaler;
use super::types::{DetectionResult, ScoreSeries};
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// 異常検知器
///
/// リクエストごとにモデルを学習する。学習済みモデルは保持しない。
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// モデル設定
    config: ModelConfig,
    /// 特徴量抽出器
    extractor: FeatureExtractor,
}

impl AnomalyDetector {
    /// 新しい異常検知器を作成
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    /// モデル設定
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// 系列の各点が異常かどうかを判定
    pub fn flag_anomalies(&self, values: &[f64]) -> Result<Vec<bool>> {
        if values.is_empty() {
            return Err(Error::Computation(
                "Cannot score an empty series".to_string(),
            ));
        }

        let rows: Vec<[f64; FEATURE_COUNT]> = self
            .extractor
            .extract(values)
            .iter()
            .map(|f| f.as_array())
            .collect();

        let scaled = StandardScaler::<FEATURE_COUNT>::fit_transform(&rows);
        let flags = IsolationForest::new(&self.config).fit_predict(&scaled)?;

        if flags.len() != values.len() {
            return Err(Error::Internal(format!(
                "Scorer returned {} flags for {} points",
                flags.len(),
                values.len()
            )));
        }

        Ok(flags)
    }

    /// 系列を検知して結果を作成
    pub fn detect(&self, series: &ScoreSeries, processed_at: DateTime<Utc>) -> Result<DetectionResult> {
        let values = series.values();
        debug!(points = values.len(), "Processing data");

        let flags = self.flag_anomalies(&values)?;
        let result = DetectionResult::new(flags, &values, processed_at);

        debug!(
            anomaly_count = result.metadata.anomaly_count,
            anomaly_percentage = result.metadata.anomaly_percentage,
            "Detection completed"
        );

        Ok(result)
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::DetectionRequest;

    fn series(scores: &[f64]) -> ScoreSeries {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..scores.len())
            .map(|i| (start + chrono::Duration::days(i as i64)).to_string())
            .collect();
        ScoreSeries::from_request(&DetectionRequest {
            dates,
            scores: scores.to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn test_dominant_outlier_flagged() {
        let detector = AnomalyDetector::default();
        let result = detector
            .detect(&series(&[1.0, 1.0, 1.0, 1.0, 50.0]), Utc::now())
            .unwrap();

        assert_eq!(result.anomalies, vec![false, false, false, false, true]);
        assert_eq!(result.metadata.anomaly_count, 1);
        assert_eq!(result.metadata.anomaly_percentage, 20.0);
    }

    #[test]
    fn test_flags_match_input_length() {
        let detector = AnomalyDetector::default();
        let scores: Vec<f64> = (0..120).map(|i| ((i * 37) % 11) as f64).collect();
        let result = detector.detect(&series(&scores), Utc::now()).unwrap();

        assert_eq!(result.anomalies.len(), scores.len());
        assert_eq!(
            result.metadata.anomaly_count,
            result.anomalies.iter().filter(|&&a| a).count()
        );
    }

    #[test]
    fn test_reproducible_for_fixed_seed() {
        let detector = AnomalyDetector::default();
        let scores: Vec<f64> = (0..60).map(|i| (i as f64 * 0.7).sin().abs() * 10.0).collect();
        let a = detector.flag_anomalies(&scores).unwrap();
        let b = detector.flag_anomalies(&scores).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_inputs_do_not_fail() {
        let detector = AnomalyDetector::default();
        assert_eq!(detector.flag_anomalies(&[3.0]).unwrap(), vec![false]);
        assert!(detector
            .flag_anomalies(&[4.0; 10])
            .unwrap()
            .iter()
            .all(|&a| !a));
    }

    #[test]
    fn test_empty_values_is_computation_error() {
        let detector = AnomalyDetector::default();
        assert!(matches!(
            detector.flag_anomalies(&[]),
            Err(Error::Computation(_))
        ));
    }
}
