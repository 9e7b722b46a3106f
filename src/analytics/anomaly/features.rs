//! Feature Extraction
//!
//! スコア系列から Isolation Forest 用の特徴量を抽出します。

use serde::{Deserialize, Serialize};

/// 特徴量の次元数
pub const FEATURE_COUNT: usize = 4;

/// 移動窓のサイズ
pub const ROLLING_WINDOW: usize = 3;

/// 特徴量名（列順）
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] =
    ["value", "rolling_mean", "rolling_std", "first_difference"];

/// 1データ点の特徴量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// 元の値
    pub value: f64,
    /// 直近3点の移動平均
    pub rolling_mean: f64,
    /// 直近3点の標本標準偏差（2点未満は0）
    pub rolling_stddev: f64,
    /// 前点との差分（先頭は0）
    pub first_difference: f64,
}

impl FeatureVector {
    /// 列ベクトルとして取得
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.value,
            self.rolling_mean,
            self.rolling_stddev,
            self.first_difference,
        ]
    }
}

/// 特徴量抽出器
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    window: usize,
}

impl FeatureExtractor {
    /// 新しい特徴量抽出器を作成
    pub fn new() -> Self {
        Self {
            window: ROLLING_WINDOW,
        }
    }

    /// 値の系列から特徴量を抽出
    ///
    /// 入力は空でないこと（呼び出し側で検証済みの前提）。
    pub fn extract(&self, values: &[f64]) -> Vec<FeatureVector> {
        debug_assert!(!values.is_empty(), "feature extraction on empty series");

        values
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let start = (i + 1).saturating_sub(self.window);
                let window = &values[start..=i];
                let (rolling_mean, rolling_stddev) = window_stats(window);
                let first_difference = if i == 0 { 0.0 } else { value - values[i - 1] };

                FeatureVector {
                    value,
                    rolling_mean,
                    rolling_stddev,
                    first_difference,
                }
            })
            .collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// 窓の平均と標本標準偏差
fn window_stats(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    if window.len() < 2 {
        return (mean, 0.0);
    }
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_extract_lengths_and_order() {
        let extractor = FeatureExtractor::new();
        let features = extractor.extract(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(features.len(), 4);
        assert_eq!(features[2].value, 3.0);
    }

    #[test]
    fn test_first_point() {
        let features = FeatureExtractor::new().extract(&[5.0]);
        assert_eq!(
            features[0],
            FeatureVector {
                value: 5.0,
                rolling_mean: 5.0,
                rolling_stddev: 0.0,
                first_difference: 0.0,
            }
        );
    }

    #[test]
    fn test_rolling_window_is_trailing_three() {
        let features = FeatureExtractor::new().extract(&[1.0, 3.0, 5.0, 11.0]);

        assert!(approx(features[1].rolling_mean, 2.0));
        // [1, 3] の標本標準偏差
        assert!(approx(features[1].rolling_stddev, 2.0_f64.sqrt()));

        assert!(approx(features[2].rolling_mean, 3.0));
        assert!(approx(features[2].rolling_stddev, 2.0));

        // 窓は [3, 5, 11]
        assert!(approx(features[3].rolling_mean, 19.0 / 3.0));
        assert!(approx(features[3].first_difference, 6.0));
    }

    #[test]
    fn test_constant_series_has_zero_deviation() {
        let features = FeatureExtractor::new().extract(&[2.0, 2.0, 2.0, 2.0]);
        assert!(features
            .iter()
            .all(|f| f.rolling_stddev == 0.0 && f.first_difference == 0.0));
    }

    #[test]
    fn test_as_array_column_order() {
        let f = FeatureVector {
            value: 1.0,
            rolling_mean: 2.0,
            rolling_stddev: 3.0,
            first_difference: 4.0,
        };
        assert_eq!(f.as_array(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(FEATURE_NAMES[2], "rolling_std");
    }
}
