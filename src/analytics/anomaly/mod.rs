//! Anomaly Detection Module
//!
//! 異常検知システム

mod detector;
mod features;
mod isolation_forest;
mod scaler;
mod types;

pub use detector::AnomalyDetector;
pub use features::{FeatureExtractor, FeatureVector, FEATURE_COUNT, FEATURE_NAMES, ROLLING_WINDOW};
pub use isolation_forest::{average_path_length, FittedForest, IsolationForest};
pub use scaler::StandardScaler;
pub use types::{
    parse_timestamp, round2, DetectionMetadata, DetectionRequest, DetectionResult, ScorePoint,
    ScoreSeries, MAX_POINTS,
};
