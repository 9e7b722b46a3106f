//! Analytics Module
//!
//! スコア系列の異常検知

pub mod anomaly;

pub use anomaly::{
    AnomalyDetector, DetectionMetadata, DetectionRequest, DetectionResult, ScoreSeries,
};
