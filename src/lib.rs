//! # scorewatch
//!
//! Anomaly detection service for customer engagement score series.
//!
//! Each request is admitted by a per-client token bucket, scored with a seeded
//! isolation forest over rolling-window features, cached by input fingerprint,
//! and optionally evaluated against per-customer alert thresholds with a cooldown.

pub mod alerts;
pub mod analytics;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http_server;
pub mod logging;
pub mod security;
pub mod service;

pub use error::{Error, Result, ValidationError};
pub use service::{DetectionResponse, ServiceState};
