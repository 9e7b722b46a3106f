//! Security Module
//!
//! クライアント・ルート単位のアドミッション制御

pub mod rate_limiter;

pub use rate_limiter::{Admission, AdmissionController};
