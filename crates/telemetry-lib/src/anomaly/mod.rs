//! Reading screening and alert emission
//!
//! This module provides:
//! - Rolling z-score outlier detection per sensor
//! - A static threshold table keyed by sensor type
//! - Alert dispatch with deduplication

mod alerter;
pub mod threshold;
mod zscore;

use serde::{Deserialize, Serialize};

pub use alerter::{AlertDispatcher, DEFAULT_DEDUP_WINDOW};
pub use threshold::{evaluate, threshold_for, Breach, Threshold, ThresholdViolation};
pub use zscore::{
    RollingStats, ZScoreAnomaly, ZScoreDetector, DEFAULT_STD_DEV_THRESHOLD, DEFAULT_WINDOW,
    MIN_SAMPLES_FOR_DETECTION,
};

/// Severity attached to anomalies and threshold violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}
