//! Rolling z-score outlier detection
//!
//! Flags a reading when it sits more than a configurable number of standard
//! deviations away from the mean of the sensor's most recent readings.
//! Statistics are recomputed from the window on every call.

use super::Severity;
use serde::{Deserialize, Serialize};

/// Default number of prior readings considered
pub const DEFAULT_WINDOW: usize = 10;

/// Minimum prior readings required before detection runs
pub const MIN_SAMPLES_FOR_DETECTION: usize = 5;

/// Default deviation threshold in standard deviations
pub const DEFAULT_STD_DEV_THRESHOLD: f64 = 2.0;

/// Detects readings that deviate from the recent rolling mean
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    /// Number of standard deviations to consider an anomaly
    pub std_dev_threshold: f64,
    /// How many prior readings feed the statistics
    pub window: usize,
    /// Detection is skipped below this many prior readings
    pub min_samples: usize,
}

impl ZScoreDetector {
    pub fn new(std_dev_threshold: f64) -> Self {
        Self {
            std_dev_threshold,
            ..Default::default()
        }
    }

    /// Check `current` against prior readings, oldest first.
    ///
    /// Only the last `window` values of `prior` are used.
    pub fn detect(&self, current: f64, prior: &[f64]) -> Option<ZScoreAnomaly> {
        let start = prior.len().saturating_sub(self.window);
        let stats = RollingStats::from_samples(&prior[start..]);

        if stats.count < self.min_samples {
            return None;
        }

        // Avoid division by zero on a flat window
        if stats.std_dev < f64::EPSILON {
            return None;
        }

        let deviation = current - stats.mean;
        if deviation.abs() > self.std_dev_threshold * stats.std_dev {
            Some(ZScoreAnomaly {
                value: current,
                mean: stats.mean,
                std_dev: stats.std_dev,
                z_score: deviation / stats.std_dev,
                threshold: self.std_dev_threshold,
            })
        } else {
            None
        }
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self {
            std_dev_threshold: DEFAULT_STD_DEV_THRESHOLD,
            window: DEFAULT_WINDOW,
            min_samples: MIN_SAMPLES_FOR_DETECTION,
        }
    }
}

/// Mean and population standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl RollingStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let count = samples.len();
        if count == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                count,
            };
        }

        let mean = samples.iter().sum::<f64>() / count as f64;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            mean,
            std_dev: variance.sqrt(),
            count,
        }
    }
}

/// Details of a flagged reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreAnomaly {
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Signed number of standard deviations from the mean
    pub z_score: f64,
    pub threshold: f64,
}

impl ZScoreAnomaly {
    /// Severity grows with distance from the mean
    pub fn severity(&self) -> Severity {
        let z = self.z_score.abs();
        if z >= 4.0 {
            Severity::Critical
        } else if z >= 3.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}
