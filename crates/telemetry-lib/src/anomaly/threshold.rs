//! Static safe-band table per sensor type
//!
//! Lookups are pure: the same `(sensor type, value)` pair always yields the
//! same verdict.

use super::Severity;
use crate::models::SensorType;
use serde::{Deserialize, Serialize};

/// Safe operating band for one sensor type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min: f64,
    pub max: f64,
    pub severity: Severity,
}

/// Which side of the band a value fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Breach {
    Below,
    Above,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdViolation {
    pub sensor_type: SensorType,
    pub value: f64,
    pub threshold: Threshold,
    pub breach: Breach,
}

/// Band for a sensor type, if it has one
pub fn threshold_for(sensor_type: SensorType) -> Option<Threshold> {
    let (min, max, severity) = match sensor_type {
        SensorType::Temperature => (-10.0, 45.0, Severity::High),
        SensorType::Humidity => (15.0, 85.0, Severity::Medium),
        SensorType::AirQuality => (0.0, 150.0, Severity::High),
        SensorType::Noise => (0.0, 85.0, Severity::Medium),
        SensorType::Vibration => (0.0, 8.0, Severity::Critical),
        SensorType::Pressure => (960.0, 1050.0, Severity::Low),
        SensorType::Battery => (15.0, 100.0, Severity::Medium),
        SensorType::Occupancy | SensorType::Light => return None,
    };
    Some(Threshold { min, max, severity })
}

/// Evaluate a value against its type's band. Bounds are inclusive.
pub fn evaluate(sensor_type: SensorType, value: f64) -> Option<ThresholdViolation> {
    let threshold = threshold_for(sensor_type)?;

    let breach = if value < threshold.min {
        Breach::Below
    } else if value > threshold.max {
        Breach::Above
    } else {
        return None;
    };

    Some(ThresholdViolation {
        sensor_type,
        value,
        threshold,
        breach,
    })
}
