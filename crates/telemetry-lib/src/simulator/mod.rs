//! Telemetry synthesis
//!
//! Generates readings for every sensor of every online device on a fixed
//! cadence and screens them for anomalies and threshold breaches.

mod r#loop;
mod poll;

pub use poll::{assess_quality, poll_device};
pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder, PollSummary};

use crate::models::Sensor;
use rand::Rng;

/// Default noise band as a fraction of the sensor type's base value
pub const DEFAULT_NOISE_RATIO: f64 = 0.05;

/// Source of raw sensor values.
///
/// Values may fall outside the sensor's declared range; the simulator clamps
/// them and records the raw value in the reading's metadata.
pub trait ReadingSource: Send + Sync {
    fn sample(&self, sensor: &Sensor) -> f64;
}

/// Base value for the sensor type plus uniform noise
#[derive(Debug, Clone)]
pub struct RandomReadingSource {
    noise_ratio: f64,
}

impl RandomReadingSource {
    /// Ratios outside `0.0..=1.0` are clamped; a non-finite ratio means no noise
    pub fn new(noise_ratio: f64) -> Self {
        let noise_ratio = if noise_ratio.is_finite() {
            noise_ratio.abs().min(1.0)
        } else {
            0.0
        };
        Self { noise_ratio }
    }
}

impl Default for RandomReadingSource {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_RATIO)
    }
}

impl ReadingSource for RandomReadingSource {
    fn sample(&self, sensor: &Sensor) -> f64 {
        let base = sensor.sensor_type.base_value();
        let spread = base.abs() * self.noise_ratio;
        if !spread.is_finite() || spread <= 0.0 {
            return base;
        }
        base + rand::thread_rng().gen_range(-spread..=spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Reading, SensorType};
    use chrono::Utc;

    fn sensor(sensor_type: SensorType, range: (f64, f64)) -> Sensor {
        let now = Utc::now();
        Sensor {
            id: "s1".to_string(),
            sensor_type,
            unit: "u".to_string(),
            range,
            accuracy: 0.95,
            calibrated_at: now,
            calibration_due: now,
            last_reading: Reading::placeholder("s1", "u", now),
        }
    }

    #[test]
    fn test_random_source_stays_near_base() {
        let source = RandomReadingSource::default();
        let s = sensor(SensorType::Temperature, (-40.0, 85.0));
        for _ in 0..1000 {
            let v = source.sample(&s);
            assert!((v - 21.0).abs() <= 21.0 * DEFAULT_NOISE_RATIO + 1e-9);
        }
    }

    #[test]
    fn test_zero_noise_returns_base() {
        let source = RandomReadingSource::new(0.0);
        let s = sensor(SensorType::Pressure, (900.0, 1100.0));
        assert_eq!(source.sample(&s), SensorType::Pressure.base_value());
    }

    #[test]
    fn test_unbounded_noise_ratio_does_not_panic() {
        let s = sensor(SensorType::Pressure, (900.0, 1100.0));
        let base = SensorType::Pressure.base_value();

        let nan = RandomReadingSource::new(f64::NAN);
        assert_eq!(nan.sample(&s), base);

        let huge = RandomReadingSource::new(1e307);
        for _ in 0..100 {
            let v = huge.sample(&s);
            assert!(v.is_finite());
            assert!((v - base).abs() <= base.abs() + 1e-9);
        }
    }
}
