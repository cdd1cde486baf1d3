//! Single-device poll step

use super::ReadingSource;
use crate::anomaly::{self, ZScoreDetector};
use crate::events::{AnomalyEvent, TelemetryEvent, ThresholdEvent};
use crate::models::{Device, Reading, ReadingMetadata, ReadingQuality};
use crate::registry::ReadingHistory;
use chrono::{DateTime, Utc};

/// Quality from the sensor's static accuracy and whether the raw value was in range
pub fn assess_quality(accuracy: f64, in_range: bool) -> ReadingQuality {
    if !in_range {
        return ReadingQuality::Poor;
    }
    if accuracy >= 0.95 {
        ReadingQuality::Excellent
    } else if accuracy >= 0.90 {
        ReadingQuality::Good
    } else if accuracy >= 0.80 {
        ReadingQuality::Fair
    } else {
        ReadingQuality::Poor
    }
}

/// Generate one reading per sensor and screen it.
///
/// For each sensor: sample, clamp, tag quality, append to history, replace
/// the last-reading slot, then run the anomaly and threshold checks against
/// the readings that preceded this one. Returns the events raised.
pub fn poll_device(
    device: &mut Device,
    history: &mut ReadingHistory,
    source: &dyn ReadingSource,
    detector: &ZScoreDetector,
    now: DateTime<Utc>,
) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();

    for sensor in device.sensors.iter_mut() {
        let raw = source.sample(sensor);
        let value = sensor.clamp(raw);
        let in_range = sensor.contains(raw);

        let prior = history.recent_values(&sensor.id, detector.window);

        let reading = Reading {
            value,
            timestamp: now,
            quality: assess_quality(sensor.accuracy, in_range),
            metadata: ReadingMetadata {
                sensor_id: sensor.id.clone(),
                unit: sensor.unit.clone(),
                raw_value: raw,
                clamped: !in_range,
            },
        };
        history.push(reading.clone());
        sensor.last_reading = reading;

        if let Some(found) = detector.detect(value, &prior) {
            events.push(TelemetryEvent::Anomaly(AnomalyEvent {
                device_id: device.id.clone(),
                sensor_id: sensor.id.clone(),
                sensor_type: sensor.sensor_type,
                severity: found.severity(),
                anomaly: found,
                timestamp: now,
            }));
        }

        if let Some(violation) = anomaly::evaluate(sensor.sensor_type, value) {
            events.push(TelemetryEvent::Threshold(ThresholdEvent::from_violation(
                &device.id, &sensor.id, violation, now,
            )));
        }
    }

    device.last_seen = now;
    events
}
