//! Telemetry event bus
//!
//! A closed set of event kinds fanned out over a broadcast channel.
//! Consumers dispatch with `match` on [`TelemetryEvent`].

use crate::anomaly::{Breach, Severity, ThresholdViolation, ZScoreAnomaly};
use crate::models::{DeviceStatus, SensorType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast buffer per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A reading that deviated from its sensor's rolling mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub device_id: String,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub anomaly: ZScoreAnomaly,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// A reading outside its sensor type's safe band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub device_id: String,
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub breach: Breach,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl ThresholdEvent {
    pub fn from_violation(
        device_id: &str,
        sensor_id: &str,
        violation: ThresholdViolation,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            sensor_id: sensor_id.to_string(),
            sensor_type: violation.sensor_type,
            value: violation.value,
            min: violation.threshold.min,
            max: violation.threshold.max,
            breach: violation.breach,
            severity: violation.threshold.severity,
            timestamp,
        }
    }
}

/// A device status transition observed by the health monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChange {
    pub device_id: String,
    pub previous: DeviceStatus,
    pub current: DeviceStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Anomaly,
    Threshold,
    HealthChanged,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Anomaly => write!(f, "anomaly"),
            EventKind::Threshold => write!(f, "threshold"),
            EventKind::HealthChanged => write!(f, "health_changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Anomaly(AnomalyEvent),
    Threshold(ThresholdEvent),
    HealthChanged(HealthChange),
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::Anomaly(_) => EventKind::Anomaly,
            TelemetryEvent::Threshold(_) => EventKind::Threshold,
            TelemetryEvent::HealthChanged(_) => EventKind::HealthChanged,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            TelemetryEvent::Anomaly(e) => &e.device_id,
            TelemetryEvent::Threshold(e) => &e.device_id,
            TelemetryEvent::HealthChanged(e) => &e.device_id,
        }
    }

    pub fn sensor_id(&self) -> Option<&str> {
        match self {
            TelemetryEvent::Anomaly(e) => Some(&e.sensor_id),
            TelemetryEvent::Threshold(e) => Some(&e.sensor_id),
            TelemetryEvent::HealthChanged(_) => None,
        }
    }
}

/// Broadcast fan-out for telemetry events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning how many subscribers received it.
    /// Zero subscribers is not an error.
    pub fn publish(&self, event: TelemetryEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health_change(device_id: &str) -> TelemetryEvent {
        TelemetryEvent::HealthChanged(HealthChange {
            device_id: device_id.to_string(),
            previous: DeviceStatus::Online,
            current: DeviceStatus::Error,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(health_change("dev-1")), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(health_change("dev-1")), 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.device_id(), "dev-1");
        assert_eq!(e1, e2);
        assert_eq!(e1.kind(), EventKind::HealthChanged);
        assert!(e1.sensor_id().is_none());
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let json = serde_json::to_value(health_change("dev-9")).unwrap();
        assert_eq!(json["kind"], "health_changed");
        assert_eq!(json["device_id"], "dev-9");
        assert_eq!(json["current"], "error");
    }
}
