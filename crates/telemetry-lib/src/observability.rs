//! Observability infrastructure for the telemetry simulator
//!
//! Provides:
//! - Prometheus metrics (poll latency, readings, anomalies, device counts)
//! - Structured JSON logging with tracing

use crate::anomaly::Severity;
use crate::events::{AnomalyEvent, HealthChange, ThresholdEvent};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TelemetryMetricsInner> = OnceLock::new();

struct TelemetryMetricsInner {
    poll_latency_seconds: Histogram,
    readings_generated: IntCounter,
    anomalies_detected: IntCounter,
    threshold_violations: IntCounter,
    health_changes: IntCounter,
    alerts_suppressed: IntCounter,
    ledger_errors: IntCounter,
    devices_registered: IntGauge,
    devices_online: IntGauge,
    health_monitors_active: IntGauge,
}

impl TelemetryMetricsInner {
    fn new() -> Self {
        Self {
            poll_latency_seconds: register_histogram!(
                "parking_telemetry_poll_latency_seconds",
                "Time spent on one poll cycle across all devices",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            readings_generated: register_int_counter!(
                "parking_telemetry_readings_generated_total",
                "Total number of sensor readings synthesized"
            )
            .expect("Failed to register readings_generated"),

            anomalies_detected: register_int_counter!(
                "parking_telemetry_anomalies_detected_total",
                "Total number of z-score anomalies raised"
            )
            .expect("Failed to register anomalies_detected"),

            threshold_violations: register_int_counter!(
                "parking_telemetry_threshold_violations_total",
                "Total number of readings outside their safe band"
            )
            .expect("Failed to register threshold_violations"),

            health_changes: register_int_counter!(
                "parking_telemetry_health_changes_total",
                "Total number of device status transitions from health checks"
            )
            .expect("Failed to register health_changes"),

            alerts_suppressed: register_int_counter!(
                "parking_telemetry_alerts_suppressed_total",
                "Total number of alerts dropped by deduplication"
            )
            .expect("Failed to register alerts_suppressed"),

            ledger_errors: register_int_counter!(
                "parking_telemetry_ledger_errors_total",
                "Total number of events the ledger failed to record"
            )
            .expect("Failed to register ledger_errors"),

            devices_registered: register_int_gauge!(
                "parking_telemetry_devices_registered",
                "Number of devices currently registered"
            )
            .expect("Failed to register devices_registered"),

            devices_online: register_int_gauge!(
                "parking_telemetry_devices_online",
                "Number of registered devices currently online"
            )
            .expect("Failed to register devices_online"),

            health_monitors_active: register_int_gauge!(
                "parking_telemetry_health_monitors_active",
                "Number of running per-device health check tasks"
            )
            .expect("Failed to register health_monitors_active"),
        }
    }
}

/// Telemetry metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct TelemetryMetrics {
    _private: (),
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TelemetryMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TelemetryMetricsInner {
        GLOBAL_METRICS.get_or_init(TelemetryMetricsInner::new)
    }

    pub fn observe_poll_latency(&self, duration_secs: f64) {
        self.inner().poll_latency_seconds.observe(duration_secs);
    }

    pub fn inc_readings(&self, count: u64) {
        self.inner().readings_generated.inc_by(count);
    }

    pub fn inc_anomalies(&self) {
        self.inner().anomalies_detected.inc();
    }

    pub fn inc_threshold_violations(&self) {
        self.inner().threshold_violations.inc();
    }

    pub fn inc_health_changes(&self) {
        self.inner().health_changes.inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_ledger_errors(&self) {
        self.inner().ledger_errors.inc();
    }

    /// Update registered and online device gauges
    pub fn set_devices(&self, registered: i64, online: i64) {
        self.inner().devices_registered.set(registered);
        self.inner().devices_online.set(online);
    }

    pub fn set_health_monitors(&self, active: i64) {
        self.inner().health_monitors_active.set(active);
    }

    /// Total readings generated so far
    pub fn readings_generated(&self) -> u64 {
        self.inner().readings_generated.get()
    }
}

/// Structured logger for simulator events
///
/// Provides consistent JSON-formatted logging for registrations,
/// anomalies, threshold breaches and health transitions.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_registration(&self, device_id: &str, device_type: &str, sensors: usize) {
        info!(
            event = "device_registered",
            instance = %self.instance,
            device_id = %device_id,
            device_type = %device_type,
            sensors = sensors,
            "Device registered"
        );
    }

    pub fn log_deregistration(&self, device_id: &str) {
        info!(
            event = "device_deregistered",
            instance = %self.instance,
            device_id = %device_id,
            "Device deregistered"
        );
    }

    /// Log an anomaly; high and critical ones go out at warn level
    pub fn log_anomaly(&self, event: &AnomalyEvent) {
        if event.severity >= Severity::High {
            warn!(
                event = "anomaly_detected",
                instance = %self.instance,
                device_id = %event.device_id,
                sensor_id = %event.sensor_id,
                sensor_type = %event.sensor_type,
                severity = %event.severity,
                value = event.anomaly.value,
                mean = event.anomaly.mean,
                z_score = event.anomaly.z_score,
                "Severe reading anomaly detected"
            );
        } else {
            info!(
                event = "anomaly_detected",
                instance = %self.instance,
                device_id = %event.device_id,
                sensor_id = %event.sensor_id,
                sensor_type = %event.sensor_type,
                severity = %event.severity,
                value = event.anomaly.value,
                mean = event.anomaly.mean,
                z_score = event.anomaly.z_score,
                "Reading anomaly detected"
            );
        }
    }

    pub fn log_threshold_violation(&self, event: &ThresholdEvent) {
        warn!(
            event = "threshold_violation",
            instance = %self.instance,
            device_id = %event.device_id,
            sensor_id = %event.sensor_id,
            sensor_type = %event.sensor_type,
            severity = %event.severity,
            value = event.value,
            min = event.min,
            max = event.max,
            breach = ?event.breach,
            "Reading outside safe band"
        );
    }

    pub fn log_health_change(&self, change: &HealthChange) {
        info!(
            event = "health_changed",
            instance = %self.instance,
            device_id = %change.device_id,
            previous = %change.previous,
            current = %change.current,
            "Device health changed"
        );
    }

    pub fn log_startup(&self, version: &str, devices: usize) {
        info!(
            event = "simulator_started",
            instance = %self.instance,
            version = %version,
            devices = devices,
            "Telemetry simulator started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "simulator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Telemetry simulator shutting down"
        );
    }
}
