//! Alert dispatch for telemetry events
//!
//! Handles:
//! - Structured logging and metrics for every event kind
//! - Recording alerts in the ledger
//! - Deduplication of repeat alerts within a configurable window

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::{EventKind, TelemetryEvent};
use crate::health::{components, HealthRegistry};
use crate::ledger::{Ledger, LedgerReceipt};
use crate::observability::{StructuredLogger, TelemetryMetrics};

/// Default deduplication window (60 seconds)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(60);

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    kind: EventKind,
    device_id: String,
    sensor_id: Option<String>,
}

impl DedupKey {
    fn of(event: &TelemetryEvent) -> Self {
        Self {
            kind: event.kind(),
            device_id: event.device_id().to_string(),
            sensor_id: event.sensor_id().map(str::to_string),
        }
    }
}

/// Consumes telemetry events and turns them into alerts
pub struct AlertDispatcher {
    /// Deduplication window
    dedup_window: Duration,
    /// Recent alerts for deduplication (key -> last emission time)
    recent_alerts: RwLock<HashMap<DedupKey, Instant>>,
    ledger: Arc<dyn Ledger>,
    logger: StructuredLogger,
    metrics: TelemetryMetrics,
    health: Option<HealthRegistry>,
}

impl AlertDispatcher {
    /// Create a dispatcher with the default 60-second deduplication window
    pub fn new(ledger: Arc<dyn Ledger>, logger: StructuredLogger) -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            recent_alerts: RwLock::new(HashMap::new()),
            ledger,
            logger,
            metrics: TelemetryMetrics::new(),
            health: None,
        }
    }

    /// Report lag on the event bus as a degraded dispatcher component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Set custom deduplication window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Check if an event repeats one alerted inside the window.
    /// Health changes are never suppressed.
    pub fn should_suppress(&self, event: &TelemetryEvent) -> bool {
        if matches!(event, TelemetryEvent::HealthChanged(_)) {
            return false;
        }

        let alerts = self
            .recent_alerts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        alerts
            .get(&DedupKey::of(event))
            .map(|last| last.elapsed() < self.dedup_window)
            .unwrap_or(false)
    }

    /// Record that an alert was emitted
    fn record_alert(&self, event: &TelemetryEvent) {
        let mut alerts = self
            .recent_alerts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        alerts.insert(DedupKey::of(event), Instant::now());

        // Clean up old entries
        let window = self.dedup_window;
        alerts.retain(|_, time| time.elapsed() < window);
    }

    /// Log, count and record one event.
    ///
    /// Returns the ledger receipt, or `None` if the event was suppressed or
    /// the ledger refused it.
    pub async fn handle(&self, event: &TelemetryEvent) -> Option<LedgerReceipt> {
        if self.should_suppress(event) {
            self.metrics.inc_alerts_suppressed();
            debug!(
                kind = %event.kind(),
                device_id = %event.device_id(),
                "Suppressing duplicate alert"
            );
            return None;
        }

        match event {
            TelemetryEvent::Anomaly(anomaly) => {
                self.record_alert(event);
                self.metrics.inc_anomalies();
                self.logger.log_anomaly(anomaly);
            }
            TelemetryEvent::Threshold(threshold) => {
                self.record_alert(event);
                self.metrics.inc_threshold_violations();
                self.logger.log_threshold_violation(threshold);
            }
            TelemetryEvent::HealthChanged(change) => {
                self.metrics.inc_health_changes();
                self.logger.log_health_change(change);
            }
        }

        match self.ledger.record(event).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                self.metrics.inc_ledger_errors();
                warn!(
                    kind = %event.kind(),
                    device_id = %event.device_id(),
                    error = %e,
                    "Failed to record event in ledger"
                );
                None
            }
        }
    }

    /// Drain the event bus until shutdown or until every sender is gone
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<TelemetryEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            dedup_window_secs = self.dedup_window.as_secs(),
            "Starting alert dispatcher"
        );

        let mut prune = tokio::time::interval(self.dedup_window.max(Duration::from_secs(1)));
        let mut lagging = false;

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.handle(&event).await;
                        if lagging {
                            lagging = false;
                            if let Some(health) = &self.health {
                                health.set_healthy(components::DISPATCHER).await;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Alert dispatcher lagging, events dropped");
                        lagging = true;
                        if let Some(health) = &self.health {
                            health
                                .set_degraded(
                                    components::DISPATCHER,
                                    format!("Dropped {} events", skipped),
                                )
                                .await;
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("Event bus closed, stopping alert dispatcher");
                        break;
                    }
                },
                _ = prune.tick() => {
                    self.cleanup_dedup_cache();
                }
                _ = shutdown.recv() => {
                    info!("Shutting down alert dispatcher");
                    break;
                }
            }
        }
    }

    /// Drop dedup entries older than the window
    pub fn cleanup_dedup_cache(&self) {
        let mut alerts = self
            .recent_alerts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = self.dedup_window;
        alerts.retain(|_, time| time.elapsed() < window);
    }
}
