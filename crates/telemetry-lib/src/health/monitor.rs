//! Per-device health checks
//!
//! Every registered device gets its own task that probes it on a fixed
//! period and moves it between `Online` and `Error`. Task handles are kept
//! by device id so deregistration can stop them.

use crate::error::{RegistryError, Result};
use crate::events::{EventBus, HealthChange, TelemetryEvent};
use crate::models::{Device, DeviceStatus};
use crate::observability::TelemetryMetrics;
use crate::registry::DeviceRegistry;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default period between checks of one device
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default probability that a probe reaches its device
pub const DEFAULT_PROBE_SUCCESS_RATE: f64 = 0.95;

/// Decides whether a device answered its health check
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, device: &Device) -> bool;
}

/// Probe that succeeds with a fixed probability
#[derive(Debug, Clone)]
pub struct RandomHealthProbe {
    success_rate: f64,
}

impl RandomHealthProbe {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for RandomHealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_SUCCESS_RATE)
    }
}

#[async_trait]
impl HealthProbe for RandomHealthProbe {
    async fn probe(&self, _device: &Device) -> bool {
        rand::thread_rng().gen_bool(self.success_rate)
    }
}

/// Probe with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct FixedHealthProbe(pub bool);

#[async_trait]
impl HealthProbe for FixedHealthProbe {
    async fn probe(&self, _device: &Device) -> bool {
        self.0
    }
}

/// Status a device should move to after a probe, or `None` to stay put.
///
/// Maintenance is operator-owned and never changed by a probe.
pub fn next_status(current: DeviceStatus, reachable: bool) -> Option<DeviceStatus> {
    match (current, reachable) {
        (DeviceStatus::Online, false) => Some(DeviceStatus::Error),
        (DeviceStatus::Error | DeviceStatus::Offline, true) => Some(DeviceStatus::Online),
        _ => None,
    }
}

/// Probe one device and apply the resulting transition
async fn check_device(
    registry: &DeviceRegistry,
    probe: &dyn HealthProbe,
    bus: &EventBus,
    device_id: &str,
) -> Result<Option<HealthChange>> {
    let snapshot = registry.get(device_id)?;
    let reachable = probe.probe(&snapshot).await;

    // Re-read under the entry guard; status may have moved while probing
    let change = registry.with_device_mut(device_id, |device, _| {
        let current = next_status(device.status, reachable)?;
        let previous = device.status;
        device.status = current;
        if reachable {
            device.last_seen = Utc::now();
        }
        Some(HealthChange {
            device_id: device.id.clone(),
            previous,
            current,
            timestamp: Utc::now(),
        })
    })?;

    if let Some(change) = &change {
        debug!(
            device_id = %change.device_id,
            previous = %change.previous,
            current = %change.current,
            "Health check changed device status"
        );
        bus.publish(TelemetryEvent::HealthChanged(change.clone()));
    }

    Ok(change)
}

/// Owns one periodic health task per device
pub struct HealthMonitor {
    registry: Arc<DeviceRegistry>,
    probe: Arc<dyn HealthProbe>,
    bus: EventBus,
    interval: Duration,
    handles: DashMap<String, JoinHandle<()>>,
    metrics: TelemetryMetrics,
}

impl HealthMonitor {
    pub fn new(registry: Arc<DeviceRegistry>, bus: EventBus) -> Self {
        Self {
            registry,
            probe: Arc::new(RandomHealthProbe::default()),
            bus,
            interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            handles: DashMap::new(),
            metrics: TelemetryMetrics::new(),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the periodic check for a device, replacing any existing task.
    /// The first check runs one full period after the call.
    pub fn start(&self, device_id: &str) {
        let registry = self.registry.clone();
        let probe = self.probe.clone();
        let bus = self.bus.clone();
        let period = self.interval;
        let id = device_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match check_device(&registry, probe.as_ref(), &bus, &id).await {
                    Ok(_) => {}
                    Err(RegistryError::DeviceNotFound(_)) => {
                        debug!(device_id = %id, "Device gone, ending health checks");
                        break;
                    }
                    Err(e) => {
                        warn!(device_id = %id, error = %e, "Health check failed");
                    }
                }
            }
        });

        if let Some(previous) = self.handles.insert(device_id.to_string(), handle) {
            previous.abort();
        }
        self.metrics.set_health_monitors(self.active() as i64);
    }

    /// Stop the check for one device. Returns false if none was running.
    pub fn stop(&self, device_id: &str) -> bool {
        let stopped = match self.handles.remove(device_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        };
        self.metrics.set_health_monitors(self.active() as i64);
        stopped
    }

    /// Stop every running check
    pub fn stop_all(&self) {
        let count = self.handles.len();
        self.handles.retain(|_, handle| {
            handle.abort();
            false
        });
        if count > 0 {
            info!(stopped = count, "Stopped all device health checks");
        }
        self.metrics.set_health_monitors(0);
    }

    /// Number of health tasks still running
    pub fn active(&self) -> usize {
        self.handles
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    pub fn is_monitoring(&self, device_id: &str) -> bool {
        self.handles
            .get(device_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Run one check for a device right away
    pub async fn check(&self, device_id: &str) -> Result<Option<HealthChange>> {
        check_device(&self.registry, self.probe.as_ref(), &self.bus, device_id).await
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceSpec, DeviceType, Location, SensorSpec, SensorType};

    fn meter(registry: &DeviceRegistry) -> Device {
        registry.register(
            DeviceSpec::new("meter-1", DeviceType::SmartMeter, Location::new(41.39, 2.17))
                .sensor(SensorSpec::new(SensorType::Battery, "%", (0.0, 100.0))),
        )
    }

    #[test]
    fn test_next_status_transitions() {
        assert_eq!(
            next_status(DeviceStatus::Online, false),
            Some(DeviceStatus::Error)
        );
        assert_eq!(next_status(DeviceStatus::Online, true), None);
        assert_eq!(
            next_status(DeviceStatus::Error, true),
            Some(DeviceStatus::Online)
        );
        assert_eq!(
            next_status(DeviceStatus::Offline, true),
            Some(DeviceStatus::Online)
        );
        assert_eq!(next_status(DeviceStatus::Error, false), None);
        assert_eq!(next_status(DeviceStatus::Maintenance, true), None);
        assert_eq!(next_status(DeviceStatus::Maintenance, false), None);
    }

    #[tokio::test]
    async fn test_random_probe_extremes() {
        let registry = DeviceRegistry::new();
        let device = meter(&registry);

        assert!(RandomHealthProbe::new(1.0).probe(&device).await);
        assert!(!RandomHealthProbe::new(0.0).probe(&device).await);
    }

    #[tokio::test]
    async fn test_check_failure_sets_error_and_publishes() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = meter(&registry);
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let monitor = HealthMonitor::new(registry.clone(), bus)
            .with_probe(Arc::new(FixedHealthProbe(false)));

        let change = monitor.check(&device.id).await.unwrap().unwrap();
        assert_eq!(change.previous, DeviceStatus::Online);
        assert_eq!(change.current, DeviceStatus::Error);
        assert_eq!(registry.get(&device.id).unwrap().status, DeviceStatus::Error);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, TelemetryEvent::HealthChanged(_)));

        // A second failure is not a transition
        assert!(monitor.check(&device.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_leaves_maintenance_alone() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = meter(&registry);
        registry
            .set_status(&device.id, DeviceStatus::Maintenance)
            .unwrap();

        let monitor = HealthMonitor::new(registry.clone(), EventBus::default())
            .with_probe(Arc::new(FixedHealthProbe(false)));

        assert!(monitor.check(&device.id).await.unwrap().is_none());
        assert_eq!(
            registry.get(&device.id).unwrap().status,
            DeviceStatus::Maintenance
        );
    }

    #[tokio::test]
    async fn test_check_unknown_device() {
        let monitor = HealthMonitor::new(Arc::new(DeviceRegistry::new()), EventBus::default());
        assert!(matches!(
            monitor.check("ghost").await,
            Err(RegistryError::DeviceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_fires_after_interval() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = meter(&registry);
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let monitor = HealthMonitor::new(registry.clone(), bus)
            .with_probe(Arc::new(FixedHealthProbe(false)));
        monitor.start(&device.id);
        assert!(monitor.is_monitoring(&device.id));
        assert_eq!(monitor.active(), 1);

        let started = Instant::now();
        let event = rx.recv().await.unwrap();
        assert!(started.elapsed() >= DEFAULT_HEALTH_CHECK_INTERVAL);
        assert_eq!(event.device_id(), device.id);
        assert_eq!(registry.get(&device.id).unwrap().status, DeviceStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_checks() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = meter(&registry);

        let monitor = HealthMonitor::new(registry.clone(), EventBus::default())
            .with_probe(Arc::new(FixedHealthProbe(false)))
            .with_interval(Duration::from_secs(1));
        monitor.start(&device.id);

        assert!(monitor.stop(&device.id));
        assert!(!monitor.is_monitoring(&device.id));
        assert_eq!(monitor.active(), 0);
        assert!(!monitor.stop(&device.id));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.get(&device.id).unwrap().status, DeviceStatus::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_ends_when_device_removed() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = meter(&registry);

        let monitor = HealthMonitor::new(registry.clone(), EventBus::default())
            .with_interval(Duration::from_secs(1));
        monitor.start(&device.id);
        registry.deregister(&device.id).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!monitor.is_monitoring(&device.id));
    }

    #[tokio::test]
    async fn test_stop_all() {
        let registry = Arc::new(DeviceRegistry::new());
        let a = meter(&registry);
        let b = meter(&registry);

        let monitor = HealthMonitor::new(registry, EventBus::default());
        monitor.start(&a.id);
        monitor.start(&b.id);
        assert_eq!(monitor.active(), 2);

        monitor.stop_all();
        assert_eq!(monitor.active(), 0);
    }
}
