//! Telemetry poll loop
//!
//! Implements the main loop that periodically synthesizes readings for all
//! online devices and publishes the resulting events.

use super::{poll_device, RandomReadingSource, ReadingSource};
use crate::anomaly::ZScoreDetector;
use crate::events::{EventBus, TelemetryEvent};
use crate::models::DeviceStatus;
use crate::observability::TelemetryMetrics;
use crate::registry::DeviceRegistry;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between poll cycles (default: 5 seconds)
    pub interval: Duration,
    /// Emit a debug summary every N cycles
    pub log_every: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            log_every: 12,
        }
    }
}

/// Outcome of one poll cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollSummary {
    pub devices_polled: usize,
    pub readings: usize,
    pub anomalies: usize,
    pub threshold_violations: usize,
}

/// Loop that polls every online device on a fixed cadence
pub struct PollLoop {
    registry: Arc<DeviceRegistry>,
    source: Arc<dyn ReadingSource>,
    detector: ZScoreDetector,
    bus: EventBus,
    metrics: TelemetryMetrics,
    config: PollConfig,
}

impl PollLoop {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        source: Arc<dyn ReadingSource>,
        bus: EventBus,
        config: PollConfig,
    ) -> Self {
        Self {
            registry,
            source,
            detector: ZScoreDetector::default(),
            bus,
            metrics: TelemetryMetrics::new(),
            config,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting telemetry poll loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let summary = self.poll_once();
                    let elapsed = start.elapsed();
                    cycles += 1;

                    self.metrics.observe_poll_latency(elapsed.as_secs_f64());

                    if self.config.log_every > 0 && cycles % self.config.log_every == 0 {
                        debug!(
                            devices = summary.devices_polled,
                            readings = summary.readings,
                            anomalies = summary.anomalies,
                            threshold_violations = summary.threshold_violations,
                            elapsed_ms = elapsed.as_millis(),
                            "Poll cycle complete"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down telemetry poll loop");
                    break;
                }
            }
        }
    }

    /// Run one poll cycle over the whole registry
    pub fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let now = Utc::now();

        for device_id in self.registry.ids() {
            // The entry guard is held only inside the closure; events are
            // published after it is released.
            let polled = self.registry.with_device_mut(&device_id, |device, history| {
                if device.status != DeviceStatus::Online {
                    return None;
                }
                let events =
                    poll_device(device, history, self.source.as_ref(), &self.detector, now);
                Some((device.sensors.len(), events))
            });

            // Device removed between listing and polling
            let Ok(Some((readings, events))) = polled else {
                continue;
            };

            summary.devices_polled += 1;
            summary.readings += readings;
            self.metrics.inc_readings(readings as u64);

            for event in events {
                match &event {
                    TelemetryEvent::Anomaly(_) => summary.anomalies += 1,
                    TelemetryEvent::Threshold(_) => summary.threshold_violations += 1,
                    TelemetryEvent::HealthChanged(_) => {}
                }
                self.bus.publish(event);
            }
        }

        self.metrics.set_devices(self.registry.len() as i64, self.registry.online_count() as i64);
        summary
    }
}

/// Builder for creating the poll loop
pub struct PollLoopBuilder {
    registry: Option<Arc<DeviceRegistry>>,
    source: Option<Arc<dyn ReadingSource>>,
    bus: Option<EventBus>,
    detector: ZScoreDetector,
    config: PollConfig,
}

impl PollLoopBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            source: None,
            bus: None,
            detector: ZScoreDetector::default(),
            config: PollConfig::default(),
        }
    }

    pub fn registry(mut self, registry: Arc<DeviceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the reading source (defaults to [`RandomReadingSource`])
    pub fn source(mut self, source: Arc<dyn ReadingSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn detector(mut self, detector: ZScoreDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn build(self) -> Result<PollLoop> {
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("Registry is required"))?;
        let bus = self
            .bus
            .ok_or_else(|| anyhow::anyhow!("Event bus is required"))?;
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(RandomReadingSource::default()) as Arc<dyn ReadingSource>);

        let mut poll_loop = PollLoop::new(registry, source, bus, self.config);
        poll_loop.detector = self.detector;
        Ok(poll_loop)
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceSpec, DeviceType, Location, Sensor, SensorSpec, SensorType};
    use crate::registry::DEFAULT_HISTORY_CAPACITY;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Emits a value far above any declared range on every call
    struct Wild;

    impl ReadingSource for Wild {
        fn sample(&self, _sensor: &Sensor) -> f64 {
            1.0e6
        }
    }

    /// Slowly ramps, so every reading differs from the last
    struct Ramp(AtomicU64);

    impl ReadingSource for Ramp {
        fn sample(&self, _sensor: &Sensor) -> f64 {
            self.0.fetch_add(1, Ordering::SeqCst) as f64 * 0.001 + 20.0
        }
    }

    fn bay(name: &str) -> DeviceSpec {
        DeviceSpec::new(name, DeviceType::ParkingSensor, Location::new(40.0, -3.7))
            .sensor(SensorSpec::new(SensorType::Occupancy, "bool", (0.0, 1.0)))
            .sensor(SensorSpec::new(SensorType::Temperature, "°C", (-40.0, 85.0)))
    }

    #[test]
    fn test_poll_config_default() {
        let config = PollConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_requires_registry_and_bus() {
        assert!(PollLoopBuilder::new().bus(EventBus::default()).build().is_err());
        assert!(PollLoopBuilder::new()
            .registry(Arc::new(DeviceRegistry::new()))
            .build()
            .is_err());
        assert!(PollLoopBuilder::new()
            .registry(Arc::new(DeviceRegistry::new()))
            .bus(EventBus::default())
            .build()
            .is_ok());
    }

    #[test]
    fn test_poll_empty_registry() {
        let poll_loop = PollLoopBuilder::new()
            .registry(Arc::new(DeviceRegistry::new()))
            .bus(EventBus::default())
            .build()
            .unwrap();

        assert_eq!(poll_loop.poll_once(), PollSummary::default());
    }

    #[test]
    fn test_readings_stay_in_range() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = registry.register(bay("bay-1"));

        let poll_loop = PollLoopBuilder::new()
            .registry(registry.clone())
            .bus(EventBus::default())
            .source(Arc::new(Wild))
            .build()
            .unwrap();

        for _ in 0..20 {
            poll_loop.poll_once();
        }

        let device = registry.get(&device.id).unwrap();
        let readings = registry.readings(&device.id, None).unwrap();
        assert_eq!(readings.len(), 40);
        for reading in readings {
            let sensor = device
                .sensors
                .iter()
                .find(|s| s.id == reading.metadata.sensor_id)
                .unwrap();
            assert!(reading.value >= sensor.range.0 && reading.value <= sensor.range.1);
        }
    }

    #[test]
    fn test_default_source_stays_in_range() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = registry.register(bay("bay-1"));

        let poll_loop = PollLoopBuilder::new()
            .registry(registry.clone())
            .bus(EventBus::default())
            .build()
            .unwrap();

        for _ in 0..50 {
            poll_loop.poll_once();
        }

        let device = registry.get(&device.id).unwrap();
        for sensor in &device.sensors {
            for value in registry
                .readings(&device.id, None)
                .unwrap()
                .iter()
                .filter(|r| r.metadata.sensor_id == sensor.id)
                .map(|r| r.value)
            {
                assert!(value >= sensor.range.0 && value <= sensor.range.1);
            }
        }
    }

    #[test]
    fn test_history_bounded_after_many_cycles() {
        let registry = Arc::new(DeviceRegistry::new());
        let device = registry.register(bay("bay-1"));

        let poll_loop = PollLoopBuilder::new()
            .registry(registry.clone())
            .bus(EventBus::default())
            .source(Arc::new(Ramp(AtomicU64::new(0))))
            .build()
            .unwrap();

        // Two sensors per cycle, so 700 cycles produce 1400 readings
        for _ in 0..700 {
            poll_loop.poll_once();
        }

        let readings = registry.readings(&device.id, None).unwrap();
        assert_eq!(readings.len(), DEFAULT_HISTORY_CAPACITY);

        // Oldest were evicted: the ramp is monotonic, so the surviving
        // readings are the last 1000 samples in order
        let values: Vec<f64> = readings.iter().map(|r| r.metadata.raw_value).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!((values[0] - (20.0 + 400.0 * 0.001)).abs() < 1e-9);
    }

    #[test]
    fn test_only_online_devices_polled() {
        let registry = Arc::new(DeviceRegistry::new());
        let online = registry.register(bay("bay-1"));
        let parked = registry.register(bay("bay-2"));
        registry
            .set_status(&parked.id, DeviceStatus::Maintenance)
            .unwrap();

        let poll_loop = PollLoopBuilder::new()
            .registry(registry.clone())
            .bus(EventBus::default())
            .build()
            .unwrap();

        let summary = poll_loop.poll_once();
        assert_eq!(summary.devices_polled, 1);
        assert_eq!(summary.readings, 2);
        assert_eq!(registry.readings(&online.id, None).unwrap().len(), 2);
        assert!(registry.readings(&parked.id, None).unwrap().is_empty());

        let untouched = registry.get(&parked.id).unwrap();
        assert!(untouched.sensors.iter().all(|s| s.last_reading.value == 0.0));
    }

    #[tokio::test]
    async fn test_events_published_to_bus() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.register(bay("bay-1"));
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let poll_loop = PollLoopBuilder::new()
            .registry(registry)
            .bus(bus)
            .source(Arc::new(Wild))
            .build()
            .unwrap();

        let summary = poll_loop.poll_once();
        // Temperature clamped to 85 lands above its safe band; occupancy has no band
        assert_eq!(summary.threshold_violations, 1);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, TelemetryEvent::Threshold(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let poll_loop = PollLoopBuilder::new()
            .registry(Arc::new(DeviceRegistry::new()))
            .bus(EventBus::default())
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let (tx, rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(poll_loop.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
