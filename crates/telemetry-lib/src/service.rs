//! Device service
//!
//! The entry point operators and the HTTP API use. Wraps the registry so
//! that registration and removal also start and stop the device's health
//! checks, and every change is logged and reflected in metrics.

use crate::error::Result;
use crate::health::HealthMonitor;
use crate::models::{Device, DeviceSpec, DeviceStatus, FirmwareInfo, Reading, SecurityInfo};
use crate::observability::{StructuredLogger, TelemetryMetrics};
use crate::registry::{DeviceFilter, DeviceRegistry};
use std::sync::Arc;
use tracing::info;

pub struct DeviceService {
    registry: Arc<DeviceRegistry>,
    monitor: HealthMonitor,
    logger: StructuredLogger,
    metrics: TelemetryMetrics,
}

impl DeviceService {
    pub fn new(registry: Arc<DeviceRegistry>, monitor: HealthMonitor, logger: StructuredLogger) -> Self {
        Self {
            registry,
            monitor,
            logger,
            metrics: TelemetryMetrics::new(),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Register a device and start its periodic health check.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, spec: DeviceSpec) -> Device {
        let device = self.registry.register(spec);
        self.monitor.start(&device.id);

        self.logger.log_registration(
            &device.id,
            &device.device_type.to_string(),
            device.sensors.len(),
        );
        self.refresh_gauges();
        device
    }

    /// Stop a device's health check and remove it with its history
    pub fn deregister(&self, device_id: &str) -> Result<Device> {
        self.monitor.stop(device_id);
        let device = self.registry.deregister(device_id)?;

        self.logger.log_deregistration(device_id);
        self.refresh_gauges();
        Ok(device)
    }

    pub fn get(&self, device_id: &str) -> Result<Device> {
        self.registry.get(device_id)
    }

    pub fn list(&self, filter: &DeviceFilter) -> Vec<Device> {
        self.registry.list(filter)
    }

    pub fn readings(&self, device_id: &str, limit: Option<usize>) -> Result<Vec<Reading>> {
        self.registry.readings(device_id, limit)
    }

    /// Set a device's status by hand, e.g. to park it in maintenance
    pub fn set_status(&self, device_id: &str, status: DeviceStatus) -> Result<DeviceStatus> {
        let previous = self.registry.set_status(device_id, status)?;
        if previous != status {
            info!(
                device_id = %device_id,
                previous = %previous,
                current = %status,
                "Device status set"
            );
        }
        self.refresh_gauges();
        Ok(previous)
    }

    pub fn update_firmware(&self, device_id: &str, version: &str) -> Result<FirmwareInfo> {
        let firmware = self.registry.update_firmware(device_id, version)?;
        info!(device_id = %device_id, version = %firmware.version, "Firmware updated");
        Ok(firmware)
    }

    pub fn security_scan(&self, device_id: &str) -> Result<SecurityInfo> {
        let security = self.registry.security_scan(device_id)?;
        info!(
            device_id = %device_id,
            vulnerabilities = security.vulnerabilities,
            "Security scan complete"
        );
        Ok(security)
    }

    /// Stop every health check; the registry is left as is
    pub fn shutdown(&self) {
        self.monitor.stop_all();
    }

    fn refresh_gauges(&self) {
        self.metrics.set_devices(
            self.registry.len() as i64,
            self.registry.online_count() as i64,
        );
    }
}
