//! In-memory device registry
//!
//! Owns every registered device together with its bounded reading history.
//! Each device sits behind its own map entry, so a poll that updates the
//! history and the sensors' last-reading slots holds a single entry guard
//! and never interleaves with another writer for the same device.

mod filter;
mod history;

pub use filter::{haversine_km, DeviceFilter, GeoRadius, EARTH_RADIUS_KM};
pub use history::{ReadingHistory, DEFAULT_HISTORY_CAPACITY};

use crate::error::{RegistryError, Result};
use crate::models::{Device, DeviceSpec, DeviceStatus, FirmwareInfo, Reading, SecurityInfo};
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// A device and the readings it has produced
#[derive(Debug, Clone)]
struct DeviceEntry {
    device: Device,
    history: ReadingHistory,
}

/// Registry of simulated devices
pub struct DeviceRegistry {
    /// Map of device_id -> device entry
    devices: DashMap<String, DeviceEntry>,
    /// Per-device history bound
    history_capacity: usize,
}

impl DeviceRegistry {
    /// Create an empty registry with the default history bound
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            devices: DashMap::new(),
            history_capacity,
        }
    }

    /// Register a device. There is no validation path; every spec is accepted.
    pub fn register(&self, spec: DeviceSpec) -> Device {
        let device = spec.into_device(Utc::now());
        debug!(
            device_id = %device.id,
            device_type = %device.device_type,
            sensors = device.sensors.len(),
            "Registering device"
        );
        self.devices.insert(
            device.id.clone(),
            DeviceEntry {
                device: device.clone(),
                history: ReadingHistory::new(self.history_capacity),
            },
        );
        device
    }

    /// Remove a device and its history
    pub fn deregister(&self, device_id: &str) -> Result<Device> {
        debug!(device_id = %device_id, "Deregistering device");
        self.devices
            .remove(device_id)
            .map(|(_, entry)| entry.device)
            .ok_or_else(|| RegistryError::DeviceNotFound(device_id.to_string()))
    }

    /// Get a snapshot of a device
    pub fn get(&self, device_id: &str) -> Result<Device> {
        self.devices
            .get(device_id)
            .map(|entry| entry.device.clone())
            .ok_or_else(|| RegistryError::DeviceNotFound(device_id.to_string()))
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Devices matching every set predicate, in registration order
    pub fn list(&self, filter: &DeviceFilter) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|entry| filter.matches(&entry.device))
            .map(|entry| entry.device.clone())
            .collect();
        devices.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        devices
    }

    /// Ids of every registered device
    pub fn ids(&self) -> Vec<String> {
        self.devices.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Number of devices currently online
    pub fn online_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|entry| entry.device.status == DeviceStatus::Online)
            .count()
    }

    /// Recent readings for a device, oldest first
    pub fn readings(&self, device_id: &str, limit: Option<usize>) -> Result<Vec<Reading>> {
        self.devices
            .get(device_id)
            .map(|entry| entry.history.latest(limit))
            .ok_or_else(|| RegistryError::DeviceNotFound(device_id.to_string()))
    }

    /// Set a device's status, returning the previous one
    pub fn set_status(&self, device_id: &str, status: DeviceStatus) -> Result<DeviceStatus> {
        self.with_device_mut(device_id, |device, _| {
            let previous = device.status;
            device.status = status;
            previous
        })
    }

    /// Simulated firmware update; always succeeds for a known device
    pub fn update_firmware(&self, device_id: &str, version: &str) -> Result<FirmwareInfo> {
        self.with_device_mut(device_id, |device, _| {
            device.firmware = FirmwareInfo {
                version: version.to_string(),
                updated_at: Utc::now(),
            };
            device.firmware.clone()
        })
    }

    /// Simulated security scan; always succeeds for a known device
    pub fn security_scan(&self, device_id: &str) -> Result<SecurityInfo> {
        self.with_device_mut(device_id, |device, _| {
            device.security.last_scan_at = Some(Utc::now());
            device.security.vulnerabilities = 0;
            device.security.clone()
        })
    }

    /// Run `f` with exclusive access to one device and its history
    pub(crate) fn with_device_mut<F, R>(&self, device_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut Device, &mut ReadingHistory) -> R,
    {
        let mut entry = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::DeviceNotFound(device_id.to_string()))?;
        let DeviceEntry { device, history } = &mut *entry;
        Ok(f(device, history))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
