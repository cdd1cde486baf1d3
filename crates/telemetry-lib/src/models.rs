//! Core data models for the device registry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days between registration and the first calibration due date
pub const CALIBRATION_WINDOW_DAYS: i64 = 30;

/// Kind of physical endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    ParkingSensor,
    Camera,
    SmartMeter,
    EnvironmentalStation,
    Gateway,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::ParkingSensor => write!(f, "parking_sensor"),
            DeviceType::Camera => write!(f, "camera"),
            DeviceType::SmartMeter => write!(f, "smart_meter"),
            DeviceType::EnvironmentalStation => write!(f, "environmental_station"),
            DeviceType::Gateway => write!(f, "gateway"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parking_sensor" => Ok(DeviceType::ParkingSensor),
            "camera" => Ok(DeviceType::Camera),
            "smart_meter" => Ok(DeviceType::SmartMeter),
            "environmental_station" => Ok(DeviceType::EnvironmentalStation),
            "gateway" => Ok(DeviceType::Gateway),
            other => Err(format!("unknown device type: {}", other)),
        }
    }
}

/// Operational status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Maintenance => write!(f, "maintenance"),
            DeviceStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            "error" => Ok(DeviceStatus::Error),
            other => Err(format!("unknown device status: {}", other)),
        }
    }
}

/// Measurement kind of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Occupancy,
    Temperature,
    Humidity,
    AirQuality,
    Noise,
    Light,
    Vibration,
    Pressure,
    Battery,
}

impl SensorType {
    /// Nominal value the simulator centres its readings on
    pub fn base_value(&self) -> f64 {
        match self {
            SensorType::Occupancy => 0.5,
            SensorType::Temperature => 21.0,
            SensorType::Humidity => 55.0,
            SensorType::AirQuality => 42.0,
            SensorType::Noise => 55.0,
            SensorType::Light => 400.0,
            SensorType::Vibration => 1.5,
            SensorType::Pressure => 1013.25,
            SensorType::Battery => 80.0,
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SensorType::Occupancy => "occupancy",
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::AirQuality => "air_quality",
            SensorType::Noise => "noise",
            SensorType::Light => "light",
            SensorType::Vibration => "vibration",
            SensorType::Pressure => "pressure",
            SensorType::Battery => "battery",
        };
        write!(f, "{}", name)
    }
}

/// Quality tag attached to every reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Network transport used by a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    WiFi,
    Cellular,
    #[default]
    LoRaWan,
    Zigbee,
    Ethernet,
}

/// Physical placement of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
            zone: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connectivity {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength_dbm: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub version: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    pub vulnerabilities: u32,
}

/// Extra context carried by a reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingMetadata {
    pub sensor_id: String,
    pub unit: String,
    /// Value before clamping into the sensor's range
    pub raw_value: f64,
    pub clamped: bool,
}

/// One timestamped, quality-tagged sensor value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub quality: ReadingQuality,
    pub metadata: ReadingMetadata,
}

impl Reading {
    /// Zero-valued reading written into a sensor's slot at registration
    pub fn placeholder(sensor_id: &str, unit: &str, at: DateTime<Utc>) -> Self {
        Self {
            value: 0.0,
            timestamp: at,
            quality: ReadingQuality::Good,
            metadata: ReadingMetadata {
                sensor_id: sensor_id.to_string(),
                unit: unit.to_string(),
                raw_value: 0.0,
                clamped: false,
            },
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.metadata.sensor_id
    }
}

/// A typed measurement source owned by exactly one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub sensor_type: SensorType,
    pub unit: String,
    /// Declared value range as `(min, max)`
    pub range: (f64, f64),
    /// Static accuracy figure in `0.0..=1.0`
    pub accuracy: f64,
    pub calibrated_at: DateTime<Utc>,
    pub calibration_due: DateTime<Utc>,
    pub last_reading: Reading,
}

impl Sensor {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.range.0 && value <= self.range.1
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.range.0).min(self.range.1)
    }
}

/// A simulated physical endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub location: Location,
    pub connectivity: Connectivity,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub sensors: Vec<Sensor>,
    pub firmware: FirmwareInfo,
    pub security: SecurityInfo,
}

/// Registration input for a sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSpec {
    pub sensor_type: SensorType,
    pub unit: String,
    pub range: (f64, f64),
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
}

fn default_accuracy() -> f64 {
    0.95
}

impl SensorSpec {
    pub fn new(sensor_type: SensorType, unit: impl Into<String>, range: (f64, f64)) -> Self {
        Self {
            sensor_type,
            unit: unit.into(),
            range,
            accuracy: default_accuracy(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// Registration input for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub device_type: DeviceType,
    pub location: Location,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "default_encrypted")]
    pub encrypted: bool,
}

fn default_firmware_version() -> String {
    "1.0.0".to_string()
}

fn default_encrypted() -> bool {
    true
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>, device_type: DeviceType, location: Location) -> Self {
        Self {
            name: name.into(),
            device_type,
            location,
            connectivity: Connectivity::default(),
            sensors: Vec::new(),
            firmware_version: default_firmware_version(),
            encrypted: default_encrypted(),
        }
    }

    pub fn sensor(mut self, sensor: SensorSpec) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Build the device record. Sensors get fresh ids and a zero placeholder reading.
    pub fn into_device(self, now: DateTime<Utc>) -> Device {
        let sensors = self
            .sensors
            .into_iter()
            .map(|spec| {
                let id = Uuid::new_v4().to_string();
                let last_reading = Reading::placeholder(&id, &spec.unit, now);
                Sensor {
                    id,
                    sensor_type: spec.sensor_type,
                    unit: spec.unit,
                    range: spec.range,
                    accuracy: spec.accuracy,
                    calibrated_at: now,
                    calibration_due: now + Duration::days(CALIBRATION_WINDOW_DAYS),
                    last_reading,
                }
            })
            .collect();

        Device {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            device_type: self.device_type,
            location: self.location,
            connectivity: self.connectivity,
            status: DeviceStatus::Online,
            last_seen: now,
            registered_at: now,
            sensors,
            firmware: FirmwareInfo {
                version: self.firmware_version,
                updated_at: now,
            },
            security: SecurityInfo {
                encrypted: self.encrypted,
                last_scan_at: None,
                vulnerabilities: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bay_spec() -> DeviceSpec {
        DeviceSpec::new(
            "bay-A12",
            DeviceType::ParkingSensor,
            Location::new(40.7128, -74.0060),
        )
        .sensor(SensorSpec::new(SensorType::Occupancy, "bool", (0.0, 1.0)))
        .sensor(SensorSpec::new(SensorType::Battery, "%", (0.0, 100.0)))
        .sensor(SensorSpec::new(SensorType::Temperature, "°C", (-40.0, 85.0)))
    }

    #[test]
    fn test_into_device_keeps_sensor_count() {
        let device = bay_spec().into_device(Utc::now());
        assert_eq!(device.sensors.len(), 3);
        assert_eq!(device.status, DeviceStatus::Online);
        for sensor in &device.sensors {
            assert_eq!(sensor.last_reading.value, 0.0);
            assert_eq!(sensor.last_reading.sensor_id(), sensor.id);
        }
    }

    #[test]
    fn test_calibration_window() {
        let now = Utc::now();
        let device = bay_spec().into_device(now);
        for sensor in &device.sensors {
            assert_eq!(sensor.calibration_due - sensor.calibrated_at, Duration::days(30));
        }
    }

    #[test]
    fn test_sensor_ids_unique() {
        let device = bay_spec().into_device(Utc::now());
        let mut ids: Vec<_> = device.sensors.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_sensor_clamp() {
        let device = bay_spec().into_device(Utc::now());
        let battery = &device.sensors[1];
        assert_eq!(battery.clamp(120.0), 100.0);
        assert_eq!(battery.clamp(-3.0), 0.0);
        assert!(battery.contains(100.0));
        assert!(!battery.contains(100.1));
    }

    #[test]
    fn test_device_spec_deserialize_defaults() {
        let json = r#"{
            "name": "meter-7",
            "device_type": "smart_meter",
            "location": { "latitude": 51.5, "longitude": -0.12 }
        }"#;
        let spec: DeviceSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.firmware_version, "1.0.0");
        assert!(spec.encrypted);
        assert!(spec.sensors.is_empty());
        assert_eq!(spec.connectivity.protocol, Protocol::LoRaWan);
    }

    #[test]
    fn test_protocol_wire_names() {
        assert_eq!(serde_json::to_value(Protocol::LoRaWan).unwrap(), "lorawan");
        assert_eq!(serde_json::to_value(Protocol::WiFi).unwrap(), "wifi");
        let parsed: Protocol = serde_json::from_str("\"lorawan\"").unwrap();
        assert_eq!(parsed, Protocol::LoRaWan);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Online".parse::<DeviceStatus>().unwrap(), DeviceStatus::Online);
        assert!("sleeping".parse::<DeviceStatus>().is_err());
        assert_eq!(
            "parking_sensor".parse::<DeviceType>().unwrap(),
            DeviceType::ParkingSensor
        );
    }
}
