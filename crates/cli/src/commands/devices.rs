//! Device-related CLI commands

use anyhow::{Context, Result};
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, Device, Reading};
use crate::output::{
    color_quality, color_status, format_location, format_timestamp, format_value, print_json,
    print_success, print_warning, truncate_id, OutputFormat,
};

/// Row for devices table
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Sensors")]
    sensors: usize,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

/// Row for the sensors of one device
#[derive(Tabled)]
struct SensorRow {
    #[tabled(rename = "Sensor")]
    id: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Range")]
    range: String,
    #[tabled(rename = "Last Value")]
    last_value: String,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Calibration Due")]
    calibration_due: String,
}

/// Row for readings table
#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Time")]
    timestamp: String,
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Quality")]
    quality: String,
    #[tabled(rename = "Clamped")]
    clamped: String,
}

/// Filters for listing devices
#[derive(Debug, Default, Clone)]
pub struct ListFilters {
    pub device_type: Option<String>,
    pub status: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_km: Option<f64>,
}

impl ListFilters {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(t) = &self.device_type {
            query.push(("device_type", t.clone()));
        }
        if let Some(s) = &self.status {
            query.push(("status", s.clone()));
        }
        if let Some(lat) = self.lat {
            query.push(("lat", lat.to_string()));
        }
        if let Some(lon) = self.lon {
            query.push(("lon", lon.to_string()));
        }
        if let Some(r) = self.radius_km {
            query.push(("radius_km", r.to_string()));
        }
        query
    }
}

fn device_row(d: &Device) -> DeviceRow {
    DeviceRow {
        id: truncate_id(&d.id),
        name: d.name.clone(),
        device_type: d.device_type.clone(),
        status: color_status(&d.status),
        location: format_location(d.location.latitude, d.location.longitude),
        sensors: d.sensors.len(),
        last_seen: format_timestamp(&d.last_seen),
    }
}

/// List devices with optional filters
pub async fn list_devices(client: &ApiClient, filters: ListFilters, format: OutputFormat) -> Result<()> {
    let devices: Vec<Device> = client
        .get_with_query("api/v1/devices", &filters.to_query())
        .await?;

    match format {
        OutputFormat::Json => print_json(&devices)?,
        OutputFormat::Table => {
            if devices.is_empty() {
                print_warning("No devices found");
                return Ok(());
            }

            let rows: Vec<DeviceRow> = devices.iter().map(device_row).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} devices", devices.len());
        }
    }

    Ok(())
}

/// Show one device with its sensors
pub async fn get_device(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let device: Device = client.get(&format!("api/v1/devices/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&device)?,
        OutputFormat::Table => {
            println!("Device:     {} ({})", device.name, device.id);
            println!("Type:       {}", device.device_type);
            println!("Status:     {}", color_status(&device.status));
            println!(
                "Location:   {}",
                format_location(device.location.latitude, device.location.longitude)
            );
            if let Some(zone) = &device.location.zone {
                println!("Zone:       {}", zone);
            }
            println!("Firmware:   {}", device.firmware.version);
            println!("Registered: {}", format_timestamp(&device.registered_at));
            println!("Last seen:  {}", format_timestamp(&device.last_seen));

            if device.sensors.is_empty() {
                println!();
                print_warning("Device has no sensors");
                return Ok(());
            }

            let rows: Vec<SensorRow> = device
                .sensors
                .iter()
                .map(|s| SensorRow {
                    id: truncate_id(&s.id),
                    sensor_type: s.sensor_type.clone(),
                    range: format!("{} .. {} {}", s.range.0, s.range.1, s.unit),
                    last_value: format_value(s.last_reading.value),
                    quality: color_quality(&s.last_reading.quality),
                    calibration_due: format_timestamp(&s.calibration_due),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("\n{}", table);
        }
    }

    Ok(())
}

/// Register devices from a JSON file holding one spec or an array of specs
pub async fn register_devices(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let specs = parse_specs(&raw).with_context(|| format!("Invalid device spec in {}", file.display()))?;

    let mut registered = Vec::with_capacity(specs.len());
    for spec in &specs {
        let device: Device = client.post("api/v1/devices", spec).await?;
        registered.push(device);
    }

    match format {
        OutputFormat::Json => print_json(&registered)?,
        OutputFormat::Table => {
            for device in &registered {
                print_success(&format!("Registered {} as {}", device.name, device.id));
            }
        }
    }

    Ok(())
}

/// Accept either a single spec object or an array of them
fn parse_specs(raw: &str) -> Result<Vec<serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    match value {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(_) => Ok(vec![value]),
        _ => anyhow::bail!("expected a JSON object or array"),
    }
}

/// Remove a device
pub async fn remove_device(client: &ApiClient, id: &str) -> Result<()> {
    client.delete(&format!("api/v1/devices/{}", id)).await?;
    print_success(&format!("Device {} removed", id));
    Ok(())
}

/// Show recent readings of a device, oldest first
pub async fn show_readings(
    client: &ApiClient,
    id: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let query: Vec<(&str, String)> = limit.map(|l| ("limit", l.to_string())).into_iter().collect();
    let readings: Vec<Reading> = client
        .get_with_query(&format!("api/v1/devices/{}/readings", id), &query)
        .await?;

    match format {
        OutputFormat::Json => print_json(&readings)?,
        OutputFormat::Table => {
            if readings.is_empty() {
                print_warning("No readings yet");
                return Ok(());
            }

            let rows: Vec<ReadingRow> = readings
                .iter()
                .map(|r| ReadingRow {
                    timestamp: format_timestamp(&r.timestamp),
                    sensor: truncate_id(&r.metadata.sensor_id),
                    value: format_value(r.value),
                    unit: r.metadata.unit.clone(),
                    quality: color_quality(&r.quality),
                    clamped: if r.metadata.clamped {
                        "✓".to_string()
                    } else {
                        "".to_string()
                    },
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
