//! Daemon configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry_lib::DeviceSpec;

/// Daemon configuration, read from `TELEMETRY_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Name attached to every structured log line
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics/devices
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Seconds between health checks of one device
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Readings kept per device
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Window in which repeat alerts are suppressed
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Probability a simulated health probe reaches its device
    #[serde(default = "default_probe_success_rate")]
    pub probe_success_rate: f64,

    /// Alerts kept by the in-memory ledger
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention: usize,

    /// Reading noise as a fraction of the sensor type's base value
    #[serde(default = "default_noise_ratio")]
    pub noise_ratio: f64,

    /// JSON array of device specs registered at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "telemetryd".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    5
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_history_capacity() -> usize {
    telemetry_lib::registry::DEFAULT_HISTORY_CAPACITY
}

fn default_dedup_window() -> u64 {
    60
}

fn default_probe_success_rate() -> f64 {
    telemetry_lib::health::DEFAULT_PROBE_SUCCESS_RATE
}

fn default_ledger_retention() -> usize {
    telemetry_lib::ledger::DEFAULT_LEDGER_RETENTION
}

fn default_noise_ratio() -> f64 {
    telemetry_lib::simulator::DEFAULT_NOISE_RATIO
}

impl TelemetryConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix("TELEMETRY"))
    }

    fn from_env(source: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()
            .context("Failed to read telemetry configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid telemetry configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be at least 1");
        }
        if self.health_check_interval_secs == 0 {
            anyhow::bail!("health_check_interval_secs must be at least 1");
        }
        if self.history_capacity == 0 {
            anyhow::bail!("history_capacity must be at least 1");
        }
        if self.ledger_retention == 0 {
            anyhow::bail!("ledger_retention must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.probe_success_rate) {
            anyhow::bail!("probe_success_rate must be between 0 and 1");
        }
        if !self.noise_ratio.is_finite() || !(0.0..=1.0).contains(&self.noise_ratio) {
            anyhow::bail!("noise_ratio must be between 0 and 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

/// Read device specs from a JSON seed file
pub fn load_seed_file(path: &Path) -> Result<Vec<DeviceSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))
}
