//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color device or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "online" | "healthy" => status.green().to_string(),
        "maintenance" | "degraded" => status.yellow().to_string(),
        "offline" | "error" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color reading quality
pub fn color_quality(quality: &str) -> String {
    match quality.to_lowercase().as_str() {
        "excellent" | "good" => quality.green().to_string(),
        "fair" => quality.yellow().to_string(),
        "poor" => quality.red().to_string(),
        _ => quality.to_string(),
    }
}

/// Format coordinates with five decimals (about a metre)
pub fn format_location(latitude: f64, longitude: f64) -> String {
    format!("{:.5}, {:.5}", latitude, longitude)
}

/// Format a reading value; large magnitudes drop decimals
pub fn format_value(value: f64) -> String {
    if value.abs() >= 100.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.3}", value)
    }
}

/// Format timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    // Try to parse and format nicely, otherwise return as-is
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Truncate ID for display
pub fn truncate_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}
