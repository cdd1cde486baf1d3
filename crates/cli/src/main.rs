//! Parking Device Telemetry CLI
//!
//! A command-line tool for registering, inspecting and removing simulated
//! devices and reading their telemetry through the daemon's HTTP API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{devices, health, settings};
use std::path::PathBuf;

/// Parking Device Telemetry CLI
#[derive(Parser)]
#[command(name = "devctl")]
#[command(author, version, about = "CLI for the Parking Device Telemetry simulator", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via DEVCTL_API_URL env var)
    #[arg(long, env = "DEVCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, value_enum)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage registered devices
    #[command(subcommand)]
    Devices(DeviceCommands),

    /// Show recent readings of a device
    Readings {
        /// Device ID
        id: String,

        /// Show only the most recent N readings
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Show daemon component health
    Health,

    /// View or change local CLI settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// List devices
    List {
        /// Filter by device type (parking_sensor, camera, smart_meter, environmental_station, gateway)
        #[arg(long = "type")]
        device_type: Option<String>,

        /// Filter by status (online, offline, maintenance, error)
        #[arg(long)]
        status: Option<String>,

        /// Latitude of the search centre
        #[arg(long, requires_all = ["lon", "radius_km"], allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the search centre
        #[arg(long, requires_all = ["lat", "radius_km"], allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Search radius in kilometres (boundary inclusive)
        #[arg(long, requires_all = ["lat", "lon"])]
        radius_km: Option<f64>,
    },

    /// Show one device and its sensors
    Get {
        /// Device ID
        id: String,
    },

    /// Register devices from a JSON spec file (object or array)
    Register {
        /// Path to a JSON file of device specs
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Remove a device and stop its health checks
    Remove {
        /// Device ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show stored settings
    Show,

    /// Store settings
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default output format
        #[arg(long, value_enum)]
        default_format: Option<output::OutputFormat>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        if verbose {
            eprintln!("{:?}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let stored = config::Config::load()?;
    let format = stored.resolve_format(cli.format);

    if let Commands::Config(config_cmd) = &cli.command {
        return match config_cmd {
            ConfigCommands::Show => settings::show_settings(format),
            ConfigCommands::Set {
                api_url,
                default_format,
            } => settings::set_settings(api_url.clone(), *default_format),
        };
    }

    let api_url = stored.resolve_api_url(cli.api_url);
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Devices(device_cmd) => match device_cmd {
            DeviceCommands::List {
                device_type,
                status,
                lat,
                lon,
                radius_km,
            } => {
                let filters = devices::ListFilters {
                    device_type,
                    status,
                    lat,
                    lon,
                    radius_km,
                };
                devices::list_devices(&client, filters, format).await?;
            }
            DeviceCommands::Get { id } => {
                devices::get_device(&client, &id, format).await?;
            }
            DeviceCommands::Register { file } => {
                devices::register_devices(&client, &file, format).await?;
            }
            DeviceCommands::Remove { id } => {
                devices::remove_device(&client, &id).await?;
            }
        },
        Commands::Readings { id, limit } => {
            devices::show_readings(&client, &id, limit, format).await?;
        }
        Commands::Health => {
            health::show_health(&client, format).await?;
        }
        Commands::Config(_) => {}
    }

    Ok(())
}
