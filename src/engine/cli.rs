//! FOTA CLI Module
//! Command-line interface for the update service

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use super::registry::DeviceRecord;

#[derive(Parser, Debug)]
#[command(name = "fota")]
#[command(author = "FOTA Team")]
#[command(version)]
#[command(about = "Firmware-over-the-air update service for embedded devices", long_about = None)]
pub struct Cli {
    /// Data directory holding the registry and firmware files
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Explicit config file (defaults to <data-dir>/fota.config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the update server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Device registry management
    Devices {
        #[command(subcommand)]
        action: DevicesAction,
    },

    /// Run an update check as a device would
    Check {
        /// Device identifier
        device_id: String,

        /// Firmware version the device reports
        version: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DevicesAction {
    /// List every registered device
    List,

    /// Register a device or change its desired firmware
    Register {
        device_id: String,
        version: String,
        firmware_ref: String,
    },

    /// Remove a device from the registry
    Remove { device_id: String },
}

impl Cli {
    pub fn get_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./data"))
    }
}

/// A completed action, prefixed with a green check mark
pub fn success_line(message: &str) -> String {
    format!("{} {}", "✓".green().bold(), message)
}

pub fn error_line(message: &str) -> String {
    format!("{} {}", "✗".red().bold(), message)
}

pub fn device_line(device: &DeviceRecord) -> String {
    format!(
        "{}  {}  {}",
        device.device_id.bright_white().bold(),
        device.desired_version,
        device.firmware_ref
    )
}
