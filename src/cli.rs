use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// The command line interface for the serial gateway.
///
/// Flags override the configuration file.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Serial device to bridge, e.g. `/dev/ttyUSB0` or `COM3`
    #[arg(short = 's', long)]
    pub device: Option<String>,

    /// Baud rate for the device
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Host to bind the listener on
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Read deadline for the active connection in milliseconds; zero disables it
    #[arg(short, long)]
    pub read_timeout: Option<u64>,

    /// Write deadline for the active connection in milliseconds; zero disables it
    #[arg(short, long)]
    pub write_timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand)]
pub enum Commands {
    /// Show an example of a configuration file's contents.
    ConfigExample,
}

impl Cli {
    /// Lay any provided flags over `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.device.path = device.clone();
        }
        if let Some(baud) = self.baud {
            config.device.baud = baud;
        }
        if let Some(host) = &self.host {
            config.listener.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(read_timeout) = self.read_timeout {
            config.listener.read_timeout_ms = read_timeout;
        }
        if let Some(write_timeout) = self.write_timeout {
            config.listener.write_timeout_ms = write_timeout;
        }
    }
}
