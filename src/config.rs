use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// The serial device to bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the device.
    /// Likely "/dev/ttyACMx" or "COMx".
    pub path: String,

    /// Baud rate.
    pub baud: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        #[cfg(windows)]
        let path = "COM3".into();

        #[cfg(not(windows))]
        let path = "/dev/ttyUSB0".into();

        Self { path, baud: 115_200 }
    }
}

/// The TCP side of the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Host to bind on.
    pub host: String,

    /// Port to listen on. Zero means any available port.
    pub port: u16,

    /// Deadline for one read from the active connection, in milliseconds.
    /// Zero disables the deadline.
    pub read_timeout_ms: u64,

    /// Deadline for one write to the active connection, in milliseconds.
    /// Zero disables the deadline.
    pub write_timeout_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7070,
            read_timeout_ms: 1500,
            write_timeout_ms: 1500,
        }
    }
}

impl ListenerConfig {
    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub(crate) fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

/// The configuration used for running the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// The device one client at a time gets to talk to.
    pub device: DeviceConfig,

    /// Where clients connect, and their deadlines.
    pub listener: ListenerConfig,
}

impl Config {
    /// Deserialize a .ron file's contents.
    /// Panics if the input is not valid .ron.
    pub fn deserialize(input: &str) -> Self {
        ron::from_str(input).unwrap()
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: DeviceConfig {
                path: "/dev/ttyACM0".into(),
                baud: 115_200,
            },
            listener: ListenerConfig {
                host: "0.0.0.0".into(),
                port: 7070,
                read_timeout_ms: 1500,
                write_timeout_ms: 1500,
            },
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).unwrap()
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Self {
        let s = std::fs::read_to_string(p).unwrap();

        Self::deserialize(&s)
    }
}
