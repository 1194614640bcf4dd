//! Router configuration.
//!
//! Settings come from an optional YAML file, then individual command line
//! flags override whatever the file (or the defaults) provided.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default TCP port clients connect to.
pub const DEFAULT_PORT: u16 = 3006;

/// Default serial baud rate of the slippymesh firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Complete router configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Address the client listener binds to.
    pub listen: SocketAddr,

    /// Pending-connection backlog for the listener.
    pub backlog: u32,

    /// Serial device path (e.g. `/dev/ttyUSB0`, `COM11`).
    pub serial_port: String,

    /// Serial baud rate.
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds.
    /// Bounds how long a reset may wait for the reader to let go of the port.
    pub read_timeout_ms: u64,

    /// Pause between closing and reopening the port on `serial::reset`.
    pub reset_delay_ms: u64,

    /// Messages buffered per client before it is considered too slow and
    /// disconnected.
    pub client_queue_depth: usize,

    /// Address for the Prometheus endpoint (requires the `prometheus` feature).
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            backlog: 64,
            serial_port: default_serial_port().to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 500,
            reset_delay_ms: 1000,
            client_queue_depth: 256,
            metrics_listen: None,
        }
    }
}

fn default_serial_port() -> &'static str {
    if cfg!(windows) {
        "COM11"
    } else {
        "/dev/ttyUSB0"
    }
}

impl RouterConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Reject values the router cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial_port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial_port is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be positive".into()));
        }
        if self.client_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "client_queue_depth must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Serial read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Delay between close and reopen on reset.
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Set the listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Set the per-client queue depth.
    pub fn with_client_queue_depth(mut self, depth: usize) -> Self {
        self.client_queue_depth = depth;
        self
    }
}

/// Command line interface of the `slippyrouter` binary.
#[derive(Parser, Debug, Default)]
#[command(
    name = "slippyrouter",
    version,
    about = "Bridges a slippymesh serial device to TCP clients"
)]
pub struct Cli {
    /// YAML config file; flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address for clients (default 0.0.0.0:3006).
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Listener backlog.
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Serial device path.
    #[arg(short = 'p', long)]
    pub serial_port: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    pub baud_rate: Option<u32>,

    /// Serial read timeout in milliseconds.
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// Delay between close and reopen on reset, in milliseconds.
    #[arg(long)]
    pub reset_delay_ms: Option<u64>,

    /// Messages buffered per client before it is dropped.
    #[arg(long)]
    pub client_queue_depth: Option<usize>,

    /// Prometheus listen address (needs the `prometheus` feature).
    #[arg(long)]
    pub metrics_listen: Option<SocketAddr>,
}

impl Cli {
    /// Resolve the final configuration: file (or defaults), then flags.
    pub fn into_config(self) -> Result<RouterConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => RouterConfig::load(path)?,
            None => RouterConfig::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    fn apply(self, mut config: RouterConfig) -> RouterConfig {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(serial_port) = self.serial_port {
            config.serial_port = serial_port;
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if let Some(ms) = self.reset_delay_ms {
            config.reset_delay_ms = ms;
        }
        if let Some(depth) = self.client_queue_depth {
            config.client_queue_depth = depth;
        }
        if let Some(addr) = self.metrics_listen {
            config.metrics_listen = Some(addr);
        }
        config
    }
}
