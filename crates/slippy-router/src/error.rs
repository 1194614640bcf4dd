//! Error types for the router.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use slippy_protocol::ProtocolError;
use thiserror::Error;

/// Failures of the serial link.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The link is closed: never opened, or the last reset failed.
    #[error("serial link is closed")]
    Closed,

    /// The device stopped producing data (end of stream).
    #[error("serial device disconnected")]
    Disconnected,

    /// An I/O error from the device.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while handling one client request.
///
/// None of these close the client connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request was malformed or named an unknown function.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request was valid but the serial link failed to carry it out.
    #[error(transparent)]
    Serial(#[from] SerialError),
}

impl DispatchError {
    /// Short label for the error kind (used as a metric label).
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Protocol(e) => e.kind(),
            DispatchError::Serial(_) => "serial",
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The config file is not valid YAML for [`crate::RouterConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level errors that stop the router from starting.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The serial device could not be opened.
    #[error("failed to open serial device {device}: {source}")]
    SerialOpen {
        /// Device description.
        device: String,
        /// Underlying error.
        source: SerialError,
    },

    /// The listening socket could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Requested listen address.
        addr: SocketAddr,
        /// Underlying error.
        source: io::Error,
    },

    /// Any other I/O failure during startup.
    #[error(transparent)]
    Io(#[from] io::Error),
}
