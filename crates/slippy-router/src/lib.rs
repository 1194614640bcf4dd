//! Slippymesh Router
//!
//! Bridges one slippymesh device on a serial port to any number of TCP
//! clients speaking the newline-delimited JSON protocol of
//! [`slippy_protocol`].
//!
//! # Architecture
//!
//! ```text
//! SerialLink ──► serial reader ──► FrameClassifier ──► ClientRegistry::broadcast ──► clients
//!     ▲                                   │
//!     │                                   ▼
//!     └────── CommandDispatcher ◄──── DeviceState
//!                   ▲
//!             Acceptor / connection tasks ◄── clients
//! ```
//!
//! - [`SerialLink`] owns the device and survives client-requested resets.
//! - The serial reader runs on its own OS thread and broadcasts every line.
//! - Each client connection is a Tokio task with a bounded outbox; a client
//!   that stops reading is dropped instead of stalling the others.

pub mod classifier;
pub mod config;
pub mod device_state;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod serial_link;
pub mod serial_reader;
pub mod server;

pub use classifier::FrameClassifier;
pub use config::{Cli, RouterConfig, DEFAULT_BAUD_RATE, DEFAULT_PORT};
pub use device_state::{DeviceState, UNKNOWN_ADDRESS};
pub use dispatcher::CommandDispatcher;
pub use error::{ConfigError, DispatchError, RouterError, SerialError};
pub use registry::{ClientId, ClientRegistry, Registration};
pub use serial_link::{SerialDevice, SerialHandles, SerialLink, SerialPortDevice};
pub use serial_reader::spawn_serial_reader;
pub use server::Acceptor;
