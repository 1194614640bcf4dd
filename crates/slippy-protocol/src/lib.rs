//! Slippymesh Router Protocol
//!
//! This crate provides the wire formats spoken by the slippymesh router. The
//! router sits between a mesh radio attached over a serial port and any number
//! of TCP clients, so there are two protocols:
//!
//! # Client Protocol
//!
//! Newline-delimited JSON envelopes in both directions:
//!
//! ```text
//! {"function":"slippy::send","args":{"to":"0x01234567","data":"aGk=","type":1,"service":2,"flags":[true,false]}}
//! ```
//!
//! - **Requests** (client → router): `serial::send`, `serial::reset`,
//!   `slippy::send`, `slippy::get_info`
//! - **Events** (router → client): `serial::recive`, `slippy::recive`, and the
//!   `slippy::get_info` reply
//!
//! # Serial Protocol
//!
//! The firmware prints text lines. Two of them are tagged:
//!
//! - `Your address is: <address>`: the boot banner
//! - `JSON: {...}`: a packet received from the mesh
//!
//! Mesh transmissions are requested with a single line:
//! `send64 <to> "<data>" <type> <service> 0b<flags>`.
//!
//! # Example
//!
//! ```rust
//! use slippy_protocol::{Request, SerialLine};
//!
//! let request = Request::parse(r#"{"function":"slippy::get_info"}"#).unwrap();
//! assert_eq!(request, Request::GetInfo);
//!
//! let events = SerialLine::classify("booting\n").into_events("booting\n");
//! assert_eq!(events.len(), 1);
//! ```

mod codec;
mod coerce;
mod envelope;
mod error;
mod frames;
mod requests;

pub use codec::*;
pub use envelope::*;
pub use error::*;
pub use frames::*;
pub use requests::*;
