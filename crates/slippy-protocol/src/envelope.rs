//! The `{function, args}` envelope and the events the router emits.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frames::MeshPacket;

/// Every function name that can appear on the wire.
///
/// `recive` is the spelling the deployed clients expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// Write raw data to the serial port (`serial::send`).
    SerialSend,
    /// Close and reopen the serial port (`serial::reset`).
    SerialReset,
    /// A line was read from the serial port (`serial::recive`).
    SerialRecive,
    /// Transmit a packet over the mesh (`slippy::send`).
    SlippySend,
    /// A mesh packet was received (`slippy::recive`).
    SlippyRecive,
    /// Query the locally attached device (`slippy::get_info`).
    SlippyGetInfo,
}

impl Function {
    /// Get the wire name of the function.
    pub fn as_str(&self) -> &'static str {
        match self {
            Function::SerialSend => "serial::send",
            Function::SerialReset => "serial::reset",
            Function::SerialRecive => "serial::recive",
            Function::SlippySend => "slippy::send",
            Function::SlippyRecive => "slippy::recive",
            Function::SlippyGetInfo => "slippy::get_info",
        }
    }

    /// Look a function up by its wire name.
    pub fn from_name(name: &str) -> Option<Function> {
        match name {
            "serial::send" => Some(Function::SerialSend),
            "serial::reset" => Some(Function::SerialReset),
            "serial::recive" => Some(Function::SerialRecive),
            "slippy::send" => Some(Function::SlippySend),
            "slippy::recive" => Some(Function::SlippyRecive),
            "slippy::get_info" => Some(Function::SlippyGetInfo),
            _ => None,
        }
    }

    /// Whether clients may invoke this function.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Function::SerialSend
                | Function::SerialReset
                | Function::SlippySend
                | Function::SlippyGetInfo
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The untyped wire shape shared by requests and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Function name, e.g. `slippy::send`.
    pub function: String,
    /// Function arguments. Absent on input means empty.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Envelope {
    /// Parse one framed line into an envelope.
    pub fn parse(line: &str) -> ProtocolResult<Envelope> {
        serde_json::from_str(line).map_err(|e| ProtocolError::malformed(e.to_string()))
    }
}

/// Messages the router pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", content = "args")]
pub enum Event {
    /// A raw line read from the serial port, terminator included.
    #[serde(rename = "serial::recive")]
    SerialRecive { data: String },

    /// A mesh packet decoded from a `JSON:` line.
    #[serde(rename = "slippy::recive")]
    SlippyRecive(MeshPacket),

    /// Reply to `slippy::get_info`.
    #[serde(rename = "slippy::get_info")]
    DeviceInfo { address: String },
}

impl Event {
    /// The function name this event is sent under.
    pub fn function(&self) -> Function {
        match self {
            Event::SerialRecive { .. } => Function::SerialRecive,
            Event::SlippyRecive(_) => Function::SlippyRecive,
            Event::DeviceInfo { .. } => Function::SlippyGetInfo,
        }
    }

    /// Encode the event as one JSON line, `\n` terminated.
    pub fn encode_line(&self) -> ProtocolResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Encode several events back to back, preserving their order.
pub fn encode_batch(events: &[Event]) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    for event in events {
        out.extend_from_slice(&event.encode_line()?);
    }
    Ok(out)
}
