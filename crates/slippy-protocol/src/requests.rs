//! Requests that clients send to the router.
//!
//! Parsing is strict about the function name and lenient about scalar types:
//! `type` may be `7` or `"7"`, `to` may be a string or a number. Anything the
//! router cannot turn into a single, unambiguous device command is rejected
//! as a malformed request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coerce;
use crate::envelope::{Envelope, Function};
use crate::error::{ProtocolError, ProtocolResult};

/// Maximum payload accepted by `serial::send`, in bytes.
pub const MAX_SERIAL_SEND: usize = 512;

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Write raw data to the serial port.
    SerialSend { data: String },
    /// Close and reopen the serial port.
    SerialReset,
    /// Transmit a packet over the mesh.
    SlippySend(SendPacket),
    /// Ask for the device's own address.
    GetInfo,
}

/// Arguments of `slippy::send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPacket {
    /// Destination address.
    #[serde(deserialize_with = "coerce::string_like")]
    pub to: String,
    /// Base64 payload.
    pub data: String,
    /// Packet type.
    #[serde(rename = "type", deserialize_with = "coerce::byte_like")]
    pub packet_type: u8,
    /// Service id.
    #[serde(deserialize_with = "coerce::byte_like")]
    pub service: u8,
    /// Packet flags, most significant first.
    pub flags: Vec<bool>,
}

#[derive(Deserialize)]
struct SerialSendArgs {
    data: String,
}

impl Request {
    /// Parse and validate one framed line.
    pub fn parse(line: &str) -> ProtocolResult<Request> {
        Request::from_envelope(Envelope::parse(line)?)
    }

    /// Validate an already-decoded envelope.
    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Request> {
        let function = match Function::from_name(&envelope.function) {
            Some(f) if f.is_request() => f,
            _ => return Err(ProtocolError::UnknownFunction(envelope.function)),
        };

        match function {
            Function::SerialSend => {
                let args: SerialSendArgs = decode_args(function, envelope.args)?;
                if args.data.len() > MAX_SERIAL_SEND {
                    return Err(ProtocolError::malformed(format!(
                        "{}: data is {} bytes (max {})",
                        function,
                        args.data.len(),
                        MAX_SERIAL_SEND
                    )));
                }
                Ok(Request::SerialSend { data: args.data })
            }
            Function::SerialReset => Ok(Request::SerialReset),
            Function::SlippySend => {
                let packet: SendPacket = decode_args(function, envelope.args)?;
                packet.validate()?;
                Ok(Request::SlippySend(packet))
            }
            Function::SlippyGetInfo => Ok(Request::GetInfo),
            Function::SerialRecive | Function::SlippyRecive => {
                Err(ProtocolError::UnknownFunction(envelope.function))
            }
        }
    }

    /// The function this request was sent under.
    pub fn function(&self) -> Function {
        match self {
            Request::SerialSend { .. } => Function::SerialSend,
            Request::SerialReset => Function::SerialReset,
            Request::SlippySend(_) => Function::SlippySend,
            Request::GetInfo => Function::SlippyGetInfo,
        }
    }
}

fn decode_args<T: DeserializeOwned>(function: Function, args: Map<String, Value>) -> ProtocolResult<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ProtocolError::malformed(format!("{}: {}", function, e)))
}

impl SendPacket {
    /// Check that `to` and `data` fit in a single device command line.
    pub fn validate(&self) -> ProtocolResult<()> {
        check_token("to", &self.to)?;
        check_token("data", &self.data)
    }

    /// Flags as a binary literal body, `1` for set.
    pub fn flag_bits(&self) -> String {
        self.flags.iter().map(|&b| if b { '1' } else { '0' }).collect()
    }

    /// Render the `send64` command written to the device.
    pub fn to_command(&self) -> String {
        format!(
            "send64 {} \"{}\" {} {} 0b{}\n",
            self.to,
            self.data,
            self.packet_type,
            self.service,
            self.flag_bits()
        )
    }
}

fn check_token(field: &str, value: &str) -> ProtocolResult<()> {
    if value.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "{}: {} is empty",
            Function::SlippySend,
            field
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '"')
    {
        return Err(ProtocolError::malformed(format!(
            "{}: {} contains {:?}",
            Function::SlippySend,
            field,
            c
        )));
    }
    Ok(())
}
