//! Classification of lines read from the device's serial port.
//!
//! The firmware prints free-form diagnostics, with two kinds of tagged line
//! mixed in:
//!
//! - `Your address is: 0x01234567` once per boot, announcing the device address
//! - `JSON: {...}` for every packet received from the mesh
//!
//! Everything else is a plain line. All lines, tagged or not, are forwarded
//! to clients verbatim as `serial::recive`.

use serde::{Deserialize, Serialize};

use crate::coerce;
use crate::envelope::Event;
use crate::error::{ProtocolError, ProtocolResult};

/// Prefix of the boot banner announcing the device's own address.
pub const ADDRESS_PREFIX: &str = "Your address is:";

/// Offset at which the address starts in a boot banner line.
pub const ADDRESS_OFFSET: usize = ADDRESS_PREFIX.len() + 1;

/// Prefix of a line carrying a received mesh packet.
pub const PACKET_PREFIX: &str = "JSON:";

/// A packet received from the mesh, as reported by the firmware.
///
/// Addresses and payload are kept as strings and all numeric fields as
/// integers regardless of how the firmware typed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshPacket {
    /// Destination address.
    #[serde(deserialize_with = "coerce::string_like")]
    pub to: String,
    /// Source address.
    #[serde(deserialize_with = "coerce::string_like")]
    pub from: String,
    /// Service id (0-255).
    #[serde(deserialize_with = "coerce::integer_like")]
    pub service: i64,
    /// Packet type (0-255).
    #[serde(rename = "type", deserialize_with = "coerce::integer_like")]
    pub packet_type: i64,
    /// Packet flags in firmware order.
    pub flags: Vec<bool>,
    /// Per-packet id assigned by the mesh layer.
    #[serde(deserialize_with = "coerce::string_like")]
    pub uid: String,
    /// Payload size in bytes.
    #[serde(deserialize_with = "coerce::integer_like")]
    pub size: i64,
    /// Base64 payload.
    #[serde(deserialize_with = "coerce::string_like")]
    pub data: String,
    /// Received signal strength.
    #[serde(deserialize_with = "coerce::integer_like")]
    pub rssi: i64,
    /// Signal-to-noise ratio.
    #[serde(deserialize_with = "coerce::integer_like")]
    pub snr: i64,
}

impl MeshPacket {
    /// Parse the text following [`PACKET_PREFIX`].
    ///
    /// One separator character between the prefix and the JSON object is
    /// skipped.
    pub fn parse(body: &str) -> ProtocolResult<MeshPacket> {
        let mut chars = body.chars();
        let body = match chars.next() {
            Some(c) if c != '{' => chars.as_str(),
            _ => body,
        };
        serde_json::from_str(body).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
    }
}

/// The classification of one serial line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialLine {
    /// Boot banner carrying the device's own address.
    AddressAnnouncement { address: String },
    /// A well-formed received-packet frame.
    Packet(MeshPacket),
    /// A `JSON:` line that failed to decode.
    MalformedPacket { reason: String },
    /// Anything else.
    Plain,
}

impl SerialLine {
    /// Classify a raw line, terminator included.
    pub fn classify(raw: &str) -> SerialLine {
        if raw.starts_with(ADDRESS_PREFIX) {
            let address = raw.get(ADDRESS_OFFSET..).unwrap_or("").trim().to_string();
            return SerialLine::AddressAnnouncement { address };
        }

        if let Some(body) = raw.strip_prefix(PACKET_PREFIX) {
            return match MeshPacket::parse(body) {
                Ok(packet) => SerialLine::Packet(packet),
                Err(e) => SerialLine::MalformedPacket {
                    reason: e.to_string(),
                },
            };
        }

        SerialLine::Plain
    }

    /// Short label for the classification (used as a metric label).
    pub fn kind(&self) -> &'static str {
        match self {
            SerialLine::AddressAnnouncement { .. } => "address",
            SerialLine::Packet(_) => "packet",
            SerialLine::MalformedPacket { .. } => "malformed",
            SerialLine::Plain => "plain",
        }
    }

    /// Events to broadcast for this line, in delivery order.
    ///
    /// The raw line always goes out first; a decoded packet follows it.
    pub fn into_events(self, raw: &str) -> Vec<Event> {
        let mut events = vec![Event::SerialRecive {
            data: raw.to_string(),
        }];
        if let SerialLine::Packet(packet) = self {
            events.push(Event::SlippyRecive(packet));
        }
        events
    }
}
