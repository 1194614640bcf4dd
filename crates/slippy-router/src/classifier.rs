//! Turns serial lines into client events and tracks the device address.

use std::sync::Arc;

use slippy_metrics::metric_defs;
use slippy_protocol::{Event, SerialLine};
use tracing::{info, trace, warn};

use crate::device_state::DeviceState;

/// Classifies lines from the serial reader.
///
/// Boot banners update the shared [`DeviceState`]; everything else only
/// produces events.
pub struct FrameClassifier {
    device: Arc<DeviceState>,
}

impl FrameClassifier {
    /// Create a classifier writing announcements into `device`.
    pub fn new(device: Arc<DeviceState>) -> Self {
        FrameClassifier { device }
    }

    /// Events to broadcast for one raw line, in delivery order.
    pub fn classify(&self, raw: &str) -> Vec<Event> {
        let line = SerialLine::classify(raw);
        metrics::counter!(metric_defs::SERIAL_LINES.name, "kind" => line.kind()).increment(1);

        match &line {
            SerialLine::AddressAnnouncement { address } => {
                info!(address = %address, "device announced address");
                self.device.set_address(address.clone());
            }
            SerialLine::MalformedPacket { reason } => {
                warn!(reason = %reason, line = raw.trim_end(), "malformed mesh frame");
                metrics::counter!(metric_defs::SERIAL_FRAME_ERRORS.name).increment(1);
            }
            SerialLine::Packet(packet) => {
                trace!(from = %packet.from, to = %packet.to, size = packet.size, "mesh packet");
            }
            SerialLine::Plain => {}
        }

        line.into_events(raw)
    }
}
