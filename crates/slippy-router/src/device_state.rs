//! What the router knows about the attached device.

use parking_lot::RwLock;

/// Address reported before the device has announced itself.
pub const UNKNOWN_ADDRESS: &str = "0x00000000";

/// The device's self-announced mesh address.
///
/// Written by the serial reader on each boot banner, read by any client
/// handling `slippy::get_info`.
#[derive(Debug)]
pub struct DeviceState {
    address: RwLock<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Create a state holding [`UNKNOWN_ADDRESS`].
    pub fn new() -> Self {
        DeviceState {
            address: RwLock::new(UNKNOWN_ADDRESS.to_string()),
        }
    }

    /// Record the address from a boot banner. Last write wins.
    pub fn set_address(&self, address: impl Into<String>) {
        *self.address.write() = address.into();
    }

    /// The current address, or [`UNKNOWN_ADDRESS`].
    pub fn address(&self) -> String {
        self.address.read().clone()
    }

    /// Whether a boot banner has been seen.
    pub fn is_known(&self) -> bool {
        *self.address.read() != UNKNOWN_ADDRESS
    }
}
