//! The serial reader thread.
//!
//! A single thread reads the device line by line and broadcasts each line's
//! events before reading the next, which keeps delivery order identical to
//! read order for every client.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use crate::classifier::FrameClassifier;
use crate::registry::ClientRegistry;
use crate::serial_link::SerialLink;

/// Start the reader on a thread named `serial-reader`.
///
/// The thread runs for the life of the process. When the link fails it waits
/// for a successful `serial::reset` and then resumes reading.
pub fn spawn_serial_reader(
    link: Arc<SerialLink>,
    classifier: FrameClassifier,
    registry: Arc<ClientRegistry>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || run(&link, &classifier, &registry))
}

fn run(link: &SerialLink, classifier: &FrameClassifier, registry: &ClientRegistry) {
    info!(device = %link.describe(), "serial reader started");
    loop {
        let generation = link.generation();
        match link.read_line() {
            Ok(raw) => {
                let events = classifier.classify(&raw);
                let delivered = registry.broadcast(&events);
                debug!(events = events.len(), clients = delivered, "serial line broadcast");
            }
            Err(e) => {
                error!(device = %link.describe(), error = %e, "serial read failed, waiting for reset");
                let generation = link.wait_for_reopen(generation);
                info!(generation, "serial reader resumed");
            }
        }
    }
}
