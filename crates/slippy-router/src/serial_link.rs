//! Serial Link Module
//!
//! Owns the connection to the mesh device. Reading and writing use separate
//! handles so the reader thread can block on the port while clients write
//! commands. Writes are serialized by the writer lock; a reset takes both
//! locks, so it waits for an in-flight write and for the reader's current
//! read timeout.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::SerialError;

// ============================================================================
// Devices
// ============================================================================

/// Independent read and write handles to one open device.
pub struct SerialHandles {
    /// Read side. Reads should time out periodically so a reset can proceed.
    pub reader: Box<dyn Read + Send>,
    /// Write side.
    pub writer: Box<dyn Write + Send>,
}

/// Something that can be opened as a serial link.
pub trait SerialDevice: Send + Sync {
    /// Open the device.
    fn open(&self) -> io::Result<SerialHandles>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// A physical serial port.
#[derive(Debug, Clone)]
pub struct SerialPortDevice {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub read_timeout: Duration,
}

impl SerialPortDevice {
    /// Create a device description.
    pub fn new(path: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        SerialPortDevice {
            path: path.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl SerialDevice for SerialPortDevice {
    fn open(&self) -> io::Result<SerialHandles> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(io::Error::other)?;
        let reader = port.try_clone().map_err(io::Error::other)?;

        Ok(SerialHandles {
            reader: Box::new(reader),
            writer: Box::new(port),
        })
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.path, self.baud_rate)
    }
}

// ============================================================================
// Link
// ============================================================================

struct LineReader {
    port: BufReader<Box<dyn Read + Send>>,
    /// Bytes of a line that was interrupted by a read timeout.
    pending: Vec<u8>,
}

/// The shared serial link.
pub struct SerialLink {
    device: Box<dyn SerialDevice>,
    reader: Mutex<Option<LineReader>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    /// Incremented on every successful open.
    generation: Mutex<u64>,
    reopened: Condvar,
    reset_delay: Duration,
}

impl SerialLink {
    /// Create a closed link for `device`.
    pub fn new(device: Box<dyn SerialDevice>, reset_delay: Duration) -> Self {
        SerialLink {
            device,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            generation: Mutex::new(0),
            reopened: Condvar::new(),
            reset_delay,
        }
    }

    /// Description of the underlying device.
    pub fn describe(&self) -> String {
        self.device.describe()
    }

    /// Whether the link currently holds open handles.
    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Number of successful opens so far.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Open the device. An already open link is reopened without delay.
    pub fn open(&self) -> Result<(), SerialError> {
        let mut writer = self.writer.lock();
        let mut reader = self.reader.lock();
        self.open_locked(&mut reader, &mut writer)
    }

    fn open_locked(
        &self,
        reader: &mut Option<LineReader>,
        writer: &mut Option<Box<dyn Write + Send>>,
    ) -> Result<(), SerialError> {
        *reader = None;
        *writer = None;

        let handles = self.device.open()?;
        *reader = Some(LineReader {
            port: BufReader::new(handles.reader),
            pending: Vec::new(),
        });
        *writer = Some(handles.writer);

        let mut generation = self.generation.lock();
        *generation += 1;
        self.reopened.notify_all();
        info!(device = %self.device.describe(), generation = *generation, "serial link open");
        Ok(())
    }

    /// Block until a complete line is read.
    ///
    /// The returned line keeps its terminator. Invalid UTF-8 is replaced.
    pub fn read_line(&self) -> Result<String, SerialError> {
        loop {
            let mut guard = self.reader.lock();
            let reader = guard.as_mut().ok_or(SerialError::Closed)?;

            match reader.port.read_until(b'\n', &mut reader.pending) {
                Ok(0) if reader.pending.is_empty() => return Err(SerialError::Disconnected),
                Ok(_) => {
                    let line = std::mem::take(&mut reader.pending);
                    return Ok(String::from_utf8_lossy(&line).into_owned());
                }
                Err(e) if is_retryable(&e) => {
                    // Let a waiting reset take the port before reading again.
                    MutexGuard::unlock_fair(guard);
                }
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
    }

    /// Write `data` and flush, as one uninterrupted unit.
    pub fn write(&self, data: &[u8]) -> Result<(), SerialError> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(SerialError::Closed)?;
        writer.write_all(data)?;
        writer.flush()?;
        debug!(bytes = data.len(), "serial write");
        Ok(())
    }

    /// Close the device, wait the reset delay, and reopen it.
    ///
    /// On failure the link stays closed until a later reset succeeds.
    pub fn reset(&self) -> Result<(), SerialError> {
        let mut writer = self.writer.lock();
        let mut reader = self.reader.lock();

        info!(device = %self.device.describe(), "resetting serial link");
        *reader = None;
        *writer = None;
        std::thread::sleep(self.reset_delay);

        self.open_locked(&mut reader, &mut writer).map_err(|e| {
            warn!(device = %self.device.describe(), error = %e, "serial reset failed, link closed");
            e
        })
    }

    /// Block until the link has been opened after generation `seen`.
    ///
    /// Returns the new generation.
    pub fn wait_for_reopen(&self, seen: u64) -> u64 {
        let mut generation = self.generation.lock();
        while *generation <= seen {
            self.reopened.wait(&mut generation);
        }
        *generation
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
