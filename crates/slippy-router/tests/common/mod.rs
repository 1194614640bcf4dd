//! Shared fixtures for the router integration tests: an in-memory serial
//! device and a router instance listening on loopback.

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use slippy_router::{
    spawn_serial_reader, Acceptor, ClientRegistry, CommandDispatcher, DeviceState,
    FrameClassifier, RouterConfig, SerialDevice, SerialHandles, SerialLink,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// How long a test waits for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

// ============================================================================
// In-memory serial device
// ============================================================================

/// Read side: chunks pushed by the test, with read timeouts when idle.
struct MemoryReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[derive(Clone, Default)]
struct MemoryWriter(Arc<Mutex<Vec<u8>>>);

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A serial device backed by a channel (device output) and a buffer
/// (everything the router wrote).
pub struct MemoryDevice {
    rx: Receiver<Vec<u8>>,
    written: MemoryWriter,
    opens: Arc<AtomicUsize>,
}

impl SerialDevice for MemoryDevice {
    fn open(&self) -> io::Result<SerialHandles> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(SerialHandles {
            reader: Box::new(MemoryReader {
                rx: self.rx.clone(),
                pending: Vec::new(),
            }),
            writer: Box::new(self.written.clone()),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// ============================================================================
// Router fixture
// ============================================================================

/// A running router wired to a [`MemoryDevice`].
pub struct TestRouter {
    pub addr: SocketAddr,
    pub registry: Arc<ClientRegistry>,
    pub device_state: Arc<DeviceState>,
    serial_tx: Sender<Vec<u8>>,
    written: MemoryWriter,
    opens: Arc<AtomicUsize>,
}

impl TestRouter {
    /// Start a router on an ephemeral loopback port.
    pub async fn start() -> TestRouter {
        let (serial_tx, rx) = crossbeam_channel::unbounded();
        let written = MemoryWriter::default();
        let opens = Arc::new(AtomicUsize::new(0));
        let device = MemoryDevice {
            rx,
            written: written.clone(),
            opens: Arc::clone(&opens),
        };

        let link = Arc::new(SerialLink::new(Box::new(device), Duration::from_millis(10)));
        link.open().expect("memory device opens");

        let device_state = Arc::new(DeviceState::new());
        let registry = Arc::new(ClientRegistry::new());
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&link),
            Arc::clone(&device_state),
        ));
        spawn_serial_reader(
            Arc::clone(&link),
            FrameClassifier::new(Arc::clone(&device_state)),
            Arc::clone(&registry),
        )
        .expect("reader thread spawns");

        let config = RouterConfig::default().with_listen("127.0.0.1:0".parse().unwrap());
        let acceptor = Acceptor::bind(&config, Arc::clone(&registry), dispatcher)
            .expect("loopback bind");
        let addr = acceptor.local_addr().unwrap();
        tokio::spawn(acceptor.run());

        TestRouter {
            addr,
            registry,
            device_state,
            serial_tx,
            written,
            opens,
        }
    }

    /// Make the device print `line`.
    pub fn device_prints(&self, line: &str) {
        self.device_prints_bytes(line.as_bytes());
    }

    /// Make the device emit raw bytes.
    pub fn device_prints_bytes(&self, bytes: &[u8]) {
        self.serial_tx.send(bytes.to_vec()).expect("reader alive");
    }

    /// Everything written to the device so far.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.0.lock()).into_owned()
    }

    /// How many times the device has been opened.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Wait until the device has received exactly `expected`.
    pub async fn wait_for_written(&self, expected: &str) {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        while self.written() != expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "device got {:?}, expected {:?}",
                self.written(),
                expected
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until exactly `n` clients are registered.
    pub async fn wait_for_clients(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        while self.registry.len() != n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} clients, have {}",
                n,
                self.registry.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Connect `n` clients and wait until all are registered.
    pub async fn connect_many(&self, n: usize) -> Vec<TestClient> {
        let mut clients = Vec::with_capacity(n);
        for _ in 0..n {
            clients.push(TestClient::connect(self.addr).await);
        }
        self.wait_for_clients(n).await;
        clients
    }
}

// ============================================================================
// Client
// ============================================================================

/// A line-oriented TCP client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> TestClient {
        let stream = TcpStream::connect(addr).await.expect("connect to router");
        let (read, write) = stream.into_split();
        TestClient {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    /// Send raw bytes, no framing added.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to router");
        self.writer.flush().await.expect("flush to router");
    }

    /// Send one request line.
    pub async fn send(&mut self, request: &Value) {
        let mut line = serde_json::to_vec(request).unwrap();
        line.push(b'\n');
        self.send_raw(&line).await;
    }

    /// Receive the next message.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let n = tokio::time::timeout(PATIENCE, self.reader.read_line(&mut line))
            .await
            .expect("message within timeout")
            .expect("read from router");
        assert!(n > 0, "router closed the connection");
        serde_json::from_str(&line).expect("router sends JSON lines")
    }

    /// Assert nothing arrives for `quiet`.
    pub async fn expect_silence(&mut self, quiet: Duration) {
        let mut line = String::new();
        if let Ok(result) = tokio::time::timeout(quiet, self.reader.read_line(&mut line)).await {
            panic!("unexpected message: {:?} ({:?})", line, result);
        }
    }
}
