//! Client Registry Module
//!
//! Tracks connected clients and fans serial traffic out to them. Each client
//! has a bounded outbox drained by its own connection task, so a broadcast
//! never waits on a socket: it snapshots the member set under the lock, then
//! queues the encoded batch to every outbox outside it. A client whose outbox
//! is closed or full is removed; dropping its sender ends the connection task.
//! Replies to a client's own requests do not pass through the registry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use slippy_metrics::metric_defs;
use slippy_protocol::{encode_batch, Event};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

/// Identifier assigned to each connection.
pub type ClientId = u64;

struct ClientEntry {
    peer: SocketAddr,
    outbox: mpsc::Sender<Bytes>,
}

/// Returned by [`ClientRegistry::register`].
#[derive(Debug)]
pub struct Registration {
    /// The new client's id.
    pub id: ClientId,
    /// Receiving end of the client's outbox. Each item is one or more
    /// complete `\n`-terminated lines.
    pub outbox: mpsc::Receiver<Bytes>,
}

/// Thread-safe set of connected clients.
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        ClientRegistry {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a client with an outbox of `queue_depth` batches.
    pub fn register(&self, peer: SocketAddr, queue_depth: usize) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(queue_depth.max(1));

        let count = {
            let mut clients = self.clients.lock();
            clients.insert(id, ClientEntry { peer, outbox: tx });
            clients.len()
        };
        metrics::gauge!(metric_defs::CLIENTS_CONNECTED.name).set(count as f64);
        debug!(client = id, %peer, "client registered");

        Registration { id, outbox: rx }
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn unregister(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.lock();
            let removed = clients.remove(&id);
            (removed, clients.len())
        };

        match removed {
            Some(entry) => {
                metrics::gauge!(metric_defs::CLIENTS_CONNECTED.name).set(count as f64);
                debug!(client = id, peer = %entry.peer, "client unregistered");
                true
            }
            None => false,
        }
    }

    /// Deliver `events`, in order and as one unit, to every current client.
    ///
    /// Returns the number of clients the batch was queued to.
    pub fn broadcast(&self, events: &[Event]) -> usize {
        match encode_batch(events) {
            Ok(batch) => self.broadcast_bytes(Bytes::from(batch)),
            Err(e) => {
                error!(error = %e, "failed to encode broadcast");
                0
            }
        }
    }

    /// Deliver pre-encoded lines to every current client.
    pub fn broadcast_bytes(&self, batch: Bytes) -> usize {
        let snapshot: Vec<(ClientId, mpsc::Sender<Bytes>)> = {
            let clients = self.clients.lock();
            clients
                .iter()
                .map(|(id, entry)| (*id, entry.outbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, outbox) in snapshot {
            if self.queue(id, &outbox, batch.clone()) {
                delivered += 1;
            } else {
                failed.push(id);
            }
        }

        for id in failed {
            if self.unregister(id) {
                metrics::counter!(metric_defs::CLIENTS_DROPPED.name).increment(1);
            }
        }
        metrics::counter!(metric_defs::BROADCAST_DELIVERIES.name).increment(delivered as u64);
        delivered
    }

    fn queue(&self, id: ClientId, outbox: &mpsc::Sender<Bytes>, batch: Bytes) -> bool {
        match outbox.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = id, "client outbox full, disconnecting slow client");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = id, "client outbox closed");
                false
            }
        }
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Whether no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Registered clients and their peer addresses, ordered by id.
    pub fn peers(&self) -> Vec<(ClientId, SocketAddr)> {
        let mut peers: Vec<_> = self
            .clients
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.peer))
            .collect();
        peers.sort_unstable_by_key(|(id, _)| *id);
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn events() -> Vec<Event> {
        vec![
            Event::SerialRecive {
                data: "first\n".into(),
            },
            Event::DeviceInfo {
                address: "0x1".into(),
            },
        ]
    }

    fn lines(batch: &Bytes) -> Vec<String> {
        String::from_utf8(batch.to_vec())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = ClientRegistry::new();
        let a = registry.register(peer(1), 8);
        let b = registry.register(peer(2), 8);
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.peers(), vec![(a.id, peer(1)), (b.id, peer(2))]);

        assert!(registry.unregister(a.id));
        assert!(!registry.unregister(a.id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_everyone_as_one_batch() {
        let registry = ClientRegistry::new();
        let mut a = registry.register(peer(1), 8);
        let mut b = registry.register(peer(2), 8);

        assert_eq!(registry.broadcast(&events()), 2);

        for reg in [&mut a, &mut b] {
            let batch = reg.outbox.try_recv().unwrap();
            let lines = lines(&batch);
            assert_eq!(lines.len(), 2);
            assert!(lines[0].contains("serial::recive"));
            assert!(lines[1].contains("slippy::get_info"));
            assert!(reg.outbox.try_recv().is_err());
        }
    }

    #[test]
    fn test_late_registration_misses_earlier_broadcast() {
        let registry = ClientRegistry::new();
        registry.broadcast(&events());

        let mut late = registry.register(peer(1), 8);
        assert!(late.outbox.try_recv().is_err());
    }

    #[test]
    fn test_closed_client_is_removed_others_still_served() {
        let registry = ClientRegistry::new();
        let gone = registry.register(peer(1), 8);
        let mut alive = registry.register(peer(2), 8);
        drop(gone.outbox);

        assert_eq!(registry.broadcast(&events()), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.peers()[0].0, alive.id);
        assert!(alive.outbox.try_recv().is_ok());
    }

    #[test]
    fn test_full_outbox_drops_slow_client() {
        let registry = ClientRegistry::new();
        let mut slow = registry.register(peer(1), 1);

        assert_eq!(registry.broadcast(&events()), 1);
        assert_eq!(registry.broadcast(&events()), 0);
        assert!(registry.is_empty());

        // The queued batch is still readable, then the channel reports closed.
        assert!(slow.outbox.try_recv().is_ok());
        assert!(matches!(
            slow.outbox.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_concurrent_membership_changes() {
        let registry = Arc::new(ClientRegistry::new());
        let workers: Vec<_> = (0..4u16)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100u16 {
                        // Deep enough for every broadcast all four threads make.
                        let reg = registry.register(peer(t * 1000 + i), 512);
                        registry.broadcast(&events());
                        assert!(registry.unregister(reg.id));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
