//! TCP Server Module
//!
//! Accepts client connections and runs one task per client. The task owns the
//! socket: it re-frames incoming bytes into request lines for the
//! [`CommandDispatcher`], writes each reply straight back, and writes the
//! broadcast traffic that arrives in the client's outbox.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use slippy_metrics::metric_defs;
use slippy_protocol::LineCodec;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{DispatchError, RouterError};
use crate::registry::{ClientId, ClientRegistry, Registration};

/// Size of a single socket read.
const READ_CHUNK: usize = 2048;

/// Accepts clients and hands each one to its own connection task.
pub struct Acceptor {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    queue_depth: usize,
}

impl Acceptor {
    /// Bind the listening socket described by `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        config: &RouterConfig,
        registry: Arc<ClientRegistry>,
        dispatcher: Arc<CommandDispatcher>,
    ) -> Result<Acceptor, RouterError> {
        let addr = config.listen;
        let listener = listen(addr, config.backlog)
            .map_err(|source| RouterError::Bind { addr, source })?;

        Ok(Acceptor {
            listener,
            registry,
            dispatcher,
            queue_depth: config.client_queue_depth,
        })
    }

    /// The address actually bound (useful when listening on port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accept clients until `shutdown` completes.
    ///
    /// Connection tasks already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("acceptor shutting down");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let registry = Arc::clone(&self.registry);
        let dispatcher = Arc::clone(&self.dispatcher);
        let Registration { id, outbox } = registry.register(peer, self.queue_depth);
        info!(client = id, %peer, "client connected");

        tokio::spawn(async move {
            let mut connection = Connection {
                id,
                dispatcher: &dispatcher,
                codec: LineCodec::new(),
            };
            let result = connection.serve(stream, outbox).await;
            registry.unregister(id);

            match result {
                Ok(()) => info!(client = id, %peer, "client disconnected"),
                Err(e) => info!(client = id, %peer, error = %e, "client connection closed"),
            }
        });
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

struct Connection<'a> {
    id: ClientId,
    dispatcher: &'a CommandDispatcher,
    codec: LineCodec,
}

impl Connection<'_> {
    /// Run until the peer closes, the socket fails, or the registry drops us.
    async fn serve(&mut self, mut stream: TcpStream, mut outbox: mpsc::Receiver<Bytes>) -> io::Result<()> {
        let (mut reader, mut writer) = stream.split();
        let mut read_buf = [0u8; READ_CHUNK];

        loop {
            tokio::select! {
                result = reader.read(&mut read_buf) => {
                    let n = result?;
                    if n == 0 {
                        return Ok(());
                    }
                    self.handle_bytes(&read_buf[..n], &mut writer).await?;
                }

                batch = outbox.recv() => match batch {
                    Some(batch) => {
                        writer.write_all(&batch).await?;
                        writer.flush().await?;
                    }
                    None => {
                        debug!(client = self.id, "removed from registry");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Dispatch every complete line in `data`, writing replies as they come.
    async fn handle_bytes<W>(&mut self, data: &[u8], writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if let Err(e) = self.codec.push(data) {
            self.reject(&e.into());
        }

        while let Some(line) = self.codec.decode_line() {
            let result = match line {
                Ok(line) => self.dispatcher.dispatch(&line).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(Some(reply)) => match reply.encode_line() {
                    Ok(encoded) => {
                        writer.write_all(&encoded).await?;
                        writer.flush().await?;
                    }
                    Err(e) => warn!(client = self.id, error = %e, "failed to encode reply"),
                },
                Ok(None) => {}
                Err(e) => self.reject(&e),
            }
        }
        Ok(())
    }

    fn reject(&self, error: &DispatchError) {
        metrics::counter!(metric_defs::REQUESTS_REJECTED.name, "reason" => error.kind()).increment(1);
        warn!(client = self.id, error = %error, "request rejected");
    }
}
