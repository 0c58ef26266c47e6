//! Duplex message channel to the memory agent.
//!
//! [`TcpTransport`] listens for the agent to connect and exchanges
//! newline-delimited JSON messages with it. All socket I/O happens on a
//! dedicated thread running a single-threaded tokio runtime; inbound
//! messages are handed to the message handler on that thread, so the
//! handler must not block.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Outbound half of the agent channel.
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Queue one message for delivery.
    fn send(&self, message: String) -> Result<()>;
}

/// Called on the I/O thread for every inbound message.
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

struct Connection {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    next_connection: AtomicU64,
    current: Mutex<Option<Connection>>,
}

impl Shared {
    fn open(&self, outbound: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut current) = self.current.lock() {
            if current.is_some() {
                info!("New agent connection replaces the previous one");
            }
            // Dropping the old sender ends the old connection's task
            *current = Some(Connection { id, outbound });
        }
        self.connected.store(true, Ordering::SeqCst);
        id
    }

    fn close(&self, id: u64) {
        if let Ok(mut current) = self.current.lock()
            && current.as_ref().is_some_and(|c| c.id == id)
        {
            *current = None;
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    fn close_all(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// TCP listener accepting one agent connection at a time.
pub struct TcpTransport {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Bind `addr` and start the I/O thread.
    pub fn start(addr: &str, handler: MessageHandler) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let shared = Arc::new(Shared::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("pcx-transport".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => serve(listener, thread_shared, handler, shutdown_rx).await,
                        Err(e) => error!("Failed to register listener: {}", e),
                    }
                });
            })?;

        info!("Listening for agent on {}", local_addr);

        Ok(Self {
            shared,
            local_addr,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop the live connection and join the I/O thread.
    pub fn stop(&self) {
        let sender = self.shutdown.lock().ok().and_then(|mut s| s.take());
        if let Some(sender) = sender {
            info!("Stopping transport");
            let _ = sender.send(());
        }

        let handle = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Transport thread panicked");
        }
    }
}

impl Transport for TcpTransport {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn send(&self, message: String) -> Result<()> {
        let current = self
            .shared
            .current
            .lock()
            .map_err(|_| Error::Transport("connection lock poisoned".to_string()))?;
        let connection = current.as_ref().ok_or(Error::NotConnected)?;
        connection
            .outbound
            .send(message)
            .map_err(|_| Error::Transport("connection closed".to_string()))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    listener: TcpListener,
    shared: Arc<Shared>,
    handler: MessageHandler,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Agent connected from {}", peer);
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = shared.open(tx);
                    tokio::spawn(run_connection(
                        stream,
                        id,
                        rx,
                        Arc::clone(&shared),
                        Arc::clone(&handler),
                    ));
                }
                Err(e) => warn!("Failed to accept agent connection: {}", e),
            },
        }
    }

    shared.close_all();
}

async fn run_connection(
    stream: TcpStream,
    id: u64,
    mut outbound: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
    handler: MessageHandler,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        handler(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Agent read failed: {}", e);
                    break;
                }
            },
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = write_line(&mut writer, &message).await {
                        warn!("Agent write failed: {}", e);
                        break;
                    }
                    debug!("Sent message ({} bytes)", message.len());
                }
                None => break,
            },
        }
    }

    shared.close(id);
    info!("Agent disconnected");
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
