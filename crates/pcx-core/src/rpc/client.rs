use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, warn};

use super::pending::{PendingRequest, PendingTable, ResponseHandler};
use super::protocol::{Request, Response};
use super::transport::{MessageHandler, TcpTransport, Transport};
use crate::error::{Error, Result};

/// Request/response multiplexer over a [`Transport`].
///
/// Ids are decimal strings from a counter starting at 1. The entry for a
/// request is registered before the message is handed to the transport.
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingTable>,
    next_id: AtomicU64,
    stale_after: Duration,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, pending: Arc<PendingTable>, stale_after: Duration) -> Self {
        Self {
            transport,
            pending,
            next_id: AtomicU64::new(1),
            stale_after,
        }
    }

    /// Listen on `addr` for the agent and route its responses to this client.
    pub fn listen(addr: &str, stale_after: Duration) -> Result<Self> {
        let pending = Arc::new(PendingTable::new());
        let table = Arc::clone(&pending);
        let handler: MessageHandler = Arc::new(move |raw: &str| {
            table.dispatch(raw);
        });
        let transport = TcpTransport::start(addr, handler)?;
        Ok(Self::new(Arc::new(transport), pending, stale_after))
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Send a request and register `on_complete` for its response.
    ///
    /// Returns the request id. On send failure nothing stays registered.
    pub fn send_request(&self, request: &Request, on_complete: ResponseHandler) -> Result<String> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.next_request_id();
        let message = request.encode(&id)?;
        self.pending
            .register(PendingRequest::new(id.clone(), request.kind(), on_complete));

        if let Err(e) = self.transport.send(message) {
            warn!("Failed to send {} request {}: {}", request.kind(), id, e);
            self.pending.remove(&id);
            return Err(e);
        }

        debug!("Sent {} request {}", request.kind(), id);
        Ok(id)
    }

    /// Send a request and block up to `timeout` for a successful response.
    ///
    /// A response arriving after the timeout lands in a dropped channel
    /// and is discarded.
    pub fn call(&self, request: &Request, timeout: Duration) -> Result<Response> {
        let (tx, rx) = mpsc::sync_channel::<String>(1);
        let id = self.send_request(
            request,
            Box::new(move |raw: &str| {
                let _ = tx.try_send(raw.to_string());
            }),
        )?;

        let kind = request.kind();
        match rx.recv_timeout(timeout) {
            Ok(raw) => Response::parse(&raw, kind),
            Err(RecvTimeoutError::Timeout) => {
                debug!("{} request {} timed out after {:?}", kind, id, timeout);
                Err(Error::Timeout {
                    kind: kind.as_str(),
                    millis: timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Transport(format!(
                "request {} was discarded before completion",
                id
            ))),
        }
    }

    /// Drop pending requests older than the staleness limit.
    ///
    /// Not self-scheduling; the owner's loop calls this periodically.
    pub fn cleanup_stale(&self) -> usize {
        self.pending.cleanup_stale(self.stale_after)
    }
}
