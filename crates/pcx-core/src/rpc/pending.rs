use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::protocol::{Envelope, RequestKind};

/// Completion handler invoked with the raw response text.
pub type ResponseHandler = Box<dyn FnOnce(&str) + Send>;

/// An outstanding request waiting for its response.
pub struct PendingRequest {
    pub id: String,
    pub kind: RequestKind,
    pub issued_at: Instant,
    on_complete: ResponseHandler,
}

impl PendingRequest {
    pub fn new(id: String, kind: RequestKind, on_complete: ResponseHandler) -> Self {
        Self {
            id,
            kind,
            issued_at: Instant::now(),
            on_complete,
        }
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Matched a pending request; its handler ran.
    Completed(RequestKind),
    /// Carried an id nobody is waiting for (late or duplicate).
    Unknown(String),
    /// No `request_id`; not a response.
    Unsolicited,
    /// Not parseable as a JSON object.
    Invalid,
}

/// Pending-request table keyed by request id.
///
/// The lock is held only for single map operations; handlers run after
/// their entry has been removed and the lock released.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request: PendingRequest) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(request.id.clone(), request);
        }
    }

    pub fn remove(&self, id: &str) -> Option<PendingRequest> {
        self.entries.lock().ok()?.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route an inbound message to the handler registered for its id.
    pub fn dispatch(&self, raw: &str) -> Dispatch {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Discarding unparseable message: {}", e);
                return Dispatch::Invalid;
            }
        };

        let Some(id) = envelope.request_id() else {
            debug!("Received message without request_id");
            return Dispatch::Unsolicited;
        };

        match self.remove(&id) {
            Some(request) => {
                debug!(
                    "Completing {} request {} after {:?}",
                    request.kind,
                    id,
                    request.issued_at.elapsed()
                );
                (request.on_complete)(raw);
                Dispatch::Completed(request.kind)
            }
            None => {
                warn!("Received response for unknown request ID: {}", id);
                Dispatch::Unknown(id)
            }
        }
    }

    /// Drop requests older than `max_age` without invoking their handlers.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        self.cleanup_stale_at(Instant::now(), max_age)
    }

    pub fn cleanup_stale_at(&self, now: Instant, max_age: Duration) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|id, request| {
            let stale = now.saturating_duration_since(request.issued_at) > max_age;
            if stale {
                warn!("Removing stale {} request {}", request.kind, id);
            }
            !stale
        });
        before - entries.len()
    }
}
