//! Scripted in-process agent for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use super::client::RpcClient;
use super::pending::{Dispatch, PendingTable};
use super::transport::Transport;
use crate::error::{Error, Result};

type Responder = Box<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Transport whose "agent" answers synchronously from a closure.
pub struct ScriptedAgent {
    responder: Responder,
    pending: Arc<PendingTable>,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Value>>,
}

impl ScriptedAgent {
    pub fn new(responder: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            pending: Arc::new(PendingTable::new()),
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// An agent that never answers on its own.
    pub fn silent() -> Arc<Self> {
        Self::new(|_| None)
    }

    pub fn client(self: &Arc<Self>) -> RpcClient {
        RpcClient::new(
            Arc::clone(self) as Arc<dyn Transport>,
            Arc::clone(&self.pending),
            Duration::from_secs(5),
        )
    }

    /// Deliver an inbound message as if the agent sent it.
    pub fn respond(&self, raw: &str) -> Dispatch {
        self.pending.dispatch(raw)
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_of(&self, kind: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl Transport for ScriptedAgent {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, message: String) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("send failed".to_string()));
        }

        let request: Value = serde_json::from_str(&message)?;
        self.sent.lock().unwrap().push(request.clone());
        if let Some(response) = (self.responder)(&request) {
            self.pending.dispatch(&response.to_string());
        }
        Ok(())
    }
}
