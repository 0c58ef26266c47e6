//! Agent connection and process attach shared by every command.

use std::sync::Arc;

use anyhow::{Result, bail};
use pcx_core::{Config, RemoteMemory, Session, ShutdownSignal};
use tracing::info;

/// Which process to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Pid(u32),
    Name(String),
    Unspecified,
}

impl Target {
    pub fn from_args(pid: Option<u32>, name: Option<String>) -> Self {
        match (pid, name) {
            (Some(pid), _) => Self::Pid(pid),
            (None, Some(name)) => Self::Name(name),
            (None, None) => Self::Unspecified,
        }
    }
}

/// Listen for the agent, wait for it to connect and attach to `target`.
///
/// Ctrl+C triggers the returned signal.
pub fn open_session(config: Config, target: &Target) -> Result<(Session, Arc<ShutdownSignal>)> {
    if *target == Target::Unspecified {
        bail!("No target process: pass --pid or --name");
    }

    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let memory = Arc::new(RemoteMemory::listen(&config)?);
    info!(
        "Waiting up to {}s for the agent on {}...",
        config.timeouts.connect_secs, config.server.listen
    );
    if !memory.wait_for_agent(config.timeouts.connect(), &shutdown) {
        bail!("Agent did not connect to {}", config.server.listen);
    }
    info!("Agent connected");

    let mut session = Session::new(memory, config);
    let process = match target {
        Target::Pid(pid) => session.attach_by_pid(*pid)?,
        Target::Name(name) => session.attach_by_name(name)?,
        Target::Unspecified => bail!("No target process: pass --pid or --name"),
    };
    info!(
        "Attached to pid {} ({} modules)",
        process.pid,
        session.catalogue().len()
    );

    Ok((session, shutdown))
}
