//! Remote memory access through the agent.
//!
//! Each operation is a single request with a bounded wait. Failures are
//! logged where they happen and returned as values; nothing here panics
//! on remote data.

use std::sync::RwLock;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, TimeoutConfig};
use crate::error::{Error, Result};
use crate::memory::{
    MemoryState, MemoryType, Module, PointerWidth, QueryMemory, ReadCache, ReadMemory, RegionInfo,
    parse_module_list,
};
use crate::rpc::{Request, RequestKind, Response, RpcClient};
use crate::sync::ShutdownSignal;

/// The process the agent is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub base_address: u64,
    pub peb: u64,
    pub is_x32: bool,
}

impl ProcessInfo {
    pub fn pointer_width(&self) -> PointerWidth {
        PointerWidth::from_is_x32(self.is_x32)
    }
}

pub struct RemoteMemory {
    rpc: RpcClient,
    cache: ReadCache,
    timeouts: TimeoutConfig,
    process: RwLock<Option<ProcessInfo>>,
}

impl RemoteMemory {
    pub fn new(rpc: RpcClient, config: &Config) -> Self {
        Self {
            rpc,
            cache: ReadCache::new(config.read_ttl()),
            timeouts: config.timeouts.clone(),
            process: RwLock::new(None),
        }
    }

    /// Start listening for the agent on the configured address.
    pub fn listen(config: &Config) -> Result<Self> {
        let rpc = RpcClient::listen(&config.server.listen, config.timeouts.stale_request())?;
        Ok(Self::new(rpc, config))
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }

    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }

    /// Block until the agent connects, `timeout` passes or shutdown is signaled.
    pub fn wait_for_agent(&self, timeout: Duration, shutdown: &ShutdownSignal) -> bool {
        shutdown.wait_until(timeout, Duration::from_millis(50), || self.is_connected())
    }

    pub fn process(&self) -> Option<ProcessInfo> {
        self.process.read().ok().and_then(|p| *p)
    }

    pub fn is_attached(&self) -> bool {
        self.process().is_some()
    }

    /// Drop stale pending requests and expired cached reads. Returns the
    /// number of stale requests.
    pub fn cleanup_stale(&self) -> usize {
        self.cache.purge_expired();
        self.rpc.cleanup_stale()
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.rpc.is_connected() {
            return Err(Error::NotConnected);
        }
        if !self.is_attached() {
            return Err(Error::NoProcess);
        }
        Ok(())
    }

    /// Read `size` bytes, served from the read cache when fresh.
    pub fn read(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_with(address, size, self.timeouts.read(), true)
    }

    /// Span reads (module images, export tables) bypass the cache.
    fn read_with(&self, address: u64, size: usize, timeout: Duration, cache: bool) -> Result<Vec<u8>> {
        self.ensure_ready()?;

        if cache && let Some(bytes) = self.cache.get(address, size) {
            return Ok(bytes);
        }

        let request = Request::new(RequestKind::ReadMemory)
            .decimal("address", address)
            .decimal("size", size as u64);
        let response = self.rpc.call(&request, timeout).inspect_err(|e| {
            debug!("Read of {} bytes at {:#x} failed: {}", size, address, e);
        })?;

        let mut bytes = hex::decode(response.str("data")?.trim()).map_err(|e| {
            Error::MalformedResponse {
                kind: RequestKind::ReadMemory.as_str(),
                message: format!("data is not hex: {}", e),
            }
        })?;
        if bytes.len() < size {
            warn!(
                "Read at {:#x} returned {} of {} bytes",
                address,
                bytes.len(),
                size
            );
            return Err(Error::MalformedResponse {
                kind: RequestKind::ReadMemory.as_str(),
                message: format!("expected {} bytes, got {}", size, bytes.len()),
            });
        }

        if cache {
            self.cache.insert(address, bytes.clone());
        }
        bytes.truncate(size);
        Ok(bytes)
    }

    /// Write bytes into the target.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<()> {
        self.ensure_ready()?;

        let request = Request::new(RequestKind::WriteMemory)
            .decimal("address", address)
            .field("data", hex::encode_upper(data));
        self.rpc
            .call(&request, self.timeouts.write())
            .inspect_err(|e| warn!("Write of {} bytes at {:#x} failed: {}", data.len(), address, e))?;

        self.cache.invalidate(address);
        Ok(())
    }

    /// Ask the agent for the first match of an IDA-style signature.
    pub fn find_pattern(&self, start: u64, size: u64, signature: &str) -> Result<Option<u64>> {
        self.ensure_ready()?;

        let request = Request::new(RequestKind::FindPattern)
            .decimal("start", start)
            .decimal("size", size)
            .field("pattern", signature);
        let response = match self.rpc.call(&request, self.timeouts.scan()) {
            Ok(response) => response,
            Err(Error::Remote { message, .. }) => {
                debug!("Pattern not found: {}", message);
                return Ok(None);
            }
            Err(e) => {
                warn!("Pattern scan failed: {}", e);
                return Err(e);
            }
        };

        let address = response.hex("address")?;
        Ok((address != 0).then_some(address))
    }

    /// List the modules loaded in the attached process.
    pub fn get_modules(&self) -> Result<Vec<Module>> {
        self.ensure_ready()?;

        let response = self
            .rpc
            .call(&Request::new(RequestKind::GetModules), self.timeouts.control())
            .inspect_err(|e| warn!("Module list request failed: {}", e))?;

        let modules = parse_module_list(response.str("modules")?);
        if let Ok(count) = response.decimal("count")
            && count as usize != modules.len()
        {
            debug!("Agent reported {} modules, parsed {}", count, modules.len());
        }
        info!("Loaded {} modules", modules.len());
        Ok(modules)
    }

    pub fn attach_by_pid(&self, pid: u32) -> Result<ProcessInfo> {
        self.attach(Request::new(RequestKind::RefProcess).field("pid", pid))
    }

    pub fn attach_by_name(&self, name: &str) -> Result<ProcessInfo> {
        self.attach(Request::new(RequestKind::RefProcess).field("process_name", name))
    }

    fn attach(&self, request: Request) -> Result<ProcessInfo> {
        if !self.rpc.is_connected() {
            return Err(Error::NotConnected);
        }

        let response = self
            .rpc
            .call(&request, self.timeouts.control())
            .inspect_err(|e| warn!("Attach failed: {}", e))?;
        let process = parse_process(&response)?;

        if let Ok(mut current) = self.process.write() {
            *current = Some(process);
        }
        self.cache.clear();

        info!(
            "Attached to pid {} (base: {:#x}, peb: {:#x}, {})",
            process.pid,
            process.base_address,
            process.peb,
            if process.is_x32 { "x86" } else { "x64" }
        );
        Ok(process)
    }

    /// Forget the attached process and everything cached for it.
    pub fn detach(&self) {
        if let Ok(mut current) = self.process.write()
            && let Some(process) = current.take()
        {
            info!("Detached from pid {}", process.pid);
        }
        self.cache.clear();
    }

    /// Whether the attached process still answers a read at its base.
    pub fn is_process_alive(&self) -> bool {
        match self.process() {
            Some(process) => self
                .rpc
                .call(
                    &Request::new(RequestKind::ReadMemory)
                        .decimal("address", process.base_address)
                        .decimal("size", 1),
                    self.timeouts.read(),
                )
                .is_ok(),
            None => false,
        }
    }

    /// Poll [`Self::is_process_alive`] with a short back-off between attempts.
    pub fn check_alive(&self, attempts: u32) -> bool {
        (0..attempts).any(|attempt| {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(50));
            }
            self.is_process_alive()
        })
    }
}

fn parse_process(response: &Response) -> Result<ProcessInfo> {
    let pid = response.decimal("pid")?;
    Ok(ProcessInfo {
        pid: u32::try_from(pid).map_err(|_| Error::MalformedResponse {
            kind: RequestKind::RefProcess.as_str(),
            message: format!("pid {} out of range", pid),
        })?,
        base_address: response.hex("base_address")?,
        peb: response.hex("peb").unwrap_or(0),
        is_x32: response.flag("is_x32").unwrap_or(false),
    })
}

impl ReadMemory for RemoteMemory {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read(address, size)
    }

    fn read_span(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.read_with(address, size, self.timeouts.scan(), false)
    }
}

impl QueryMemory for RemoteMemory {
    fn query_region(&self, address: u64) -> Result<RegionInfo> {
        self.ensure_ready()?;

        let request = Request::new(RequestKind::QueryMemory).decimal("address", address);
        let response = self.rpc.call(&request, self.timeouts.read())?;

        let malformed = |field: &str| Error::MalformedResponse {
            kind: RequestKind::QueryMemory.as_str(),
            message: format!("unknown {} value", field),
        };
        let state: MemoryState = response.str("state")?.parse().map_err(|_| malformed("state"))?;
        let kind: MemoryType = response.str("type")?.parse().map_err(|_| malformed("type"))?;

        Ok(RegionInfo {
            state,
            kind,
            protect: response.hex("protect").unwrap_or(0) as u32,
        })
    }
}
