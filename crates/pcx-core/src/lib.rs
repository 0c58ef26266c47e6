//! # pcx-core
//!
//! Core library for reconstructing structures in a remote process.
//!
//! This crate provides:
//! - Request/response RPC over the agent transport
//! - Remote memory reads with a short-lived read cache
//! - A background loop keeping region snapshots fresh
//! - The typed field layout model (type changes, offset locks, export)
//! - Pointer classification and MSVC RTTI resolution
//! - Pattern detection, compilation and scanning

pub mod address;
pub mod config;
pub mod error;
pub mod layout;
pub mod memory;
pub mod pattern;
pub mod pointer;
pub mod rpc;
pub mod session;
pub mod sync;

pub use address::parse_address;
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use layout::{Field, FieldKind, FieldValue, Region};
pub use memory::{
    ExportMap, Module, ModuleCatalogue, PointerWidth, ProcessInfo, QueryMemory, ReadMemory,
    RemoteMemory, Section,
};
pub use pattern::{CompiledPattern, PatternInfo, PatternKind};
pub use pointer::{PointerDescription, PointerInfo, classify, describe_pointer, resolve_rtti};
pub use rpc::{RpcClient, TcpTransport, Transport};
pub use session::Session;
pub use sync::{ShutdownSignal, SnapshotCache, SyncLoop, SyncTargets};
