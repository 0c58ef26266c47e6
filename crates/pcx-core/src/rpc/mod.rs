//! Request/response layer over the agent transport.

mod client;
#[cfg(test)]
pub mod mock;
mod pending;
mod protocol;
mod transport;

pub use client::RpcClient;
pub use pending::{Dispatch, PendingRequest, PendingTable, ResponseHandler};
pub use protocol::{Envelope, Request, RequestKind, Response};
pub use transport::{MessageHandler, TcpTransport, Transport};
