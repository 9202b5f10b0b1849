//! RPC multiplexer
//!
//! Many concurrent request/response exchanges plus unsolicited messages over
//! one [`Session`](crate::transport::Session).
//!
//! - **Inner framing**: `uvarint(seq) | uvarint(len) | payload` ([`frame`])
//! - **Correlation**: [`PendingRequests`] maps sequence numbers to waiters
//! - **Loops**: one writer loop drains a FIFO [`Queue`]; one reader loop
//!   routes responses to waiters and everything else to [`Rpc::read`]
//!
//! Sequence number `0` marks an unsolicited message with no reply route.

pub mod frame;
mod pending;
mod queue;
#[allow(clippy::module_inception)]
mod rpc;
mod task;

pub use pending::{Delivery, PendingRequests};
pub use queue::Queue;
pub use rpc::{Responder, Rpc, RpcConfig, RpcState};
pub use task::LoopHandle;
