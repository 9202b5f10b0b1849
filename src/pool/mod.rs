//! Session pool
//!
//! Owns the RPC sessions of one node, keyed by remote public key:
//!
//! - **Dial**: reuse a live cached session or open one and run the initiator
//!   handshake, one handshake per peer at a time
//! - **Accept**: run the responder handshake per inbound connection; a new
//!   session from a known key replaces the cached one
//! - **Cache**: LRU, closing whatever it evicts
//! - **Dispatch**: one task per session decodes inbound [`Message`]s and
//!   spawns the handler registered for their type
//!
//! [`Message`]: crate::core::Message

mod config;
mod handler;
#[allow(clippy::module_inception)]
mod pool;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use handler::{Handler, HandlerRegistry, InboundRequest};
pub use pool::SessionPool;
