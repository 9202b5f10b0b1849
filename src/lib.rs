//! # peerwire
//!
//! Encrypted, multiplexed peer-to-peer sessions over any reliable byte
//! stream.
//!
//! - **Security**: X25519 key agreement from Ed25519 identities, AES-256-GCM
//!   frames
//! - **Multiplexing**: many concurrent requests plus unsolicited messages
//!   over one connection, correlated by sequence number
//! - **Pooling**: an LRU cache of sessions keyed by public key, with
//!   single-flight dialing and per-message-type handler dispatch
//!
//! ## Feature Flags
//!
//! - `tcp` (default): [`TcpTransport`](transport::TcpTransport)
//!
//! ## Modules
//!
//! - [`core`]: constants, error types, the [`Codec`](core::Codec) trait and
//!   the [`Message`](core::Message) envelope
//! - [`crypto`]: identity keys, key agreement, the frame cipher
//! - [`transport`]: raw transports, peer addresses, encrypted sessions
//! - [`rpc`]: the request/response multiplexer
//! - [`pool`]: the session pool
//!
//! ## Example Usage
//!
//! ```rust
//! use peerwire::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MemoryTransport::new();
//!
//! let server = SessionPool::new(PoolConfig::default(), Keypair::generate(), transport.clone());
//! server.register_handler("test/ping", |request: InboundRequest| async move {
//!     request.reply("pong").await?;
//!     Ok::<(), HandlerError>(())
//! });
//! let addr = server.listen("").await?;
//!
//! let client = SessionPool::new(PoolConfig::default(), Keypair::generate(), transport);
//! let reply = client.request(&addr, &Message::new("test/ping", "ping")).await?;
//! assert_eq!(reply.body(), b"pong");
//!
//! client.close().await;
//! server.close().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod crypto;
pub mod pool;
pub mod rpc;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        CborCodec, Codec, CodecError, Error, HandlerError, HandshakeError, Message, PoolError,
        RpcError, SessionError,
    };
    pub use crate::crypto::{Keypair, PublicKey};
    pub use crate::pool::{Handler, InboundRequest, PoolConfig, PoolConfigBuilder, SessionPool};
    pub use crate::rpc::{Responder, Rpc, RpcConfig, RpcState};
    #[cfg(feature = "tcp")]
    pub use crate::transport::TcpTransport;
    pub use crate::transport::{MemoryTransport, PeerAddr, Session, Transport};
}

// Re-export commonly used items at crate root
pub use crate::core::{Error, Message};
pub use crate::crypto::{Keypair, PublicKey};
pub use crate::pool::{PoolConfig, SessionPool};
pub use crate::rpc::Rpc;
pub use crate::transport::PeerAddr;
