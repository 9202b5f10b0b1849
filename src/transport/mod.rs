//! Transport layer
//!
//! Raw stream transports plus the encrypted session that runs over them.
//!
//! - **Raw transports**: [`Transport`] and [`Listener`] traits, with
//!   [`TcpTransport`] and the in-process [`MemoryTransport`]
//! - **Addressing**: [`PeerAddr`], `<transport>:<address>@<hex key>`
//! - **Sessions**: [`Session`] runs the key exchange and seals frames
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Session Pool                 │
//! ├─────────────────────────────────────────┤
//! │            RPC multiplexer              │
//! ├─────────────────────────────────────────┤
//! │         Session (this module)           │
//! │   key exchange, AES-256-GCM frames      │
//! ├─────────────────────────────────────────┤
//! │         Raw stream (TCP, mem)           │
//! └─────────────────────────────────────────┘
//! ```

mod addr;
mod mem;
mod net;
mod session;
#[cfg(feature = "tcp")]
mod tcp;

pub use addr::PeerAddr;
pub use mem::{MemoryListener, MemoryTransport};
pub use net::{Listener, RawStream, Transport};
pub use session::{Session, SessionInfo, SessionReader, SessionWriter};
#[cfg(feature = "tcp")]
#[cfg_attr(docsrs, doc(cfg(feature = "tcp")))]
pub use tcp::{TcpSessionListener, TcpTransport};
