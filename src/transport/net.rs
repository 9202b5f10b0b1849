//! Raw stream transports.
//!
//! A transport hands the session layer a reliable, ordered byte stream. It
//! knows nothing about keys or framing.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream usable by [`Session`](super::Session).
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Dials and listens for raw connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stream type produced by dial and accept.
    type Stream: RawStream;

    /// Listener type returned by [`Transport::listen`].
    type Listener: Listener<Stream = Self::Stream>;

    /// Transport name carried in peer addresses.
    fn name(&self) -> &str;

    /// Open a connection to `address`.
    async fn dial(&self, address: &str) -> io::Result<Self::Stream>;

    /// Bind a listener on `bind_addr`.
    async fn listen(&self, bind_addr: &str) -> io::Result<Self::Listener>;
}

/// Accepts inbound raw connections.
#[async_trait]
pub trait Listener: Send + 'static {
    /// Stream type produced by accept.
    type Stream: RawStream;

    /// Wait for the next connection, returning it with the remote address.
    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;

    /// Address the listener is bound to, in the transport's own format.
    fn local_addr(&self) -> io::Result<String>;
}
