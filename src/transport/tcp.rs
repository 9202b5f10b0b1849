//! TCP transport over tokio sockets.

use std::io;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use crate::core::TCP_TRANSPORT_NAME;

use super::net::{Listener, Transport};

/// Plain TCP transport. Confidentiality comes from the session layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport {
    nodelay: bool,
}

impl TcpTransport {
    /// Create a TCP transport with Nagle's algorithm left on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `TCP_NODELAY` on every stream.
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Listener = TcpSessionListener;

    fn name(&self) -> &str {
        TCP_TRANSPORT_NAME
    }

    async fn dial(&self, address: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }

    async fn listen(&self, bind_addr: &str) -> io::Result<TcpSessionListener> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(TcpSessionListener {
            listener,
            nodelay: self.nodelay,
        })
    }
}

/// Listener half of [`TcpTransport`].
#[derive(Debug)]
pub struct TcpSessionListener {
    listener: TcpListener,
    nodelay: bool,
}

#[async_trait]
impl Listener for TcpSessionListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, remote) = self.listener.accept().await?;
        stream.set_nodelay(self.nodelay)?;
        Ok((stream, remote.to_string()))
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(self.listener.local_addr()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_listen_ephemeral_port() {
        let listener = TcpTransport::new().listen("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(!addr.ends_with(":0"));
    }

    #[tokio::test]
    async fn test_tcp_dial_accept() {
        let transport = TcpTransport::new().nodelay(true);
        let mut listener = transport.listen("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = transport.dial(&addr).await.unwrap();
        let (mut server, remote) = listener.accept().await.unwrap();
        assert_eq!(remote, client.local_addr().unwrap().to_string());

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_tcp_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpTransport::new().listen("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        assert!(TcpTransport::new().dial(&addr).await.is_err());
    }
}
