//! In-process transport over tokio duplex pipes.
//!
//! Listeners register under a name in a registry shared by every clone of
//! the transport. Dialing a name creates a duplex pipe and hands one end to
//! the listener.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::core::MEMORY_TRANSPORT_NAME;

use super::net::{Listener, Transport};

const PIPE_CAPACITY: usize = 64 * 1024;
const ACCEPT_BACKLOG: usize = 64;

type Registry = Arc<Mutex<HashMap<String, mpsc::Sender<(DuplexStream, String)>>>>;

/// In-process transport for tests and embedded use.
///
/// Binding `""` or a name ending in `:0` allocates a unique name.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    registry: Registry,
    next_id: Arc<AtomicU64>,
}

impl MemoryTransport {
    /// Create an empty transport namespace.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_name(&self, prefix: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}{id}")
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Stream = DuplexStream;
    type Listener = MemoryListener;

    fn name(&self) -> &str {
        MEMORY_TRANSPORT_NAME
    }

    async fn dial(&self, address: &str) -> io::Result<DuplexStream> {
        let acceptor = self.registry.lock().get(address).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, format!("no listener at {address}"))
        })?;

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        let label = self.allocate_name("dialer-");
        acceptor
            .send((remote, label))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener closed"))?;
        Ok(local)
    }

    async fn listen(&self, bind_addr: &str) -> io::Result<MemoryListener> {
        let name = match bind_addr {
            "" => self.allocate_name("node-"),
            addr if addr.ends_with(":0") => {
                let prefix = addr.trim_end_matches('0');
                self.allocate_name(prefix)
            }
            addr => addr.to_string(),
        };

        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        {
            let mut registry = self.registry.lock();
            if registry.contains_key(&name) {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("{name} already bound"),
                ));
            }
            registry.insert(name.clone(), tx);
        }

        Ok(MemoryListener {
            name,
            rx,
            registry: self.registry.clone(),
        })
    }
}

/// Listener half of [`MemoryTransport`]. Unregisters itself on drop.
#[derive(Debug)]
pub struct MemoryListener {
    name: String,
    rx: mpsc::Receiver<(DuplexStream, String)>,
    registry: Registry,
}

#[async_trait]
impl Listener for MemoryListener {
    type Stream = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "listener unregistered"))
    }

    fn local_addr(&self) -> io::Result<String> {
        Ok(self.name.clone())
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}
