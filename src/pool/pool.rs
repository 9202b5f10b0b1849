//! Session pool: dial, accept, cache and dispatch.

use std::io;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::{
    CborCodec, Codec, HandshakeError, Message, PoolError, ACCEPT_BACKOFF,
};
use crate::crypto::{Keypair, PublicKey};
use crate::rpc::Rpc;
use crate::transport::{Listener, PeerAddr, RawStream, Session, Transport};

use super::config::PoolConfig;
use super::handler::{Handler, HandlerRegistry, InboundRequest};

struct PooledSession {
    rpc: Rpc,
    dispatch: JoinHandle<()>,
}

struct PoolInner<T: Transport> {
    config: PoolConfig,
    keypair: Keypair,
    transport: T,
    codec: Arc<dyn Codec>,
    handlers: Arc<HandlerRegistry>,
    sessions: Mutex<LruCache<PublicKey, PooledSession>>,
    /// Per-peer dial locks so concurrent dials share one handshake.
    dialing: DashMap<PublicKey, Arc<tokio::sync::Mutex<()>>>,
    shutdown: watch::Sender<bool>,
}

/// A cache of encrypted RPC sessions keyed by remote public key.
///
/// Cloning is cheap; clones share the same cache, handlers and listeners.
///
/// # Example
///
/// ```ignore
/// use peerwire::prelude::*;
///
/// let server = SessionPool::new(PoolConfig::default(), Keypair::generate(), TcpTransport::new());
/// server.register_handler("test/ping", |request: InboundRequest| async move {
///     request.reply("pong").await?;
///     Ok::<(), HandlerError>(())
/// });
/// let addr = server.listen("127.0.0.1:0").await?;
///
/// let client = SessionPool::new(PoolConfig::default(), Keypair::generate(), TcpTransport::new());
/// let reply = client.request(&addr, &Message::new("test/ping", "ping")).await?;
/// assert_eq!(reply.body(), b"pong");
/// ```
pub struct SessionPool<T: Transport> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Transport> Clone for SessionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> SessionPool<T> {
    /// Create a pool that encodes messages with [`CborCodec`].
    pub fn new(config: PoolConfig, keypair: Keypair, transport: T) -> Self {
        Self::with_codec(config, keypair, transport, CborCodec)
    }

    /// Create a pool with a custom message codec.
    pub fn with_codec(
        config: PoolConfig,
        keypair: Keypair,
        transport: T,
        codec: impl Codec,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(PoolInner {
                config,
                keypair,
                transport,
                codec: Arc::new(codec),
                handlers: Arc::new(HandlerRegistry::new()),
                sessions: Mutex::new(LruCache::new(capacity)),
                dialing: DashMap::new(),
                shutdown,
            }),
        }
    }

    /// Our public key.
    pub fn local_key(&self) -> PublicKey {
        self.inner.keypair.public_key()
    }

    /// The pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Return the cached session for `addr`, dialling and running the
    /// initiator handshake on a miss.
    ///
    /// Concurrent dials to the same key share one handshake. A cached
    /// session that has already closed is dropped and re-dialled.
    pub async fn dial(&self, addr: &PeerAddr) -> Result<Rpc, PoolError> {
        self.inner.ensure_open()?;
        let key = *addr.public_key();
        if let Some(rpc) = self.inner.cached(&key) {
            return Ok(rpc);
        }

        let lock = self.inner.dialing.entry(key).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            match self.inner.cached(&key) {
                Some(rpc) => Ok(rpc),
                None => self.inner.connect(addr).await,
            }
        };
        self.inner
            .dialing
            .remove_if(&key, |_, lock| Arc::strong_count(lock) <= 2);

        result
    }

    /// Send `message` to `addr` and wait for the reply.
    ///
    /// Applies [`PoolConfig::request_timeout`] when set.
    pub async fn request(&self, addr: &PeerAddr, message: &Message) -> Result<Message, PoolError> {
        let rpc = self.dial(addr).await?;
        let bytes = self.inner.codec.encode(message)?;

        let reply = match self.inner.config.request_timeout {
            Some(deadline) => rpc.request_timeout(bytes, deadline).await?,
            None => rpc.request(bytes).await?,
        };
        Ok(self.inner.codec.decode(&reply)?)
    }

    /// Send `message` to `addr` without waiting for a reply.
    pub async fn send(&self, addr: &PeerAddr, message: &Message) -> Result<(), PoolError> {
        let rpc = self.dial(addr).await?;
        let bytes = self.inner.codec.encode(message)?;
        rpc.send(bytes).await?;
        Ok(())
    }

    /// Route inbound messages of `message_type` to `handler`. A later
    /// registration for the same type replaces this one.
    pub fn register_handler(&self, message_type: impl Into<String>, handler: impl Handler) {
        self.inner.handlers.register(message_type, handler);
    }

    /// Stop routing `message_type`. Returns whether a handler was removed.
    pub fn unregister_handler(&self, message_type: &str) -> bool {
        self.inner.handlers.unregister(message_type)
    }

    /// Bind a listener and accept sessions in the background until the
    /// pool is closed. Returns the address peers should dial.
    pub async fn listen(&self, bind_addr: &str) -> Result<PeerAddr, PoolError> {
        self.inner.ensure_open()?;
        let listener = self
            .inner
            .transport
            .listen(bind_addr)
            .await
            .map_err(PoolError::Listen)?;
        let local = listener.local_addr().map_err(PoolError::Listen)?;
        let addr = PeerAddr::new(self.inner.transport.name(), local, self.local_key());

        tokio::spawn(accept_loop(
            Arc::downgrade(&self.inner),
            listener,
            self.inner.shutdown.subscribe(),
        ));
        debug!(addr = %addr, "listening");
        Ok(addr)
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    /// Check whether a session with `key` is cached.
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.inner.sessions.lock().contains(key)
    }

    /// Stop accepting and close every cached session. Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown.send_replace(true);

        let drained: Vec<PooledSession> = {
            let mut sessions = self.inner.sessions.lock();
            std::iter::from_fn(|| sessions.pop_lru().map(|(_, session)| session)).collect()
        };
        let closing: Vec<_> = drained
            .into_iter()
            .map(|session| tokio::spawn(async move { session.rpc.close().await }))
            .collect();
        for handle in closing {
            let _ = handle.await;
        }
        debug!("pool closed");
    }
}

impl<T: Transport> std::fmt::Debug for SessionPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("local_key", &self.local_key())
            .field("sessions", &self.len())
            .field("handlers", &self.inner.handlers)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> PoolInner<T> {
    fn ensure_open(&self) -> Result<(), PoolError> {
        if *self.shutdown.borrow() {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    /// Live cached session for `key`. A closed entry is removed.
    fn cached(&self, key: &PublicKey) -> Option<Rpc> {
        let mut sessions = self.sessions.lock();
        let stale = match sessions.get(key) {
            Some(session) if !session.rpc.is_closed() => return Some(session.rpc.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            sessions.pop(key);
            debug!(peer = %key, "dropped stale session");
        }
        None
    }

    async fn connect(&self, addr: &PeerAddr) -> Result<Rpc, PoolError> {
        if addr.transport() != self.transport.name() {
            return Err(PoolError::Dial(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported transport: {}", addr.transport()),
            )));
        }

        let stream = timeout(self.config.dial_timeout, self.transport.dial(addr.address()))
            .await
            .map_err(|_| PoolError::Dial(io::ErrorKind::TimedOut.into()))?
            .map_err(PoolError::Dial)?;

        let expected = self.config.verify_remote_key.then_some(addr.public_key());
        let handshake = Session::connect(
            stream,
            &self.keypair,
            self.transport.name(),
            addr.address(),
            expected,
        );
        let mut session = timeout(self.config.handshake_timeout, handshake)
            .await
            .map_err(|_| HandshakeError::Timeout)??;
        session.set_max_frame_size(self.config.max_frame_size);

        self.ensure_open()?;
        Ok(self.install(session))
    }

    async fn accept_session<S: RawStream>(&self, stream: S, remote: &str) -> Result<(), PoolError> {
        let handshake = Session::accept(stream, &self.keypair, self.transport.name(), remote);
        let mut session = timeout(self.config.handshake_timeout, handshake)
            .await
            .map_err(|_| HandshakeError::Timeout)??;
        session.set_max_frame_size(self.config.max_frame_size);

        self.ensure_open()?;
        self.install(session);
        Ok(())
    }

    /// Start the RPC and its dispatch loop, then cache it. Whatever the
    /// insert displaces (the old session for this key, or the least recently
    /// used one) is closed in the background so a stalled peer cannot hold
    /// up this dial or accept.
    fn install<S: RawStream>(&self, session: Session<S>) -> Rpc {
        let rpc = Rpc::new(session, self.config.rpc.clone());
        let key = *rpc.info().remote_key();
        let dispatch = tokio::spawn(dispatch_loop(
            rpc.clone(),
            self.handlers.clone(),
            self.codec.clone(),
        ));

        let displaced = self.sessions.lock().push(
            key,
            PooledSession {
                rpc: rpc.clone(),
                dispatch,
            },
        );

        if let Some((old_key, old)) = displaced {
            if old_key == key {
                debug!(peer = %old.rpc.peer(), "replacing cached session");
            } else {
                debug!(peer = %old.rpc.peer(), "evicting least recently used session");
            }
            tokio::spawn(async move { old.rpc.close().await });
        }
        rpc
    }
}

impl<T: Transport> Drop for PoolInner<T> {
    fn drop(&mut self) {
        // Dispatch loops hold RPC clones; stopping them lets the cached
        // handles be the last ones, which closes each connection.
        for (_, session) in self.sessions.get_mut().iter() {
            session.dispatch.abort();
        }
    }
}

async fn accept_loop<T: Transport>(
    pool: Weak<PoolInner<T>>,
    mut listener: T::Listener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = until_shutdown(&mut shutdown) => break,
        };

        match accepted {
            Ok((stream, remote)) => {
                let Some(pool) = pool.upgrade() else { break };
                tokio::spawn(async move {
                    if let Err(e) = pool.accept_session(stream, &remote).await {
                        warn!(remote = %remote, error = %e, "inbound session failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
    debug!("accept loop stopped");
}

/// Resolves when the pool is closed or dropped.
async fn until_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn dispatch_loop(rpc: Rpc, handlers: Arc<HandlerRegistry>, codec: Arc<dyn Codec>) {
    let peer = rpc.peer().clone();

    while let Ok((payload, responder)) = rpc.read().await {
        let message = match codec.decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %peer, seq = responder.seq(), error = %e, "dropping undecodable message");
                continue;
            }
        };

        let Some(handler) = handlers.get(message.message_type()) else {
            warn!(peer = %peer, message_type = %message.message_type(), "no handler registered");
            continue;
        };

        let message_type = message.message_type().to_string();
        let request = InboundRequest::new(peer.clone(), message, responder, codec.clone());
        let peer = peer.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.handle(request).await {
                warn!(peer = %peer, message_type = %message_type, error = %e, "handler failed");
            }
        });
    }

    debug!(peer = %peer, "dispatch loop stopped");
}
