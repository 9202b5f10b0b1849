//! The RPC multiplexer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::core::{
    RpcError, DEFAULT_INBOUND_QUEUE_CAPACITY, DEFAULT_WRITE_QUEUE_CAPACITY, LOOP_SHUTDOWN_GRACE,
    UNSOLICITED_SEQUENCE,
};
use crate::transport::{PeerAddr, RawStream, Session, SessionInfo, SessionReader, SessionWriter};

use super::frame::{decode_frame, encode_frame};
use super::pending::{Delivery, PendingRequests};
use super::queue::Queue;
use super::task::LoopHandle;

/// Queue sizes for one RPC instance.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Frames waiting for the writer loop.
    pub write_queue_capacity: usize,
    /// Inbound messages waiting for [`Rpc::read`].
    pub inbound_queue_capacity: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
        }
    }
}

/// Lifecycle of an RPC instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcState {
    /// Both loops running.
    Open,
    /// Shutdown started; new operations fail with [`RpcError::Closed`].
    Closing,
    /// Both loops have exited and the connection is released.
    Closed,
}

struct PendingWrite {
    seq: u64,
    payload: Bytes,
    done: Option<oneshot::Sender<Result<(), RpcError>>>,
}

struct InboundItem {
    seq: u64,
    payload: Bytes,
}

struct RpcInner {
    info: SessionInfo,
    next_seq: AtomicU64,
    pending: PendingRequests,
    writes: Queue<PendingWrite>,
    inbound: Queue<InboundItem>,
    state: watch::Sender<RpcState>,
}

impl RpcInner {
    /// Next sequence number for this side. Steps by two so the two peers
    /// never collide.
    fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(2, Ordering::Relaxed)
    }

    fn is_open(&self) -> bool {
        *self.state.borrow() == RpcState::Open
    }

    /// Move to `Closing` and unblock everyone. Returns false if shutdown had
    /// already started.
    fn shutdown(&self) -> bool {
        let started = self.state.send_if_modified(|state| {
            if *state == RpcState::Open {
                *state = RpcState::Closing;
                true
            } else {
                false
            }
        });
        if started {
            // Queues first: a request registered after `fail_all` then
            // fails on push instead of waiting forever.
            self.writes.close();
            self.inbound.close();
            self.pending.fail_all();
            debug!(peer = %self.info.remote_addr(), "rpc closing");
        }
        started
    }

    async fn enqueue(&self, seq: u64, payload: Bytes) -> Result<(), RpcError> {
        let (tx, rx) = oneshot::channel();
        let write = PendingWrite {
            seq,
            payload,
            done: Some(tx),
        };
        self.writes.push(write).await.map_err(|_| RpcError::Closed)?;
        rx.await.map_err(|_| RpcError::Closed)?
    }
}

/// Closes the RPC when the last [`Rpc`] clone is dropped.
struct CloseOnDrop(Arc<RpcInner>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Request/response multiplexer over one encrypted [`Session`].
///
/// Cloning is cheap; clones share the same connection. The connection is
/// closed by [`Rpc::close`], by the first loop error, or when the last clone
/// is dropped.
///
/// # Example
///
/// ```ignore
/// let rpc = Rpc::new(session, RpcConfig::default());
/// let reply = rpc.request(&b"ping"[..]).await?;
///
/// // On the other side:
/// let (payload, responder) = rpc.read().await?;
/// responder.respond(&b"pong"[..]).await?;
/// ```
#[derive(Clone)]
pub struct Rpc {
    inner: Arc<RpcInner>,
    _close_on_drop: Arc<CloseOnDrop>,
}

impl Rpc {
    /// Take ownership of `session` and start the reader and writer loops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S: RawStream>(session: Session<S>, config: RpcConfig) -> Self {
        let (reader, writer, info) = session.into_split();
        let (state, _) = watch::channel(RpcState::Open);

        let inner = Arc::new(RpcInner {
            next_seq: AtomicU64::new(info.role().first_sequence()),
            info,
            pending: PendingRequests::new(),
            writes: Queue::new(config.write_queue_capacity),
            inbound: Queue::new(config.inbound_queue_capacity),
            state,
        });

        let reader = LoopHandle::spawn("reader", read_loop(inner.clone(), reader));
        let writer = LoopHandle::spawn("writer", write_loop(inner.clone(), writer));
        tokio::spawn(supervise(inner.clone(), reader, writer));

        Self {
            _close_on_drop: Arc::new(CloseOnDrop(inner.clone())),
            inner,
        }
    }

    /// Handshake facts for the underlying session.
    pub fn info(&self) -> &SessionInfo {
        &self.inner.info
    }

    /// Address of the remote peer.
    pub fn peer(&self) -> &PeerAddr {
        self.inner.info.remote_addr()
    }

    /// Send `payload` and wait for the matching response.
    ///
    /// Dropping the returned future abandons the request; a response that
    /// arrives later is discarded.
    pub async fn request(&self, payload: impl Into<Bytes>) -> Result<Bytes, RpcError> {
        if !self.inner.is_open() {
            return Err(RpcError::Closed);
        }

        struct PendingGuard<'a> {
            pending: &'a PendingRequests,
            seq: u64,
            active: bool,
        }

        impl PendingGuard<'_> {
            fn disarm(&mut self) {
                self.active = false;
            }
        }

        impl Drop for PendingGuard<'_> {
            fn drop(&mut self) {
                if self.active {
                    self.pending.abandon(self.seq);
                    trace!(seq = self.seq, "request abandoned");
                }
            }
        }

        let seq = self.inner.next_sequence();
        let rx = self.inner.pending.register(seq);
        let mut guard = PendingGuard {
            pending: &self.inner.pending,
            seq,
            active: true,
        };

        let write = PendingWrite {
            seq,
            payload: payload.into(),
            done: None,
        };
        self.inner
            .writes
            .push(write)
            .await
            .map_err(|_| RpcError::Closed)?;
        trace!(seq, "request queued");

        let response = rx.await.map_err(|_| RpcError::Closed)?;
        guard.disarm();
        Ok(response)
    }

    /// [`Rpc::request`] with a deadline.
    pub async fn request_timeout(
        &self,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Bytes, RpcError> {
        tokio::time::timeout(timeout, self.request(payload))
            .await
            .map_err(|_| RpcError::Timeout(timeout))?
    }

    /// Send an unsolicited message (sequence 0) and wait until it has been
    /// written to the connection. No response is routed back.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<(), RpcError> {
        if !self.inner.is_open() {
            return Err(RpcError::Closed);
        }
        self.inner.enqueue(UNSOLICITED_SEQUENCE, payload.into()).await
    }

    /// Wait for the next inbound message that is not a response to one of
    /// our requests.
    pub async fn read(&self) -> Result<(Bytes, Responder), RpcError> {
        let item = self.inner.inbound.pop().await.ok_or(RpcError::Closed)?;
        let responder = Responder {
            inner: self.inner.clone(),
            seq: item.seq,
        };
        Ok((item.payload, responder))
    }

    /// Shut down both loops and wait until the connection is released.
    ///
    /// Pending requests fail with [`RpcError::Closed`]. Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown();
        self.closed().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RpcState {
        *self.inner.state.borrow()
    }

    /// Check whether shutdown has started.
    pub fn is_closed(&self) -> bool {
        !self.inner.is_open()
    }

    /// Wait until the RPC reaches [`RpcState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(|state| *state == RpcState::Closed).await;
    }

    /// Requests still awaiting a response, tombstones included.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }
}

impl fmt::Debug for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("peer", self.peer())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Reply route for one inbound message.
pub struct Responder {
    inner: Arc<RpcInner>,
    seq: u64,
}

impl Responder {
    /// Sequence number the reply will carry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Check whether the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.seq != UNSOLICITED_SEQUENCE
    }

    /// Address of the peer that sent the message.
    pub fn peer(&self) -> &PeerAddr {
        self.inner.info.remote_addr()
    }

    /// Write `payload` back under the request's sequence number and wait
    /// until it reaches the connection.
    pub async fn respond(self, payload: impl Into<Bytes>) -> Result<(), RpcError> {
        if !self.expects_reply() {
            return Err(RpcError::NoReplyRoute);
        }
        if !self.inner.is_open() {
            return Err(RpcError::Closed);
        }
        self.inner.enqueue(self.seq, payload.into()).await
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("peer", self.peer())
            .field("seq", &self.seq)
            .finish()
    }
}

async fn write_loop<W>(inner: Arc<RpcInner>, mut writer: SessionWriter<W>) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(write) = inner.writes.pop().await {
        let frame = encode_frame(write.seq, &write.payload);
        match writer.write(&frame).await {
            Ok(written) => {
                trace!(seq = write.seq, bytes = written, "frame written");
                if let Some(done) = write.done {
                    let _ = done.send(Ok(()));
                }
            }
            Err(e) => {
                if let Some(done) = write.done {
                    let _ = done.send(Err(RpcError::Closed));
                }
                return Err(e.into());
            }
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

async fn read_loop<R>(inner: Arc<RpcInner>, mut reader: SessionReader<R>) -> Result<(), RpcError>
where
    R: AsyncRead + Unpin,
{
    let mut state = inner.state.subscribe();
    loop {
        let plaintext = tokio::select! {
            frame = reader.read() => frame?,
            _ = until_closing(&mut state) => return Ok(()),
        };

        let (seq, payload) = decode_frame(Bytes::from(plaintext))?;
        let payload = if seq == UNSOLICITED_SEQUENCE {
            payload
        } else {
            match inner.pending.complete(seq, payload) {
                Delivery::Delivered => continue,
                Delivery::Abandoned => {
                    debug!(peer = %inner.info.remote_addr(), seq, "dropping late response");
                    continue;
                }
                Delivery::Unknown(payload) => payload,
            }
        };

        trace!(seq, len = payload.len(), "inbound message");
        if inner.inbound.push(InboundItem { seq, payload }).await.is_err() {
            return Ok(());
        }
    }
}

async fn until_closing(state: &mut watch::Receiver<RpcState>) {
    let _ = state.wait_for(|state| *state != RpcState::Open).await;
}

/// Wait for the first loop to finish, shut everything down, then stop the
/// other loop so the connection is released before `Closed`. Writes still
/// queued at that point fail with [`RpcError::Closed`].
async fn supervise(inner: Arc<RpcInner>, mut reader: LoopHandle, mut writer: LoopHandle) {
    let (reader_name, writer_name) = (reader.name(), writer.name());
    let reader_first = tokio::select! {
        result = &mut reader => {
            log_loop_exit(&inner, reader_name, result);
            true
        }
        result = &mut writer => {
            log_loop_exit(&inner, writer_name, result);
            false
        }
    };

    inner.shutdown();

    let mut remaining = if reader_first { writer } else { reader };
    let name = remaining.name();
    let result = match tokio::time::timeout(LOOP_SHUTDOWN_GRACE, &mut remaining).await {
        Ok(result) => result,
        Err(_) => {
            debug!(peer = %inner.info.remote_addr(), "{name} loop still busy, aborting");
            remaining.abort();
            remaining.await
        }
    };
    log_loop_exit(&inner, name, result);

    for write in inner.writes.drain().await {
        if let Some(done) = write.done {
            let _ = done.send(Err(RpcError::Closed));
        }
    }

    inner.state.send_replace(RpcState::Closed);
    debug!(peer = %inner.info.remote_addr(), "rpc closed");
}

fn log_loop_exit(inner: &RpcInner, name: &'static str, result: Result<(), RpcError>) {
    let peer = inner.info.remote_addr();
    match result {
        Ok(()) => trace!(peer = %peer, "{name} loop finished"),
        Err(RpcError::Session(e)) if e.is_eof() => {
            debug!(peer = %peer, "peer closed connection")
        }
        Err(e) if !inner.is_open() => debug!(peer = %peer, error = %e, "{name} loop stopped"),
        Err(e) => warn!(peer = %peer, error = %e, "{name} loop failed"),
    }
}
