//! Error types for the peerwire transport.
//!
//! Each layer owns its error enum. Transport and crypto failures are fatal to
//! the resource that hit them (a session, then the RPC instance built on it);
//! handler failures never leave the dispatch loop.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::PublicKey;

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key could not be converted to its Diffie-Hellman form.
    #[error("key conversion failed: {0}")]
    KeyConversion(String),

    /// The key agreement produced a non-contributory (all-zero) secret.
    #[error("remote key is a low-order point")]
    WeakKey,

    /// The AEAD cipher could not be constructed from the derived key.
    #[error("cipher construction failed")]
    CipherConstruction,

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag or corrupted).
    #[error("AEAD decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,
}

/// Errors raised by a [`Codec`](crate::core::Codec).
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A peer address string could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddrParseError {
    /// No `@<public key>` suffix.
    #[error("missing public key in peer address")]
    MissingKey,

    /// No `<transport>:` prefix.
    #[error("missing transport in peer address")]
    MissingTransport,

    /// Public key is not 64 hex characters.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

/// Errors during the key exchange. All of them leave the connection unusable.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// I/O error while exchanging public keys.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Key conversion or cipher construction failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The remote presented a different key than the one dialled.
    #[error("remote key mismatch: expected {expected}, got {actual}")]
    KeyMismatch {
        /// Key taken from the dial target.
        expected: PublicKey,
        /// Key asserted by the remote.
        actual: PublicKey,
    },

    /// The handshake did not complete in time.
    #[error("handshake timed out")]
    Timeout,
}

/// Errors reading or writing encrypted session frames.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error on the raw stream, including truncated frames.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Sealing or opening a frame failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Inbound length prefix exceeds the configured maximum.
    #[error("frame too large: {len} bytes (max: {max})")]
    FrameTooLarge {
        /// Length announced by the peer.
        len: u64,
        /// Configured maximum.
        max: usize,
    },
}

impl SessionError {
    /// Check if the remote closed the stream at or inside a frame.
    pub fn is_eof(&self) -> bool {
        matches!(self, SessionError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Errors in the RPC multiplexer.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The RPC instance is closed or its queues were shut down.
    #[error("end of stream")]
    Closed,

    /// The caller's deadline elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// `respond` was called for an unsolicited (sequence 0) message.
    #[error("message has no reply route")]
    NoReplyRoute,

    /// Inner frame header or length is malformed.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// The underlying session failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A loop task panicked or was aborted.
    #[error("loop task failed: {0}")]
    Task(String),
}

impl RpcError {
    /// Check if this error means the connection is gone.
    pub fn is_closed(&self) -> bool {
        matches!(self, RpcError::Closed)
    }
}

/// Errors returned by the session pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Opening the raw connection failed.
    #[error("dial failed: {0}")]
    Dial(io::Error),

    /// Binding a listener failed.
    #[error("listen failed: {0}")]
    Listen(io::Error),

    /// Key exchange failed.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// RPC error on an established session.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The pool has been closed.
    #[error("pool closed")]
    Closed,
}

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level peerwire errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Address parse error.
    #[error("address error: {0}")]
    Addr(#[from] AddrParseError),

    /// Handshake error.
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// RPC error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Pool error.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
