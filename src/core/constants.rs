//! Protocol constants for the peerwire transport.
//!
//! Sizes in the cryptographic and framing sections are part of the wire
//! format and MUST NOT be changed. Capacities and timeouts are defaults that
//! can be overridden through [`PoolConfig`](crate::pool::PoolConfig).

use std::time::Duration;

// =============================================================================
// CRYPTOGRAPHIC CONSTANTS
// =============================================================================

/// Ed25519 / X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 seed (private key) size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// AES-256-GCM key size.
pub const SESSION_KEY_SIZE: usize = 32;

/// AES-GCM nonce size.
pub const AEAD_NONCE_SIZE: usize = 12;

/// GCM authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

// =============================================================================
// FRAMING
// =============================================================================

/// Size of the big-endian ciphertext length that prefixes every session frame.
pub const FRAME_LENGTH_SIZE: usize = 8;

/// Default upper bound on the ciphertext length accepted by `Session::read`.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum encoded length of a u64 as an unsigned LEB128 varint.
pub const MAX_UVARINT_LEN: usize = 10;

/// Sequence number reserved for unsolicited messages (no reply routing).
pub const UNSOLICITED_SEQUENCE: u64 = 0;

// =============================================================================
// RPC QUEUES
// =============================================================================

/// Default capacity of the per-session writer queue.
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 16;

/// Default capacity of the per-session inbound queue.
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 16;

/// How long shutdown waits for the remaining loop before aborting it. A
/// writer stuck on a peer that stopped reading never notices the close.
pub const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// =============================================================================
// SESSION POOL
// =============================================================================

/// Default number of sessions kept by a pool before LRU eviction.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Default deadline for opening a raw connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for completing the key exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline applied by `SessionPool::request`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after a failed `accept` before polling the listener again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// =============================================================================
// TRANSPORT NAMES
// =============================================================================

/// Transport name used by [`TcpTransport`](crate::transport::TcpTransport).
pub const TCP_TRANSPORT_NAME: &str = "tcps";

/// Transport name used by [`MemoryTransport`](crate::transport::MemoryTransport).
pub const MEMORY_TRANSPORT_NAME: &str = "mem";
