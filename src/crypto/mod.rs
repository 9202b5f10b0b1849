//! Security layer
//!
//! - Ed25519 identity keys with X25519 conversion ([`Keypair`], [`PublicKey`])
//! - AES-256-GCM framing cipher ([`SessionCipher`])
//! - Session key agreement ([`derive_session_key`])

mod aead;
mod handshake;
mod keys;

pub use aead::{SessionCipher, SessionKey};
pub use handshake::{derive_cipher, derive_session_key, Role};
pub use keys::{Keypair, PublicKey};
