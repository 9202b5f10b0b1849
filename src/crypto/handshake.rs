//! Key agreement for the session handshake.
//!
//! ```text
//! Responder                          Initiator
//!   -> s_R (32 bytes)
//!                                    <- s_I (32 bytes)
//!   k = SHA-256(X25519(s_R, s_I))    k = SHA-256(X25519(s_I, s_R))
//! ```
//!
//! The responder writes first and the initiator reads first, so neither side
//! blocks on a read while the other is doing the same. The I/O lives in
//! [`Session`](crate::transport::Session); this module only derives keys.

use sha2::{Digest, Sha256};

use crate::core::{CryptoError, SESSION_KEY_SIZE};

use super::{Keypair, PublicKey, SessionCipher, SessionKey};

/// Which side of the handshake a session played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dialled the connection; reads the peer key first.
    Initiator,
    /// Accepted the connection; writes its key first.
    Responder,
}

impl Role {
    /// First RPC sequence number issued by this side.
    ///
    /// Initiators issue odd numbers, responders even ones, so requests from
    /// the two sides of one session never share a sequence number.
    pub fn first_sequence(self) -> u64 {
        match self {
            Role::Initiator => 1,
            Role::Responder => 2,
        }
    }
}

/// Derive the 256-bit session key shared with `remote`.
pub fn derive_session_key(local: &Keypair, remote: &PublicKey) -> Result<SessionKey, CryptoError> {
    let shared = local.diffie_hellman(remote)?;
    let digest = Sha256::digest(shared.as_bytes());

    let mut key = [0u8; SESSION_KEY_SIZE];
    key.copy_from_slice(&digest);
    Ok(SessionKey::from_bytes(key))
}

/// Derive the session key and build the AEAD cipher in one step.
pub fn derive_cipher(local: &Keypair, remote: &PublicKey) -> Result<SessionCipher, CryptoError> {
    let key = derive_session_key(local, remote)?;
    SessionCipher::new(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_symmetry() {
        let responder = Keypair::generate();
        let initiator = Keypair::generate();

        let k1 = derive_session_key(&responder, &initiator.public_key()).unwrap();
        let k2 = derive_session_key(&initiator, &responder.public_key()).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_session_key_differs_per_peer() {
        let local = Keypair::generate();
        let a = Keypair::generate();
        let b = Keypair::generate();

        let ka = derive_session_key(&local, &a.public_key()).unwrap();
        let kb = derive_session_key(&local, &b.public_key()).unwrap();

        assert_ne!(ka.as_bytes(), kb.as_bytes());
    }

    #[test]
    fn test_derived_ciphers_interoperate() {
        let responder = Keypair::generate();
        let initiator = Keypair::generate();

        let c1 = derive_cipher(&responder, &initiator.public_key()).unwrap();
        let c2 = derive_cipher(&initiator, &responder.public_key()).unwrap();

        let nonce = SessionCipher::generate_nonce();
        let ciphertext = c1.seal(&nonce, b"hello").unwrap();
        assert_eq!(c2.open(&nonce, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_role_sequence_parity() {
        assert_eq!(Role::Initiator.first_sequence() % 2, 1);
        assert_eq!(Role::Responder.first_sequence() % 2, 0);
    }
}
