//! AES-256-GCM AEAD encryption
//!
//! Every session frame is sealed under the per-connection key with a fresh
//! random 96-bit nonce and no additional data. The nonce travels in clear
//! after the ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::{CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, SESSION_KEY_SIZE};

/// A symmetric session key.
///
/// Zeroized on drop for security.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    key: [u8; SESSION_KEY_SIZE],
}

impl SessionKey {
    /// Create a new session key from bytes.
    pub fn from_bytes(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.key
    }
}

/// The AEAD instance owned by an established session.
///
/// Created once after the handshake and never mutated, so the reader and
/// writer halves of a session share it.
#[derive(Clone)]
pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl SessionCipher {
    /// Construct the cipher from a session key.
    pub fn new(key: &SessionKey) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::CipherConstruction)?;
        Ok(Self { cipher })
    }

    /// Generate a fresh random nonce.
    pub fn generate_nonce() -> [u8; AEAD_NONCE_SIZE] {
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Encrypt `plaintext` under `nonce`.
    ///
    /// Returns the ciphertext with the 16-byte tag appended.
    pub fn seal(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt and verify `ciphertext` sealed under `nonce`.
    pub fn open(
        &self,
        nonce: &[u8; AEAD_NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < AEAD_TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(byte: u8) -> SessionCipher {
        SessionCipher::new(&SessionKey::from_bytes([byte; SESSION_KEY_SIZE])).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = cipher(0x42);
        let nonce = SessionCipher::generate_nonce();
        let plaintext = b"Hello, peer!";

        let ciphertext = cipher.seal(&nonce, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + AEAD_TAG_SIZE);

        let decrypted = cipher.open(&nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_open_wrong_key_fails() {
        let nonce = SessionCipher::generate_nonce();
        let ciphertext = cipher(0x42).seal(&nonce, b"Secret message").unwrap();

        let result = cipher(0x43).open(&nonce, &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_open_wrong_nonce_fails() {
        let cipher = cipher(0x42);
        let nonce = [0x01; AEAD_NONCE_SIZE];
        let ciphertext = cipher.seal(&nonce, b"Secret message").unwrap();

        let result = cipher.open(&[0x02; AEAD_NONCE_SIZE], &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_open_corrupted_ciphertext_fails() {
        let cipher = cipher(0x42);
        let nonce = SessionCipher::generate_nonce();
        let mut ciphertext = cipher.seal(&nonce, b"Secret message").unwrap();
        ciphertext[0] ^= 0xFF;

        let result = cipher.open(&nonce, &ciphertext);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_open_short_ciphertext_fails() {
        let cipher = cipher(0x42);
        let result = cipher.open(&[0u8; AEAD_NONCE_SIZE], &[0u8; AEAD_TAG_SIZE - 1]);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = cipher(0x42);
        let nonce = SessionCipher::generate_nonce();

        let ciphertext = cipher.seal(&nonce, b"").unwrap();
        assert_eq!(ciphertext.len(), AEAD_TAG_SIZE);
        assert!(cipher.open(&nonce, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_nonces_are_fresh() {
        assert_ne!(SessionCipher::generate_nonce(), SessionCipher::generate_nonce());
    }
}
