//! Long-term identity keys.
//!
//! A node is identified by an Ed25519 keypair. For key agreement the same
//! keypair is mapped onto Curve25519: the private half through the SHA-512
//! expansion of the seed, the public half through the birational map from
//! Edwards to Montgomery form.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as DhPublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::core::{AddrParseError, CryptoError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

/// An Ed25519 keypair for long-term identity.
///
/// The seed is zeroized on drop by the underlying signing key.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore a keypair from its 32-byte seed.
    pub fn from_seed(seed: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Get the seed.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn seed(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.signing.to_bytes()
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Derive the X25519 secret matching this identity.
    pub fn dh_secret(&self) -> StaticSecret {
        let mut seed = self.signing.to_bytes();
        let expanded = Sha512::digest(seed);
        seed.zeroize();

        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&expanded[..32]);
        let secret = StaticSecret::from(scalar);
        scalar.zeroize();
        secret
    }

    /// Compute the X25519 shared secret with a remote identity.
    ///
    /// Fails if the remote key is not a valid Edwards point or if it yields a
    /// non-contributory result.
    pub fn diffie_hellman(&self, remote: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let remote_dh = remote.to_dh_public()?;
        let shared = self.dh_secret().diffie_hellman(&remote_dh);
        if !shared.was_contributory() {
            return Err(CryptoError::WeakKey);
        }
        Ok(shared)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key in its canonical 32-byte encoding.
///
/// Equality and hashing work on the encoded bytes, so two values for the same
/// peer always compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Convert to the X25519 public key of the same identity.
    pub fn to_dh_public(&self) -> Result<DhPublicKey, CryptoError> {
        let point = CompressedEdwardsY(self.0)
            .decompress()
            .ok_or_else(|| CryptoError::KeyConversion("not a valid Ed25519 point".into()))?;
        Ok(DhPublicKey::from(point.to_montgomery().to_bytes()))
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; PUBLIC_KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..16])
    }
}

impl FromStr for PublicKey {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| AddrParseError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = Keypair::generate();
        let kp2 = Keypair::generate();

        assert_ne!(kp1.public_key(), kp2.public_key());
        assert_ne!(kp1.seed(), kp2.seed());
    }

    #[test]
    fn test_keypair_from_seed_is_deterministic() {
        let seed = [0x42; PRIVATE_KEY_SIZE];
        let kp1 = Keypair::from_seed(seed);
        let kp2 = Keypair::from_seed(seed);

        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.seed(), seed);
    }

    #[test]
    fn test_dh_conversion_matches_public_key() {
        let kp = Keypair::generate();
        let from_secret = DhPublicKey::from(&kp.dh_secret());
        let from_public = kp.public_key().to_dh_public().unwrap();

        assert_eq!(from_secret.as_bytes(), from_public.as_bytes());
    }

    #[test]
    fn test_diffie_hellman_symmetry() {
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let ab = alice.diffie_hellman(&bob.public_key()).unwrap();
        let ba = bob.diffie_hellman(&alice.public_key()).unwrap();

        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn test_invalid_point_rejected() {
        let kp = Keypair::generate();

        // y = 2 has no corresponding x on the curve.
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes[0] = 2;
        let result = kp.diffie_hellman(&PublicKey::from_bytes(bytes));

        assert!(matches!(result, Err(CryptoError::KeyConversion(_))));
    }

    #[test]
    fn test_low_order_point_rejected() {
        let kp = Keypair::generate();

        // Encoding of the identity point (0, 1).
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes[0] = 1;
        let result = kp.diffie_hellman(&PublicKey::from_bytes(bytes));

        assert!(matches!(result, Err(CryptoError::WeakKey)));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = Keypair::generate().public_key();
        let parsed: PublicKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);

        assert!("abcd".parse::<PublicKey>().is_err());
    }
}
