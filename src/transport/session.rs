//! Encrypted session over a raw byte stream.
//!
//! A [`Session`] owns one raw stream. After the key exchange every message is
//! carried in one frame:
//!
//! ```text
//! +----------------+------------------------+------------------+
//! | len (u64, BE)  | ciphertext (len bytes) | nonce (12 bytes) |
//! +----------------+------------------------+------------------+
//! ```
//!
//! `read` and `write` are not safe to call concurrently with themselves; the
//! RPC layer splits the session and drives each half from a single loop.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

use crate::core::{
    HandshakeError, SessionError, AEAD_NONCE_SIZE, DEFAULT_MAX_FRAME_SIZE, FRAME_LENGTH_SIZE,
    PUBLIC_KEY_SIZE,
};
use crate::crypto::{derive_cipher, Keypair, PublicKey, Role, SessionCipher};

use super::addr::PeerAddr;
use super::net::RawStream;

/// Identity facts fixed by the handshake.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    role: Role,
    local_key: PublicKey,
    remote: PeerAddr,
}

impl SessionInfo {
    /// Which side of the handshake we played.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Our own public key.
    pub fn local_key(&self) -> &PublicKey {
        &self.local_key
    }

    /// The key the remote asserted during the handshake.
    pub fn remote_key(&self) -> &PublicKey {
        self.remote.public_key()
    }

    /// Transport, socket address and key of the remote.
    pub fn remote_addr(&self) -> &PeerAddr {
        &self.remote
    }
}

/// An established, encrypted session.
pub struct Session<S> {
    stream: S,
    cipher: Arc<SessionCipher>,
    info: SessionInfo,
    max_frame_size: usize,
}

impl<S: RawStream> Session<S> {
    /// Run the responder side of the handshake on an accepted stream.
    ///
    /// Writes our public key, then reads the initiator's.
    pub async fn accept(
        mut stream: S,
        keypair: &Keypair,
        transport: &str,
        remote_address: &str,
    ) -> Result<Self, HandshakeError> {
        stream.write_all(keypair.public_key().as_bytes()).await?;
        stream.flush().await?;
        let remote_key = read_public_key(&mut stream).await?;

        Self::establish(stream, keypair, Role::Responder, remote_key, transport, remote_address)
    }

    /// Run the initiator side of the handshake on a dialled stream.
    ///
    /// Reads the responder's public key, then writes ours. When `expected` is
    /// given, a different remote key aborts the handshake before our key is
    /// sent.
    pub async fn connect(
        mut stream: S,
        keypair: &Keypair,
        transport: &str,
        remote_address: &str,
        expected: Option<&PublicKey>,
    ) -> Result<Self, HandshakeError> {
        let remote_key = read_public_key(&mut stream).await?;
        if let Some(expected) = expected {
            if *expected != remote_key {
                return Err(HandshakeError::KeyMismatch {
                    expected: *expected,
                    actual: remote_key,
                });
            }
        }
        stream.write_all(keypair.public_key().as_bytes()).await?;
        stream.flush().await?;

        Self::establish(stream, keypair, Role::Initiator, remote_key, transport, remote_address)
    }

    fn establish(
        stream: S,
        keypair: &Keypair,
        role: Role,
        remote_key: PublicKey,
        transport: &str,
        remote_address: &str,
    ) -> Result<Self, HandshakeError> {
        let cipher = derive_cipher(keypair, &remote_key)?;
        let info = SessionInfo {
            role,
            local_key: keypair.public_key(),
            remote: PeerAddr::new(transport, remote_address, remote_key),
        };
        debug!(peer = %info.remote, ?role, "session established");

        Ok(Self {
            stream,
            cipher: Arc::new(cipher),
            info,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        })
    }

    /// Identity facts fixed by the handshake.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Set the largest ciphertext length `read` accepts.
    pub fn set_max_frame_size(&mut self, size: usize) {
        self.max_frame_size = size;
    }

    /// Get the largest ciphertext length `read` accepts.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Seal `payload` and write it as one frame.
    ///
    /// Returns the size of the whole frame (length prefix, ciphertext and
    /// nonce), not just the bytes of its final nonce write.
    pub async fn write(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        write_frame(&mut self.stream, &self.cipher, payload).await
    }

    /// Read one frame and return its plaintext.
    pub async fn read(&mut self) -> Result<Vec<u8>, SessionError> {
        read_frame(&mut self.stream, &self.cipher, self.max_frame_size).await
    }

    /// Shut down the write side of the raw stream.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Split into independently owned reader and writer halves.
    ///
    /// The raw stream is closed once both halves are dropped.
    pub fn into_split(self) -> (SessionReader<ReadHalf<S>>, SessionWriter<WriteHalf<S>>, SessionInfo) {
        let (read_half, write_half) = split(self.stream);
        let reader = SessionReader {
            inner: read_half,
            cipher: self.cipher.clone(),
            max_frame_size: self.max_frame_size,
        };
        let writer = SessionWriter {
            inner: write_half,
            cipher: self.cipher,
        };
        (reader, writer, self.info)
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("max_frame_size", &self.max_frame_size)
            .finish_non_exhaustive()
    }
}

/// Read half of a split session.
pub struct SessionReader<R> {
    inner: R,
    cipher: Arc<SessionCipher>,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> SessionReader<R> {
    /// Read one frame and return its plaintext.
    pub async fn read(&mut self) -> Result<Vec<u8>, SessionError> {
        read_frame(&mut self.inner, &self.cipher, self.max_frame_size).await
    }
}

/// Write half of a split session.
pub struct SessionWriter<W> {
    inner: W,
    cipher: Arc<SessionCipher>,
}

impl<W: AsyncWrite + Unpin> SessionWriter<W> {
    /// Seal `payload` and write it as one frame.
    ///
    /// Returns the size of the whole frame (length prefix, ciphertext and
    /// nonce), not just the bytes of its final nonce write.
    pub async fn write(&mut self, payload: &[u8]) -> Result<usize, SessionError> {
        write_frame(&mut self.inner, &self.cipher, payload).await
    }

    /// Shut down the write side of the raw stream.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

async fn read_public_key<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<PublicKey> {
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    reader.read_exact(&mut bytes).await?;
    Ok(PublicKey::from_bytes(bytes))
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cipher: &SessionCipher,
    payload: &[u8],
) -> Result<usize, SessionError> {
    let nonce = SessionCipher::generate_nonce();
    let ciphertext = cipher.seal(&nonce, payload)?;

    let mut frame = BytesMut::with_capacity(FRAME_LENGTH_SIZE + ciphertext.len() + AEAD_NONCE_SIZE);
    frame.put_u64(ciphertext.len() as u64);
    frame.put_slice(&ciphertext);
    frame.put_slice(&nonce);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(frame.len())
}

async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    cipher: &SessionCipher,
    max_frame_size: usize,
) -> Result<Vec<u8>, SessionError> {
    let len = reader.read_u64().await?;
    if len > max_frame_size as u64 {
        return Err(SessionError::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }

    let mut ciphertext = vec![0u8; len as usize];
    reader.read_exact(&mut ciphertext).await?;
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    reader.read_exact(&mut nonce).await?;

    Ok(cipher.open(&nonce, &ciphertext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CryptoError, AEAD_TAG_SIZE};
    use tokio::io::{duplex, DuplexStream};

    async fn session_pair(
        server_keys: &Keypair,
        client_keys: &Keypair,
    ) -> (Session<DuplexStream>, Session<DuplexStream>) {
        let (a, b) = duplex(1024);
        let expected = server_keys.public_key();
        let (server, client) = tokio::join!(
            Session::accept(a, server_keys, "mem", "client"),
            Session::connect(b, client_keys, "mem", "server", Some(&expected)),
        );
        (server.unwrap(), client.unwrap())
    }

    #[tokio::test]
    async fn test_handshake_records_peer() {
        let server_keys = Keypair::generate();
        let client_keys = Keypair::generate();
        let (server, client) = session_pair(&server_keys, &client_keys).await;

        assert_eq!(server.info().role(), Role::Responder);
        assert_eq!(client.info().role(), Role::Initiator);
        assert_eq!(server.info().remote_key(), &client_keys.public_key());
        assert_eq!(client.info().remote_key(), &server_keys.public_key());
        assert_eq!(server.info().remote_addr().address(), "client");
        assert_eq!(client.info().remote_addr().transport(), "mem");
        assert_eq!(client.info().local_key(), &client_keys.public_key());
    }

    #[tokio::test]
    async fn test_frames_both_directions() {
        let (mut server, mut client) =
            session_pair(&Keypair::generate(), &Keypair::generate()).await;

        let written = client.write(b"hello server").await.unwrap();
        assert_eq!(written, FRAME_LENGTH_SIZE + 12 + AEAD_TAG_SIZE + AEAD_NONCE_SIZE);
        assert_eq!(server.read().await.unwrap(), b"hello server");

        server.write(b"hello client").await.unwrap();
        assert_eq!(client.read().await.unwrap(), b"hello client");
    }

    #[tokio::test]
    async fn test_empty_and_large_payloads() {
        let (server, client) = session_pair(&Keypair::generate(), &Keypair::generate()).await;
        let (mut reader, _server_writer, _) = server.into_split();
        let (_client_reader, mut writer, _) = client.into_split();

        let large: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();

        let send = tokio::spawn(async move {
            writer.write(b"").await.unwrap();
            writer.write(&large).await.unwrap();
            large
        });

        assert!(reader.read().await.unwrap().is_empty());
        let received = reader.read().await.unwrap();
        assert_eq!(received, send.await.unwrap());
    }

    #[tokio::test]
    async fn test_key_mismatch_aborts_handshake() {
        let server_keys = Keypair::generate();
        let impostor = Keypair::generate().public_key();
        let (a, b) = duplex(1024);

        let server = tokio::spawn({
            let server_keys = server_keys.clone();
            async move { Session::accept(a, &server_keys, "mem", "client").await }
        });
        let result = Session::connect(b, &Keypair::generate(), "mem", "server", Some(&impostor)).await;

        match result {
            Err(HandshakeError::KeyMismatch { expected, actual }) => {
                assert_eq!(expected, impostor);
                assert_eq!(actual, server_keys.public_key());
            }
            other => panic!("expected key mismatch, got {other:?}"),
        }
        // The initiator hung up without sending its key.
        assert!(matches!(server.await.unwrap(), Err(HandshakeError::Io(_))));
    }

    #[tokio::test]
    async fn test_invalid_remote_key_fails_handshake() {
        let (a, mut b) = duplex(1024);
        let server = tokio::spawn(async move {
            Session::accept(a, &Keypair::generate(), "mem", "client").await
        });

        let mut server_key = [0u8; PUBLIC_KEY_SIZE];
        b.read_exact(&mut server_key).await.unwrap();
        let mut bogus = [0u8; PUBLIC_KEY_SIZE];
        bogus[0] = 2;
        b.write_all(&bogus).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(
            result,
            Err(HandshakeError::Crypto(CryptoError::KeyConversion(_)))
        ));
    }

    #[tokio::test]
    async fn test_tampered_frame_rejected() {
        let server_keys = Keypair::generate();
        let client_keys = Keypair::generate();
        let (a, mut b) = duplex(4096);
        let server = tokio::spawn({
            let server_keys = server_keys.clone();
            async move { Session::accept(a, &server_keys, "mem", "client").await }
        });

        let mut key = [0u8; PUBLIC_KEY_SIZE];
        b.read_exact(&mut key).await.unwrap();
        b.write_all(client_keys.public_key().as_bytes()).await.unwrap();
        let mut server = server.await.unwrap().unwrap();

        let cipher = derive_cipher(&client_keys, &server_keys.public_key()).unwrap();
        let mut raw = Vec::new();
        write_frame(&mut raw, &cipher, b"genuine").await.unwrap();
        raw[FRAME_LENGTH_SIZE] ^= 0x01;
        b.write_all(&raw).await.unwrap();

        let result = server.read().await;
        assert!(matches!(
            result,
            Err(SessionError::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut server, mut client) =
            session_pair(&Keypair::generate(), &Keypair::generate()).await;
        server.set_max_frame_size(64);

        client.write(&[0u8; 128]).await.unwrap();
        let result = server.read().await;
        assert!(matches!(
            result,
            Err(SessionError::FrameTooLarge { len, max: 64 }) if len == 128 + AEAD_TAG_SIZE as u64
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_eof() {
        let (mut server, client) = session_pair(&Keypair::generate(), &Keypair::generate()).await;
        let (reader, mut writer, _) = client.into_split();

        // Length prefix promising more bytes than will ever arrive.
        let mut partial = BytesMut::new();
        partial.put_u64(100);
        partial.put_slice(&[0u8; 10]);
        writer.inner.write_all(&partial).await.unwrap();
        drop(writer);
        drop(reader);

        let err = server.read().await.unwrap_err();
        assert!(err.is_eof());
    }
}
