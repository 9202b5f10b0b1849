//! Core traits for the peerwire transport.
//!
//! The session and RPC layers move opaque bytes. The pool turns those bytes
//! into [`Message`]s through a [`Codec`], so the framing never depends on a
//! particular encoding.

use super::error::CodecError;
use super::message::Message;

/// Turns messages into bytes and back.
///
/// # Requirements
///
/// - `decode(encode(m))` MUST yield a message equal to `m`
/// - implementations MUST be usable from many tasks at once
///
/// # Example
///
/// ```ignore
/// struct RawCodec;
///
/// impl Codec for RawCodec {
///     fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
///         let mut out = Vec::new();
///         out.push(message.message_type().len() as u8);
///         out.extend_from_slice(message.message_type().as_bytes());
///         out.extend_from_slice(message.body());
///         Ok(out)
///     }
///
///     fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
///         let (&len, rest) = bytes
///             .split_first()
///             .ok_or_else(|| CodecError::Decode("empty".into()))?;
///         let (tag, body) = rest.split_at(len as usize);
///         let tag = std::str::from_utf8(tag).map_err(|e| CodecError::Decode(e.to_string()))?;
///         Ok(Message::new(tag, body.to_vec()))
///     }
/// }
/// ```
pub trait Codec: Send + Sync + 'static {
    /// Serialize a message for the wire.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a message from the wire.
    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError>;
}

/// Default codec: the message envelope as a CBOR map.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        serde_cbor::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        serde_cbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
