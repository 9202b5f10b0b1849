//! Typed message envelope routed by the session pool.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::error::CodecError;

/// A message carried over an RPC session.
///
/// `message_type` selects the handler on the receiving side; `body` is opaque
/// to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

impl Message {
    /// Create a message from a type tag and raw body bytes.
    pub fn new(message_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type: message_type.into(),
            body: body.into(),
        }
    }

    /// Create a message whose body is the CBOR encoding of `value`.
    pub fn from_body<T: Serialize>(
        message_type: impl Into<String>,
        value: &T,
    ) -> Result<Self, CodecError> {
        let body = serde_cbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Self::new(message_type, body))
    }

    /// Decode the body as CBOR into `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        serde_cbor::from_slice(&self.body).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// The handler-selecting type tag.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// The raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the message, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Announce {
        name: String,
        port: u16,
    }

    #[test]
    fn test_typed_body() {
        let announce = Announce {
            name: "node-a".into(),
            port: 9000,
        };
        let message = Message::from_body("peer/announce", &announce).unwrap();
        assert_eq!(message.message_type(), "peer/announce");

        let decoded: Announce = message.decode_body().unwrap();
        assert_eq!(decoded, announce);
    }

    #[test]
    fn test_decode_body_wrong_shape() {
        let message = Message::new("peer/announce", b"not cbor".to_vec());
        let result: Result<Announce, _> = message.decode_body();
        assert!(result.is_err());
    }
}
