//! Inner wire frame carried inside each session frame.
//!
//! ```text
//! +--------------+--------------+-------------------------+
//! | seq: uvarint | len: uvarint | payload (len bytes)     |
//! +--------------+--------------+-------------------------+
//! ```
//!
//! Varints are unsigned LEB128: seven bits per byte, low group first, high
//! bit set on every byte but the last. Bytes after the payload are ignored.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{RpcError, MAX_UVARINT_LEN};

/// Append `value` as an unsigned varint.
pub fn put_uvarint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Consume an unsigned varint from the front of `buf`.
pub fn get_uvarint(buf: &mut Bytes) -> Result<u64, RpcError> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for i in 0..MAX_UVARINT_LEN {
        if !buf.has_remaining() {
            return Err(RpcError::Malformed("truncated varint"));
        }
        let byte = buf.get_u8();
        if byte < 0x80 {
            // The tenth byte may only carry the top bit of a u64.
            if i == MAX_UVARINT_LEN - 1 && byte > 1 {
                return Err(RpcError::Malformed("varint overflows u64"));
            }
            return Ok(value | (u64::from(byte) << shift));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    Err(RpcError::Malformed("varint overflows u64"))
}

/// Build an inner frame.
pub fn encode_frame(seq: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 * MAX_UVARINT_LEN + payload.len());
    put_uvarint(&mut buf, seq);
    put_uvarint(&mut buf, payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Parse an inner frame into its sequence number and payload.
pub fn decode_frame(mut frame: Bytes) -> Result<(u64, Bytes), RpcError> {
    let seq = get_uvarint(&mut frame)?;
    let len = get_uvarint(&mut frame)?;
    if len > frame.len() as u64 {
        return Err(RpcError::Malformed("payload shorter than declared length"));
    }
    Ok((seq, frame.split_to(len as usize)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, value);
        buf.to_vec()
    }

    #[test]
    fn test_uvarint_known_encodings() {
        assert_eq!(varint(0), [0x00]);
        assert_eq!(varint(1), [0x01]);
        assert_eq!(varint(127), [0x7f]);
        assert_eq!(varint(128), [0x80, 0x01]);
        assert_eq!(varint(300), [0xac, 0x02]);
        assert_eq!(varint(u64::MAX).len(), MAX_UVARINT_LEN);
        assert_eq!(varint(u64::MAX)[MAX_UVARINT_LEN - 1], 0x01);
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(300, b"hi");
        assert_eq!(hex::encode(&frame), "ac02026869");

        let (seq, payload) = decode_frame(frame).unwrap();
        assert_eq!(seq, 300);
        assert_eq!(&payload[..], b"hi");
    }

    #[test]
    fn test_frame_empty_payload() {
        let (seq, payload) = decode_frame(encode_frame(0, b"")).unwrap();
        assert_eq!(seq, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut raw = BytesMut::from(&encode_frame(7, b"abc")[..]);
        raw.put_slice(b"junk");
        let (seq, payload) = decode_frame(raw.freeze()).unwrap();
        assert_eq!(seq, 7);
        assert_eq!(&payload[..], b"abc");
    }

    #[test]
    fn test_malformed_frames() {
        // Empty input.
        assert!(matches!(decode_frame(Bytes::new()), Err(RpcError::Malformed(_))));

        // Continuation bit set on the last available byte.
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0x80])),
            Err(RpcError::Malformed(_))
        ));

        // Declared length larger than the payload.
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0x01, 0x05, b'a'])),
            Err(RpcError::Malformed(_))
        ));

        // Eleven-byte varint.
        let overlong = Bytes::from_static(&[0xff; 11]);
        assert!(matches!(decode_frame(overlong), Err(RpcError::Malformed(_))));

        // Ten bytes whose last byte overflows 64 bits.
        let mut overflow = vec![0xff; 9];
        overflow.push(0x02);
        assert!(matches!(
            decode_frame(Bytes::from(overflow)),
            Err(RpcError::Malformed(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_frame_preserves_seq_and_payload(
            seq in any::<u64>(),
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let (decoded_seq, decoded) = decode_frame(encode_frame(seq, &payload)).unwrap();
            prop_assert_eq!(decoded_seq, seq);
            prop_assert_eq!(&decoded[..], &payload[..]);
        }
    }
}
