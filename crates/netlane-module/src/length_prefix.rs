//! `LengthPrefixCodec` — reference framing.
//!
//! Wire format, repeated:
//!
//! ```text
//!   ┌──────────────────────────┬─────────────────────┐
//!   │ L: N-byte big-endian u64 │ L bytes of payload  │
//!   └──────────────────────────┴─────────────────────┘
//! ```
//!
//! `N` is in `1..=8`. A declared `L` above `max_len` is fatal as soon as the
//! header is visible, without waiting for the payload to arrive.

use netlane_core::buffer::Buffer;
use netlane_core::codec::{Decoder, Encoder};
use netlane_core::error::FramingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefixCodec {
    header_len: usize,
    max_len: u64,
}

impl LengthPrefixCodec {
    /// Codec with an `header_len`-byte prefix accepting payloads up to
    /// `max_len` bytes. `max_len` is clamped to what the prefix can express.
    pub fn new(header_len: usize, max_len: u64) -> Result<Self, FramingError> {
        if !(1..=8).contains(&header_len) {
            return Err(FramingError::InvalidHeaderLen(header_len));
        }
        Ok(Self {
            header_len,
            max_len: max_len.min(Self::prefix_limit(header_len)),
        })
    }

    /// Largest length representable in `header_len` bytes.
    fn prefix_limit(header_len: usize) -> u64 {
        if header_len >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * header_len)) - 1
        }
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    #[inline]
    fn read_len(header: &[u8]) -> u64 {
        header.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }
}

impl Decoder for LengthPrefixCodec {
    fn decode(&self, buf: &mut Buffer, sink: &mut dyn FnMut(&[u8])) -> Result<(), FramingError> {
        let n = self.header_len;
        loop {
            let Some(header) = buf.peek(n) else {
                return Ok(());
            };
            let len = Self::read_len(header);
            if len > self.max_len {
                return Err(FramingError::LengthTooLarge { len, max: self.max_len });
            }
            let frame = n.saturating_add(len as usize);
            let Some(bytes) = buf.peek(frame) else {
                return Ok(());
            };
            sink(&bytes[n..]);
            buf.advance(frame);
        }
    }
}

impl Encoder for LengthPrefixCodec {
    fn encode_into(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FramingError> {
        let len = payload.len() as u64;
        if len > self.max_len {
            return Err(FramingError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_len,
            });
        }
        out.reserve(self.header_len + payload.len());
        out.extend_from_slice(&len.to_be_bytes()[8 - self.header_len..]);
        out.extend_from_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeapBuffers;
    use proptest::prelude::*;

    fn decode_all(codec: &LengthPrefixCodec, buf: &mut Buffer) -> Result<Vec<Vec<u8>>, FramingError> {
        let mut out = Vec::new();
        codec.decode(buf, &mut |m| out.push(m.to_vec()))?;
        Ok(out)
    }

    #[test]
    fn test_round_trip_leaves_nothing() {
        let p = HeapBuffers::new(16);
        let codec = LengthPrefixCodec::new(2, 1024).unwrap();
        let wire = codec.encode(b"hello").unwrap();
        assert_eq!(wire, b"\x00\x05hello");

        let mut buf = Buffer::with_provider(&p);
        buf.append(&wire, &p);
        assert_eq!(decode_all(&codec, &mut buf).unwrap(), vec![b"hello".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_is_left_untouched() {
        let p = HeapBuffers::new(16);
        let codec = LengthPrefixCodec::new(2, 1024).unwrap();
        let mut buf = Buffer::with_provider(&p);
        buf.append(b"\x00\x05hel", &p);
        assert!(decode_all(&codec, &mut buf).unwrap().is_empty());
        assert_eq!(buf.len(), 5);

        buf.append(b"lo\x00", &p);
        assert_eq!(decode_all(&codec, &mut buf).unwrap(), vec![b"hello".to_vec()]);
        assert_eq!(buf.unread(), b"\x00");
    }

    #[test]
    fn test_hello_split_two_three_rest() {
        let p = HeapBuffers::new(4);
        let codec = LengthPrefixCodec::new(2, 1024).unwrap();
        let wire = codec.encode(b"hello").unwrap();
        let mut buf = Buffer::with_provider(&p);
        let mut got = Vec::new();
        for chunk in [&wire[..2], &wire[2..5], &wire[5..]] {
            buf.append(chunk, &p);
            got.extend(decode_all(&codec, &mut buf).unwrap());
        }
        assert_eq!(got, vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let p = HeapBuffers::new(8);
        let codec = LengthPrefixCodec::new(2, 1024).unwrap();
        let mut wire = Vec::new();
        for m in [&b"a"[..], b"", b"bcd", b"efgh"] {
            codec.encode_into(m, &mut wire).unwrap();
        }
        let mut buf = Buffer::with_provider(&p);
        buf.append(&wire, &p);
        let got = decode_all(&codec, &mut buf).unwrap();
        assert_eq!(got, vec![b"a".to_vec(), vec![], b"bcd".to_vec(), b"efgh".to_vec()]);
    }

    #[test]
    fn test_oversized_length_rejected_before_payload() {
        let p = HeapBuffers::new(8);
        let codec = LengthPrefixCodec::new(2, 1024).unwrap();
        let mut buf = Buffer::with_provider(&p);
        // 0xFFFF declared, only the header present
        buf.append(b"\xff\xff", &p);
        let err = decode_all(&codec, &mut buf).unwrap_err();
        assert_eq!(err, FramingError::LengthTooLarge { len: 0xffff, max: 1024 });
        assert!(buf.capacity() < 1024);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let codec = LengthPrefixCodec::new(1, 1024).unwrap();
        assert_eq!(codec.max_len(), 255);
        let err = codec.encode(&[0u8; 256]).unwrap_err();
        assert_eq!(err, FramingError::PayloadTooLarge { len: 256, max: 255 });
    }

    #[test]
    fn test_invalid_header_len() {
        assert_eq!(LengthPrefixCodec::new(0, 10), Err(FramingError::InvalidHeaderLen(0)));
        assert_eq!(LengthPrefixCodec::new(9, 10), Err(FramingError::InvalidHeaderLen(9)));
        assert_eq!(LengthPrefixCodec::new(8, u64::MAX).unwrap().max_len(), u64::MAX);
    }

    #[test]
    fn test_four_byte_prefix() {
        let codec = LengthPrefixCodec::new(4, 1 << 20).unwrap();
        let wire = codec.encode(&[9u8; 300]).unwrap();
        assert_eq!(&wire[..4], &[0u8, 0, 1, 44]);
        assert_eq!(wire.len(), 304);
    }

    #[test]
    fn test_encode_to_writer() {
        let codec = LengthPrefixCodec::new(2, 16).unwrap();
        let mut out: Vec<u8> = Vec::new();
        codec.encode_to_writer(&mut out, b"hi").unwrap();
        assert_eq!(out, b"\x00\x02hi");
        let err = codec.encode_to_writer(&mut out, &[0u8; 17]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    proptest! {
        #[test]
        fn prop_chunked_feed_matches_single_feed(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 1..8),
            chunk in 1usize..17,
        ) {
            let p = HeapBuffers::new(8);
            let codec = LengthPrefixCodec::new(2, 1024).unwrap();
            let mut wire = Vec::new();
            for m in &payloads {
                codec.encode_into(m, &mut wire).unwrap();
            }

            let mut whole = Buffer::with_provider(&p);
            whole.append(&wire, &p);
            let at_once = decode_all(&codec, &mut whole).unwrap();

            let mut pieces = Buffer::with_provider(&p);
            let mut chunked = Vec::new();
            for part in wire.chunks(chunk) {
                pieces.append(part, &p);
                chunked.extend(decode_all(&codec, &mut pieces).unwrap());
            }

            prop_assert_eq!(&at_once, &payloads);
            prop_assert_eq!(&chunked, &payloads);
            prop_assert!(pieces.is_empty());
        }
    }
}
