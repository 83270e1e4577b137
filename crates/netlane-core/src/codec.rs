//! Framing abstraction.
//!
//! A codec delimits messages inside a continuous byte stream.
//!
//! # Implementors
//!
//! - `LengthPrefixCodec` (default): `[N-byte big-endian length L][L bytes]`.
//!
//! Servers with no decoder configured fall back to raw pass-through: every
//! drain delivers all buffered bytes as one message.

use std::io::{self, Write};

use crate::buffer::Buffer;
use crate::error::FramingError;

/// Extracts complete messages from a `Buffer`.
///
/// **Contract:**
/// - For each complete frame, call `sink` with exactly the payload bytes
///   (header stripped), then advance the buffer past the frame.
/// - Leave a trailing partial frame unconsumed; the next call, after more
///   bytes arrive, must pick it up.
/// - Fail with `FramingError` on a protocol violation. The connection is
///   then closed.
pub trait Decoder: Send + Sync {
    fn decode(&self, buf: &mut Buffer, sink: &mut dyn FnMut(&[u8])) -> Result<(), FramingError>;
}

/// Serializes outgoing messages into wire bytes.
pub trait Encoder: Send + Sync {
    /// Append the wire form of `payload` to `out`.
    fn encode_into(&self, payload: &[u8], out: &mut Vec<u8>) -> Result<(), FramingError>;

    /// Wire form of `payload` as a fresh vector.
    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
        let mut out = Vec::new();
        self.encode_into(payload, &mut out)?;
        Ok(out)
    }

    /// Encode `payload` and write all of it to `writer`.
    ///
    /// Framing errors surface as `InvalidInput`.
    fn encode_to_writer(&self, writer: &mut dyn Write, payload: &[u8]) -> io::Result<()> {
        let wire = self
            .encode(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        writer.write_all(&wire)
    }
}
