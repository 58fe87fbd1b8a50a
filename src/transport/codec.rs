//! Length-prefixed framing of encoded frames on a byte stream.
//!
//! Each frame is preceded by a 24-bit big-endian length. Splitting is done
//! by `tokio_util`'s `LengthDelimitedCodec`; this wrapper adds structured
//! EOF and oversize errors.

use std::io;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::byte_order::{MAX_U24, read_network_u24};

/// Size of the length prefix.
pub const LENGTH_HEADER_SIZE: usize = 3;

/// Framing failures on the byte stream.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },

    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame { bytes_received: usize, expected: usize },

    #[error("premature EOF during header: {bytes_received} of {LENGTH_HEADER_SIZE} header bytes")]
    MidHeader { bytes_received: usize },
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::OversizedFrame { .. } => io::Error::new(io::ErrorKind::InvalidData, err),
            FramingError::MidFrame { .. } | FramingError::MidHeader { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
        }
    }
}

/// Codec splitting a byte stream into length-prefixed frames.
#[derive(Debug)]
pub struct FrameLengthCodec {
    inner: LengthDelimitedCodec,
    max_frame_length: usize,
}

impl FrameLengthCodec {
    /// Codec accepting frames up to `max_frame_length` bytes, capped at the
    /// largest length the prefix can express.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        let max_frame_length = max_frame_length.min(MAX_U24 as usize);
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(LENGTH_HEADER_SIZE)
                .max_frame_length(max_frame_length)
                .new_codec(),
            max_frame_length,
        }
    }

    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for FrameLengthCodec {
    fn default() -> Self { Self::new(MAX_U24 as usize) }
}

impl Decoder for FrameLengthCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.inner.decode(src).map(|frame| frame.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.inner.decode_eof(src) {
            Ok(Some(frame)) => Ok(Some(frame.freeze())),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(e),
            Ok(None) | Err(_) => Err(eof_error(src).into()),
        }
    }
}

fn eof_error(src: &BytesMut) -> FramingError {
    let bytes_received = src.len();
    match src.first_chunk::<LENGTH_HEADER_SIZE>() {
        Some(header) => FramingError::MidFrame {
            bytes_received: bytes_received - LENGTH_HEADER_SIZE,
            expected: read_network_u24(*header) as usize,
        },
        None => FramingError::MidHeader { bytes_received },
    }
}

impl Encoder<Bytes> for FrameLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: item.len(),
                max: self.max_frame_length,
            }
            .into());
        }
        self.inner.encode(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn frames_carry_three_byte_prefix() {
        let mut codec = FrameLengthCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"abcd"), &mut buf)
            .expect("encode");
        assert_eq!(&buf[..], &[0, 0, 4, b'a', b'b', b'c', b'd']);
        let frame = codec.decode(&mut buf).expect("decode").expect("frame");
        assert_eq!(frame, Bytes::from_static(b"abcd"));
    }

    #[test]
    fn oversized_frames_are_refused() {
        let mut codec = FrameLengthCodec::new(2);
        let err = codec
            .encode(Bytes::from_static(b"abc"), &mut BytesMut::new())
            .expect_err("too long");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[rstest]
    #[case(&[0, 0], FramingError::MidHeader { bytes_received: 2 })]
    #[case(&[0, 0, 5, 1, 2], FramingError::MidFrame { bytes_received: 2, expected: 5 })]
    fn truncated_input_reports_position(#[case] input: &[u8], #[case] expected: FramingError) {
        let mut codec = FrameLengthCodec::default();
        let mut buf = BytesMut::from(input);
        let err = codec.decode_eof(&mut buf).expect_err("truncated");
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<FramingError>())
            .expect("framing error");
        assert_eq!(*inner, expected);
    }

    #[test]
    fn clean_eof_ends_stream() {
        let mut codec = FrameLengthCodec::default();
        assert!(codec.decode_eof(&mut BytesMut::new()).expect("clean").is_none());
    }
}
