//! Errors raised while encoding or decoding frames.

use thiserror::Error;

use super::FrameType;

/// Frame codec failures.
///
/// Encoding-side variants (`FieldTooLong`, `ZeroRequestN`,
/// `InvalidStreamId`, `StreamIdOutOfRange`) are raised to the caller of the
/// encode operation and never reach the wire.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer ended before a complete field could be read.
    #[error("frame truncated: {needed} more bytes required")]
    Truncated { needed: usize },

    /// The 6-bit frame type is not part of the protocol.
    #[error("unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// The frame type is recognised but not implemented.
    ///
    /// `ignorable` reflects the header's IGNORE flag; such frames may be
    /// dropped silently.
    #[error("unsupported frame type: {frame_type:?}")]
    UnsupportedFrameType { frame_type: FrameType, ignorable: bool },

    /// A connection-scoped frame on a stream, or a stream frame on stream zero.
    #[error("{frame_type:?} frame is not valid on stream {stream_id}")]
    InvalidStreamId { frame_type: FrameType, stream_id: u32 },

    /// The stream id sets the reserved top bit.
    #[error("stream id {0} exceeds the 31-bit range")]
    StreamIdOutOfRange(u32),

    /// A length-prefixed field does not fit its prefix.
    #[error("{field} is {len} bytes, exceeding the {max} byte limit")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A numeric field does not fit its wire width.
    #[error("{field} is out of range for its wire encoding")]
    ValueOutOfRange { field: &'static str },

    /// A text field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Request-N credit must be positive.
    #[error("request-n must be greater than zero")]
    ZeroRequestN,

    /// A PAYLOAD frame set neither NEXT nor COMPLETE.
    #[error("payload frame sets neither NEXT nor COMPLETE")]
    EmptyPayloadFrame,

    /// The FOLLOWS flag was set; fragmentation is not supported.
    #[error("fragmented frames are not supported")]
    FragmentationUnsupported,
}

impl FrameError {
    /// Report whether the frame may be dropped without any further action.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::UnsupportedFrameType { ignorable: true, .. })
    }
}
