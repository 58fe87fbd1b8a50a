//! Errors raised by the composite metadata codecs.

use thiserror::Error;

/// Composite metadata and extension format failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The buffer ended in the middle of an entry.
    #[error("metadata truncated: {needed} more bytes required")]
    Truncated { needed: usize },

    /// A length-prefixed field does not fit its prefix.
    #[error("{field} is {len} bytes, exceeding the {max} byte limit")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A literal mime type was empty or not ASCII.
    #[error("invalid mime type: {0:?}")]
    InvalidMimeType(String),

    /// A text field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// RPC versions are limited to the positive range of an `i16`.
    #[error("rpc version {0} exceeds {max}", max = i16::MAX)]
    VersionOutOfRange(u16),
}
