//! Route paths carried under `message/x.rsocket.path.v0`.

use bytes::Bytes;

use super::MetadataError;

/// Encode a route path. The entry content is the raw UTF-8 text.
#[must_use]
pub fn encode(path: &str) -> Bytes { Bytes::copy_from_slice(path.as_bytes()) }

/// Decode a route path.
///
/// # Errors
///
/// Returns [`MetadataError::InvalidUtf8`] if the content is not UTF-8.
pub fn decode(buf: &Bytes) -> Result<&str, MetadataError> {
    std::str::from_utf8(buf).map_err(|_| MetadataError::InvalidUtf8 { field: "path" })
}
