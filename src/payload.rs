//! Application payloads: data plus optional metadata.
//!
//! Buffers are [`Bytes`], so moving a `Payload` into a frame transfers
//! ownership and cloning shares the same immutable allocation. There is no
//! manual release step.

use bytes::Bytes;

/// Application message exchanged on a stream.
///
/// # Examples
///
/// ```
/// use rsframe::Payload;
///
/// let payload = Payload::new("data", Some("meta".into()));
/// assert_eq!(payload.data().as_ref(), b"data");
/// assert!(payload.has_metadata());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    data: Bytes,
    metadata: Option<Bytes>,
}

impl Payload {
    /// Build a payload from data and optional metadata.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, metadata: Option<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Build a payload with no metadata.
    #[must_use]
    pub fn from_data(data: impl Into<Bytes>) -> Self { Self::new(data, None) }

    /// Build a metadata-only payload with empty data.
    #[must_use]
    pub fn from_metadata(metadata: impl Into<Bytes>) -> Self {
        Self::new(Bytes::new(), Some(metadata.into()))
    }

    #[must_use]
    pub fn data(&self) -> &Bytes { &self.data }

    #[must_use]
    pub fn metadata(&self) -> Option<&Bytes> { self.metadata.as_ref() }

    #[must_use]
    pub fn has_metadata(&self) -> bool { self.metadata.is_some() }

    /// Interpret the data section as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error if the data is not valid text.
    pub fn data_utf8(&self) -> Result<&str, std::str::Utf8Error> { std::str::from_utf8(&self.data) }

    /// Consume the payload, returning its buffers.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, Option<Bytes>) { (self.data, self.metadata) }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self { Self::from_data(value) }
}

impl From<String> for Payload {
    fn from(value: String) -> Self { Self::from_data(value) }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self { Self::from_data(value) }
}
