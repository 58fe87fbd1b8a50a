//! Composite metadata entries and their concatenation.
//!
//! Each entry is laid out as:
//!
//! ```text
//! +-+-------------+----------------------+-----------------+
//! |W| code / len  | [literal mime type]  | u24 content len | content ...
//! +-+-------------+----------------------+-----------------+
//! ```
//!
//! `W` marks a well-known mime type whose 7-bit code follows; otherwise the
//! seven bits give the length of the literal mime type that follows.

use std::fmt;

use bytes::{Bytes, BytesMut};

use super::{MetadataError, WellKnownMimeType, take, take_u8, take_u24, take_utf8};
use crate::byte_order::{MAX_U24, write_network_u24};

const WELL_KNOWN_FLAG: u8 = 0x80;
const MIME_LENGTH_MASK: u8 = 0x7F;

/// Mime type attached to a composite metadata entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MimeType {
    /// Registered type written as a single byte.
    WellKnown(WellKnownMimeType),
    /// A code with the well-known flag that this registry does not assign.
    Reserved(u8),
    /// Literal ASCII mime type.
    Custom(String),
}

impl MimeType {
    /// Textual form, if the type has one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::WellKnown(mime) => Some(mime.as_str()),
            Self::Reserved(_) => None,
            Self::Custom(mime) => Some(mime),
        }
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), MetadataError> {
        match self {
            Self::WellKnown(mime) => dst.extend_from_slice(&[WELL_KNOWN_FLAG | mime.code()]),
            Self::Reserved(code) => {
                dst.extend_from_slice(&[WELL_KNOWN_FLAG | (code & MIME_LENGTH_MASK)]);
            }
            Self::Custom(mime) => {
                if mime.is_empty() || !mime.is_ascii() {
                    return Err(MetadataError::InvalidMimeType(mime.clone()));
                }
                let len = u8::try_from(mime.len())
                    .ok()
                    .filter(|len| *len <= MIME_LENGTH_MASK)
                    .ok_or(MetadataError::FieldTooLong {
                        field: "mime type",
                        len: mime.len(),
                        max: usize::from(MIME_LENGTH_MASK),
                    })?;
                dst.extend_from_slice(&[len]);
                dst.extend_from_slice(mime.as_bytes());
            }
        }
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, MetadataError> {
        let first = take_u8(buf)?;
        let low = first & MIME_LENGTH_MASK;
        if first & WELL_KNOWN_FLAG != 0 {
            return Ok(WellKnownMimeType::from_code(low)
                .map_or(Self::Reserved(low), Self::WellKnown));
        }
        take_utf8(buf, usize::from(low), "mime type").map(Self::Custom)
    }
}

impl From<WellKnownMimeType> for MimeType {
    fn from(value: WellKnownMimeType) -> Self { Self::WellKnown(value) }
}

/// Registered mime types are compacted to their code.
impl From<&str> for MimeType {
    fn from(value: &str) -> Self {
        WellKnownMimeType::from_mime(value)
            .map_or_else(|| Self::Custom(value.to_owned()), Self::WellKnown)
    }
}

impl fmt::Debug for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WellKnown(mime) => write!(f, "{mime}"),
            Self::Reserved(code) => write!(f, "Reserved({code:#04x})"),
            Self::Custom(mime) => write!(f, "{mime:?}"),
        }
    }
}

/// One decoded composite metadata entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    mime_type: MimeType,
    content: Bytes,
}

impl Entry {
    #[must_use]
    pub fn new(mime_type: impl Into<MimeType>, content: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn mime_type(&self) -> &MimeType { &self.mime_type }

    #[must_use]
    pub fn content(&self) -> &Bytes { &self.content }

    /// Append the encoded entry to `dst`.
    ///
    /// Nothing is written if validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::FieldTooLong`] when the mime type exceeds 127
    /// bytes or the content exceeds 24 bits, and
    /// [`MetadataError::InvalidMimeType`] for an empty or non-ASCII literal.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), MetadataError> {
        let len = u32::try_from(self.content.len())
            .ok()
            .and_then(write_network_u24)
            .ok_or(MetadataError::FieldTooLong {
                field: "entry content",
                len: self.content.len(),
                max: MAX_U24 as usize,
            })?;
        let mut entry = BytesMut::with_capacity(4 + self.content.len());
        self.mime_type.encode(&mut entry)?;
        entry.extend_from_slice(&len);
        entry.extend_from_slice(&self.content);
        dst.extend_from_slice(&entry);
        Ok(())
    }

    /// Encode this entry on its own.
    ///
    /// # Errors
    ///
    /// See [`Entry::encode_into`].
    pub fn encode(&self) -> Result<Bytes, MetadataError> {
        let mut dst = BytesMut::new();
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, MetadataError> {
        let mime_type = MimeType::decode(buf)?;
        let len = take_u24(buf)? as usize;
        let content = take(buf, len)?;
        Ok(Self { mime_type, content })
    }
}

/// A metadata section holding concatenated entries.
///
/// Iteration borrows the underlying buffer, so it can be repeated and never
/// consumes the source.
///
/// # Examples
///
/// ```
/// use rsframe::metadata::{CompositeMetadata, WellKnownMimeType};
///
/// let metadata = CompositeMetadata::builder()
///     .push(WellKnownMimeType::Path, "users.get")?
///     .push("application/x.custom", "v")?
///     .build();
/// assert_eq!(metadata.iter().count(), 2);
/// assert_eq!(metadata.iter().count(), 2);
/// # Ok::<(), rsframe::metadata::MetadataError>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeMetadata {
    buf: Bytes,
}

impl CompositeMetadata {
    /// Wrap an encoded metadata section.
    #[must_use]
    pub fn new(buf: Bytes) -> Self { Self { buf } }

    #[must_use]
    pub fn builder() -> CompositeMetadataBuilder { CompositeMetadataBuilder::default() }

    /// Lazily decode the entries in order.
    #[must_use]
    pub fn iter(&self) -> Entries {
        Entries {
            remaining: self.buf.clone(),
        }
    }

    /// First entry whose mime type matches `mime_type`.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error met before a match.
    pub fn find(&self, mime_type: &MimeType) -> Result<Option<Entry>, MetadataError> {
        for entry in self.iter() {
            let entry = entry?;
            if entry.mime_type() == mime_type {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &Bytes { &self.buf }

    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.buf }
}

impl<'a> IntoIterator for &'a CompositeMetadata {
    type Item = Result<Entry, MetadataError>;
    type IntoIter = Entries;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

/// Iterator over the entries of a [`CompositeMetadata`].
///
/// A malformed entry yields one error and ends iteration.
#[derive(Clone, Debug)]
pub struct Entries {
    remaining: Bytes,
}

impl Iterator for Entries {
    type Item = Result<Entry, MetadataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let result = Entry::decode(&mut self.remaining);
        if result.is_err() {
            self.remaining.clear();
        }
        Some(result)
    }
}

/// Accumulates entries into a [`CompositeMetadata`].
#[derive(Debug, Default)]
pub struct CompositeMetadataBuilder {
    buf: BytesMut,
}

impl CompositeMetadataBuilder {
    /// Append an entry.
    ///
    /// # Errors
    ///
    /// See [`Entry::encode_into`]. A rejected entry leaves the builder
    /// unchanged.
    pub fn push(
        mut self,
        mime_type: impl Into<MimeType>,
        content: impl Into<Bytes>,
    ) -> Result<Self, MetadataError> {
        Entry::new(mime_type, content).encode_into(&mut self.buf)?;
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> CompositeMetadata { CompositeMetadata::new(self.buf.freeze()) }
}
