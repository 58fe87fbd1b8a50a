//! Key/value tags carried under `message/x.rsocket.tags.v0`.
//!
//! A tag is one header byte (top bit set when a value follows, low seven
//! bits the key length), the UTF-8 key, and optionally a one-byte value
//! length plus the UTF-8 value. A tag list is a plain concatenation.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::{MetadataError, take_u8, take_utf8};

const HAS_VALUE: u8 = 0x80;
const KEY_LENGTH_MASK: u8 = 0x7F;

/// A single tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: Option<String>,
}

impl Tag {
    #[must_use]
    pub fn new(key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Append the encoded tag to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::FieldTooLong`] when the key exceeds 127 bytes
    /// or the value exceeds 255 bytes. Nothing is written on error.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), MetadataError> {
        let key_len = u8::try_from(self.key.len())
            .ok()
            .filter(|len| *len <= KEY_LENGTH_MASK)
            .ok_or(MetadataError::FieldTooLong {
                field: "tag key",
                len: self.key.len(),
                max: usize::from(KEY_LENGTH_MASK),
            })?;
        let value_len = self
            .value
            .as_ref()
            .map(|value| {
                u8::try_from(value.len()).map_err(|_| MetadataError::FieldTooLong {
                    field: "tag value",
                    len: value.len(),
                    max: usize::from(u8::MAX),
                })
            })
            .transpose()?;

        let header = if value_len.is_some() { key_len | HAS_VALUE } else { key_len };
        dst.extend_from_slice(&[header]);
        dst.extend_from_slice(self.key.as_bytes());
        if let (Some(len), Some(value)) = (value_len, &self.value) {
            dst.extend_from_slice(&[len]);
            dst.extend_from_slice(value.as_bytes());
        }
        Ok(())
    }

    fn decode(buf: &mut Bytes) -> Result<Self, MetadataError> {
        let header = take_u8(buf)?;
        let key = take_utf8(buf, usize::from(header & KEY_LENGTH_MASK), "tag key")?;
        let value = if header & HAS_VALUE == 0 {
            None
        } else {
            let len = take_u8(buf)?;
            Some(take_utf8(buf, usize::from(len), "tag value")?)
        };
        Ok(Self { key, value })
    }
}

/// Encode a list of tags.
///
/// # Errors
///
/// Fails on the first tag that does not fit; see [`Tag::encode_into`].
pub fn encode<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Result<Bytes, MetadataError> {
    let mut dst = BytesMut::new();
    for tag in tags {
        tag.encode_into(&mut dst)?;
    }
    Ok(dst.freeze())
}

/// Lazily decode a tag list. Iteration never consumes `buf`.
#[must_use]
pub fn iter(buf: &Bytes) -> Tags { Tags { remaining: buf.clone() } }

/// Decode a tag list into a map. Later duplicates win.
///
/// # Errors
///
/// Returns the first decoding error.
pub fn to_map(buf: &Bytes) -> Result<HashMap<String, Option<String>>, MetadataError> {
    iter(buf)
        .map(|tag| tag.map(|Tag { key, value }| (key, value)))
        .collect()
}

/// Iterator over an encoded tag list.
#[derive(Clone, Debug)]
pub struct Tags {
    remaining: Bytes,
}

impl Iterator for Tags {
    type Item = Result<Tag, MetadataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let tag = Tag::decode(&mut self.remaining);
        if tag.is_err() {
            self.remaining.clear();
        }
        Some(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_layout() {
        let bytes = encode(&[Tag::new("k", Some("vv".into())), Tag::new("flag", None)])
            .expect("encode");
        assert_eq!(
            bytes.as_ref(),
            [0x81, b'k', 2, b'v', b'v', 4, b'f', b'l', b'a', b'g']
        );
    }

    #[test]
    fn tag_list_decodes_in_order() {
        let tags = vec![
            Tag::new("region", Some("eu".into())),
            Tag::new("canary", None),
            Tag::new("tier", Some(String::new())),
        ];
        let bytes = encode(&tags).expect("encode");
        let decoded: Vec<Tag> = iter(&bytes).collect::<Result<_, _>>().expect("decode");
        assert_eq!(decoded, tags);
        assert_eq!(iter(&bytes).count(), 3);
    }

    #[test]
    fn map_keeps_last_duplicate() {
        let bytes = encode(&[Tag::new("a", Some("1".into())), Tag::new("a", Some("2".into()))])
            .expect("encode");
        let map = to_map(&bytes).expect("decode");
        assert_eq!(map.get("a"), Some(&Some("2".to_owned())));
    }

    #[test]
    fn oversized_key_and_value_are_rejected() {
        assert!(Tag::new("k".repeat(128), None).encode_into(&mut BytesMut::new()).is_err());
        assert!(
            Tag::new("k", Some("v".repeat(256)))
                .encode_into(&mut BytesMut::new())
                .is_err()
        );
    }
}
