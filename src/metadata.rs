//! Composite metadata and its sub-formats.
//!
//! A metadata section may hold several self-delimiting entries, each tagged
//! with a mime type. Well-known mime types are written as a single byte;
//! other types are spelled out. Entry payloads may themselves use one of the
//! extension formats in this module: [`tag`] lists, [`path`] routes,
//! [`rpc`] call descriptors, and [`zipkin`] tracing headers.

mod composite;
mod error;
mod mime;
pub mod path;
pub mod rpc;
pub mod tag;
pub mod zipkin;

use bytes::Bytes;
pub use composite::{CompositeMetadata, CompositeMetadataBuilder, Entries, Entry, MimeType};
pub use error::MetadataError;
pub use mime::WellKnownMimeType;

use crate::byte_order::{read_network_u16, read_network_u24, read_network_u64};

/// Split `len` bytes off the front of `buf`.
fn take(buf: &mut Bytes, len: usize) -> Result<Bytes, MetadataError> {
    if buf.len() < len {
        return Err(MetadataError::Truncated {
            needed: len - buf.len(),
        });
    }
    Ok(buf.split_to(len))
}

fn take_array<const N: usize>(buf: &mut Bytes) -> Result<[u8; N], MetadataError> {
    let bytes = take(buf, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn take_u8(buf: &mut Bytes) -> Result<u8, MetadataError> {
    let [byte] = take_array::<1>(buf)?;
    Ok(byte)
}

fn take_u16(buf: &mut Bytes) -> Result<u16, MetadataError> {
    take_array(buf).map(read_network_u16)
}

fn take_u24(buf: &mut Bytes) -> Result<u32, MetadataError> {
    take_array(buf).map(read_network_u24)
}

fn take_u64(buf: &mut Bytes) -> Result<u64, MetadataError> {
    take_array(buf).map(read_network_u64)
}

fn take_utf8(buf: &mut Bytes, len: usize, field: &'static str) -> Result<String, MetadataError> {
    let bytes = take(buf, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| MetadataError::InvalidUtf8 { field })
}
