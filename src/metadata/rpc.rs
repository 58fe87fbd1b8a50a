//! RPC call descriptors carried under `message/x.rsocket.rpc.v0`.
//!
//! Layout: u16 version, u16 service length, service, u16 method length,
//! method. Versions are limited to fifteen bits.

use bytes::{Bytes, BytesMut};

use super::{MetadataError, take_u16, take_utf8};
use crate::byte_order::write_network_u16;

const VERSION_MASK: u16 = 0x7FFF;

/// Service and method addressed by an RPC-style request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcMetadata {
    pub version: u16,
    pub service: String,
    pub method: String,
}

impl RpcMetadata {
    #[must_use]
    pub fn new(version: u16, service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            version,
            service: service.into(),
            method: method.into(),
        }
    }

    /// Encode the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::VersionOutOfRange`] for versions above
    /// `i16::MAX` and [`MetadataError::FieldTooLong`] for names longer than
    /// `u16::MAX` bytes.
    pub fn encode(&self) -> Result<Bytes, MetadataError> {
        if self.version > VERSION_MASK {
            return Err(MetadataError::VersionOutOfRange(self.version));
        }
        let service_len = short_len(&self.service, "rpc service")?;
        let method_len = short_len(&self.method, "rpc method")?;
        let mut dst = BytesMut::with_capacity(6 + self.service.len() + self.method.len());
        dst.extend_from_slice(&write_network_u16(self.version));
        dst.extend_from_slice(&write_network_u16(service_len));
        dst.extend_from_slice(self.service.as_bytes());
        dst.extend_from_slice(&write_network_u16(method_len));
        dst.extend_from_slice(self.method.as_bytes());
        Ok(dst.freeze())
    }

    /// Decode a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Truncated`] or
    /// [`MetadataError::InvalidUtf8`] for malformed input.
    pub fn decode(buf: &Bytes) -> Result<Self, MetadataError> {
        let mut buf = buf.clone();
        let version = take_u16(&mut buf)? & VERSION_MASK;
        let service_len = usize::from(take_u16(&mut buf)?);
        let service = take_utf8(&mut buf, service_len, "rpc service")?;
        let method_len = usize::from(take_u16(&mut buf)?);
        let method = take_utf8(&mut buf, method_len, "rpc method")?;
        Ok(Self {
            version,
            service,
            method,
        })
    }
}

fn short_len(value: &str, field: &'static str) -> Result<u16, MetadataError> {
    u16::try_from(value.len()).map_err(|_| MetadataError::FieldTooLong {
        field,
        len: value.len(),
        max: usize::from(u16::MAX),
    })
}
