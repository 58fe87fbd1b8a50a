//! Zipkin trace context carried under `message/x.rsocket.tracing-zipkin.v0`.
//!
//! ```text
//! flags(1) | trace id (8 or 16) | span id (8) | [parent id (8)]
//! ```

use bytes::{Bytes, BytesMut};

use super::{MetadataError, take_u8, take_u64};
use crate::byte_order::write_network_u64;

const TRACE_ID_128: u8 = 0x80;
const HAS_PARENT: u8 = 0x40;
const SAMPLING_SET: u8 = 0x20;
const SAMPLED: u8 = 0x10;
const DEBUG: u8 = 0x08;
const REPORT: u8 = 0x04;

/// Trace identifier width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceId {
    Bits64(u64),
    Bits128(u128),
}

/// Decoded trace context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TracingMetadata {
    pub trace_id: TraceId,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    /// `None` leaves the sampling decision to the receiver.
    pub sampled: Option<bool>,
    pub debug: bool,
    /// The receiver should report spans to its tracing system.
    pub report: bool,
}

impl TracingMetadata {
    #[must_use]
    pub fn new(trace_id: TraceId, span_id: u64) -> Self {
        Self {
            trace_id,
            span_id,
            parent_id: None,
            sampled: None,
            debug: false,
            report: false,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut flags = 0u8;
        if matches!(self.trace_id, TraceId::Bits128(_)) {
            flags |= TRACE_ID_128;
        }
        if self.parent_id.is_some() {
            flags |= HAS_PARENT;
        }
        if let Some(sampled) = self.sampled {
            flags |= SAMPLING_SET;
            if sampled {
                flags |= SAMPLED;
            }
        }
        if self.debug {
            flags |= DEBUG;
        }
        if self.report {
            flags |= REPORT;
        }

        let mut dst = BytesMut::with_capacity(33);
        dst.extend_from_slice(&[flags]);
        match self.trace_id {
            TraceId::Bits64(id) => dst.extend_from_slice(&write_network_u64(id)),
            TraceId::Bits128(id) => {
                let high = u64::try_from(id >> 64).unwrap_or(u64::MAX);
                let low = u64::try_from(id & u128::from(u64::MAX)).unwrap_or(u64::MAX);
                dst.extend_from_slice(&write_network_u64(high));
                dst.extend_from_slice(&write_network_u64(low));
            }
        }
        dst.extend_from_slice(&write_network_u64(self.span_id));
        if let Some(parent) = self.parent_id {
            dst.extend_from_slice(&write_network_u64(parent));
        }
        dst.freeze()
    }

    /// Decode a trace context.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Truncated`] when an id the flags announce is
    /// missing.
    pub fn decode(buf: &Bytes) -> Result<Self, MetadataError> {
        let mut buf = buf.clone();
        let flags = take_u8(&mut buf)?;
        let trace_id = if flags & TRACE_ID_128 == 0 {
            TraceId::Bits64(take_u64(&mut buf)?)
        } else {
            let high = u128::from(take_u64(&mut buf)?);
            let low = u128::from(take_u64(&mut buf)?);
            TraceId::Bits128((high << 64) | low)
        };
        let span_id = take_u64(&mut buf)?;
        let parent_id = if flags & HAS_PARENT == 0 {
            None
        } else {
            Some(take_u64(&mut buf)?)
        };
        Ok(Self {
            trace_id,
            span_id,
            parent_id,
            sampled: (flags & SAMPLING_SET != 0).then_some(flags & SAMPLED != 0),
            debug: flags & DEBUG != 0,
            report: flags & REPORT != 0,
        })
    }
}
