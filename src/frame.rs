//! Frame model and binary codec.
//!
//! A [`Frame`] pairs a stream id with a typed [`FrameBody`]. Flags are
//! derived from the body when encoding, so a built frame cannot disagree
//! with its own header. [`Frame::encode`] and [`Frame::decode`] live in the
//! `codec` submodule.

mod codec;
mod error;
mod error_code;
mod header;

use std::time::Duration;

use bytes::Bytes;
pub use error::FrameError;
pub use error_code::ErrorCode;
pub use header::{Flags, FrameHeader, FrameType, HEADER_SIZE, MAX_STREAM_ID};

use crate::payload::Payload;

/// Request-N value meaning "unbounded credit".
pub const REQUEST_MAX: u32 = 0x7FFF_FFFF;

/// Protocol version written in SETUP frames.
pub const PROTOCOL_VERSION: (u16, u16) = (1, 0);

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    stream_id: u32,
    body: FrameBody,
}

/// Type-specific frame contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameBody {
    Setup(SetupFrame),
    Lease(LeaseFrame),
    KeepAlive(KeepAliveFrame),
    RequestResponse(Payload),
    RequestFnf(Payload),
    RequestStream {
        initial_request_n: u32,
        payload: Payload,
    },
    RequestChannel {
        initial_request_n: u32,
        payload: Payload,
        /// No further frames follow from the requester on this stream.
        complete: bool,
    },
    RequestN(u32),
    Cancel,
    Payload(PayloadFrame),
    Error(ErrorFrame),
    MetadataPush(Bytes),
}

/// Connection setup parameters sent by the client as its first frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupFrame {
    pub major_version: u16,
    pub minor_version: u16,
    pub keepalive_interval: Duration,
    pub max_lifetime: Duration,
    /// Present when the client asked for resumption.
    pub resume_token: Option<Bytes>,
    /// The client will honour LEASE frames.
    pub lease: bool,
    pub metadata_mime_type: String,
    pub data_mime_type: String,
    pub payload: Payload,
}

/// Lease grant from a responder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseFrame {
    pub ttl: Duration,
    pub number_of_requests: u32,
    pub metadata: Option<Bytes>,
}

/// Liveness probe or its acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeepAliveFrame {
    /// The peer must answer with a KEEPALIVE of its own.
    pub respond: bool,
    pub last_received_position: u64,
    pub data: Bytes,
}

/// NEXT, COMPLETE, or NEXT_COMPLETE.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadFrame {
    pub payload: Payload,
    pub next: bool,
    pub complete: bool,
}

/// Error code and UTF-8 message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFrame {
    pub code: ErrorCode,
    pub message: String,
}

impl Frame {
    /// Pair `body` with `stream_id`.
    #[must_use]
    pub fn new(stream_id: u32, body: FrameBody) -> Self { Self { stream_id, body } }

    #[must_use]
    pub fn stream_id(&self) -> u32 { self.stream_id }

    #[must_use]
    pub fn body(&self) -> &FrameBody { &self.body }

    #[must_use]
    pub fn into_body(self) -> FrameBody { self.body }

    /// Wire type of this frame.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match &self.body {
            FrameBody::Setup(_) => FrameType::Setup,
            FrameBody::Lease(_) => FrameType::Lease,
            FrameBody::KeepAlive(_) => FrameType::KeepAlive,
            FrameBody::RequestResponse(_) => FrameType::RequestResponse,
            FrameBody::RequestFnf(_) => FrameType::RequestFnf,
            FrameBody::RequestStream { .. } => FrameType::RequestStream,
            FrameBody::RequestChannel { .. } => FrameType::RequestChannel,
            FrameBody::RequestN(_) => FrameType::RequestN,
            FrameBody::Cancel => FrameType::Cancel,
            FrameBody::Payload(_) => FrameType::Payload,
            FrameBody::Error(_) => FrameType::Error,
            FrameBody::MetadataPush(_) => FrameType::MetadataPush,
        }
    }

    /// Header flags implied by the body.
    #[must_use]
    pub fn flags(&self) -> Flags {
        let flags = Flags::empty();
        match &self.body {
            FrameBody::Setup(setup) => flags
                .with_if(Flags::METADATA, setup.payload.has_metadata())
                .with_if(Flags::RESUME_ENABLE, setup.resume_token.is_some())
                .with_if(Flags::LEASE, setup.lease),
            FrameBody::Lease(lease) => flags.with_if(Flags::METADATA, lease.metadata.is_some()),
            FrameBody::KeepAlive(keepalive) => flags.with_if(Flags::RESPOND, keepalive.respond),
            FrameBody::RequestResponse(payload)
            | FrameBody::RequestFnf(payload)
            | FrameBody::RequestStream { payload, .. } => {
                flags.with_if(Flags::METADATA, payload.has_metadata())
            }
            FrameBody::RequestChannel {
                payload, complete, ..
            } => flags
                .with_if(Flags::METADATA, payload.has_metadata())
                .with_if(Flags::COMPLETE, *complete),
            FrameBody::Payload(frame) => flags
                .with_if(Flags::METADATA, frame.payload.has_metadata())
                .with_if(Flags::NEXT, frame.next)
                .with_if(Flags::COMPLETE, frame.complete),
            FrameBody::MetadataPush(_) => Flags::METADATA,
            FrameBody::RequestN(_) | FrameBody::Cancel | FrameBody::Error(_) => flags,
        }
    }

    /// Decoded header view of this frame.
    #[must_use]
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            stream_id: self.stream_id,
            frame_type: self.frame_type(),
            flags: self.flags(),
        }
    }

    #[must_use]
    pub fn setup(setup: SetupFrame) -> Self { Self::new(0, FrameBody::Setup(setup)) }

    #[must_use]
    pub fn lease(ttl: Duration, number_of_requests: u32, metadata: Option<Bytes>) -> Self {
        Self::new(
            0,
            FrameBody::Lease(LeaseFrame {
                ttl,
                number_of_requests,
                metadata,
            }),
        )
    }

    #[must_use]
    pub fn keepalive(respond: bool, last_received_position: u64, data: Bytes) -> Self {
        Self::new(
            0,
            FrameBody::KeepAlive(KeepAliveFrame {
                respond,
                last_received_position,
                data,
            }),
        )
    }

    #[must_use]
    pub fn request_response(stream_id: u32, payload: Payload) -> Self {
        Self::new(stream_id, FrameBody::RequestResponse(payload))
    }

    #[must_use]
    pub fn request_fnf(stream_id: u32, payload: Payload) -> Self {
        Self::new(stream_id, FrameBody::RequestFnf(payload))
    }

    #[must_use]
    pub fn request_stream(stream_id: u32, initial_request_n: u32, payload: Payload) -> Self {
        Self::new(
            stream_id,
            FrameBody::RequestStream {
                initial_request_n,
                payload,
            },
        )
    }

    #[must_use]
    pub fn request_channel(
        stream_id: u32,
        initial_request_n: u32,
        payload: Payload,
        complete: bool,
    ) -> Self {
        Self::new(
            stream_id,
            FrameBody::RequestChannel {
                initial_request_n,
                payload,
                complete,
            },
        )
    }

    #[must_use]
    pub fn request_n(stream_id: u32, n: u32) -> Self {
        Self::new(stream_id, FrameBody::RequestN(n))
    }

    #[must_use]
    pub fn cancel(stream_id: u32) -> Self { Self::new(stream_id, FrameBody::Cancel) }

    /// PAYLOAD with the NEXT flag.
    #[must_use]
    pub fn next(stream_id: u32, payload: Payload) -> Self {
        Self::payload(stream_id, payload, true, false)
    }

    /// PAYLOAD with the COMPLETE flag and no value.
    #[must_use]
    pub fn complete(stream_id: u32) -> Self {
        Self::payload(stream_id, Payload::default(), false, true)
    }

    /// PAYLOAD with both NEXT and COMPLETE.
    #[must_use]
    pub fn next_complete(stream_id: u32, payload: Payload) -> Self {
        Self::payload(stream_id, payload, true, true)
    }

    fn payload(stream_id: u32, payload: Payload, next: bool, complete: bool) -> Self {
        Self::new(
            stream_id,
            FrameBody::Payload(PayloadFrame {
                payload,
                next,
                complete,
            }),
        )
    }

    #[must_use]
    pub fn error(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            stream_id,
            FrameBody::Error(ErrorFrame {
                code,
                message: message.into(),
            }),
        )
    }

    #[must_use]
    pub fn metadata_push(metadata: Bytes) -> Self {
        Self::new(0, FrameBody::MetadataPush(metadata))
    }
}
