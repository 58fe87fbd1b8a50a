//! Binary encoding and decoding of [`Frame`]s.
//!
//! Decoding works on an owned [`Bytes`] handle: every field that carries
//! bytes is a zero-copy slice of the input, and the caller's buffer is
//! never advanced.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use super::{
    ErrorCode,
    ErrorFrame,
    Flags,
    Frame,
    FrameBody,
    FrameError,
    FrameHeader,
    FrameType,
    HEADER_SIZE,
    KeepAliveFrame,
    LeaseFrame,
    PayloadFrame,
    REQUEST_MAX,
    SetupFrame,
};
use crate::{
    byte_order::{
        MAX_U24,
        read_network_u16,
        read_network_u24,
        read_network_u32,
        read_network_u64,
        write_network_u16,
        write_network_u24,
        write_network_u32,
        write_network_u64,
    },
    payload::Payload,
};

impl Frame {
    /// Encode the frame into a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if a field violates its wire constraints,
    /// for example metadata longer than 24 bits, a zero request-N, or a
    /// connection-scoped frame addressed to a non-zero stream.
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        let header = self.header();
        check_stream_scope(header.frame_type, header.stream_id)?;
        let mut dst = BytesMut::with_capacity(HEADER_SIZE + self.body_size_hint());
        dst.extend_from_slice(&header.to_bytes()?);
        match self.body() {
            FrameBody::Setup(setup) => encode_setup(setup, &mut dst)?,
            FrameBody::Lease(lease) => {
                dst.extend_from_slice(&write_network_u32(millis(lease.ttl, "lease ttl")?));
                dst.extend_from_slice(&write_network_u32(lease.number_of_requests));
                if let Some(metadata) = &lease.metadata {
                    dst.extend_from_slice(metadata);
                }
            }
            FrameBody::KeepAlive(keepalive) => {
                dst.extend_from_slice(&write_network_u64(keepalive.last_received_position));
                dst.extend_from_slice(&keepalive.data);
            }
            FrameBody::RequestResponse(payload) | FrameBody::RequestFnf(payload) => {
                encode_payload(payload, &mut dst)?;
            }
            FrameBody::RequestStream {
                initial_request_n,
                payload,
            }
            | FrameBody::RequestChannel {
                initial_request_n,
                payload,
                ..
            } => {
                dst.extend_from_slice(&write_network_u32(check_request_n(*initial_request_n)?));
                encode_payload(payload, &mut dst)?;
            }
            FrameBody::RequestN(n) => {
                dst.extend_from_slice(&write_network_u32(check_request_n(*n)?));
            }
            FrameBody::Cancel => {}
            FrameBody::Payload(frame) => encode_payload(&frame.payload, &mut dst)?,
            FrameBody::Error(error) => {
                dst.extend_from_slice(&write_network_u32(error.code.as_u32()));
                dst.extend_from_slice(error.message.as_bytes());
            }
            FrameBody::MetadataPush(metadata) => dst.extend_from_slice(metadata),
        }
        Ok(dst.freeze())
    }

    /// Decode a complete frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] when the header is unknown, the body is
    /// truncated or malformed, or the frame uses fragmentation or
    /// resumption.
    pub fn decode(src: &Bytes) -> Result<Self, FrameError> {
        let header = FrameHeader::peek(src)?;
        let mut reader = Reader::new(src.slice(HEADER_SIZE..));
        let flags = header.flags;
        check_stream_scope(header.frame_type, header.stream_id)?;
        if header.frame_type.can_have_metadata()
            && header.frame_type != FrameType::Setup
            && flags.contains(Flags::FOLLOWS)
        {
            return Err(FrameError::FragmentationUnsupported);
        }

        let body = match header.frame_type {
            FrameType::Setup => FrameBody::Setup(decode_setup(flags, &mut reader)?),
            FrameType::Lease => {
                let ttl = Duration::from_millis(u64::from(reader.u32()?));
                let number_of_requests = reader.u32()?;
                let rest = reader.rest();
                FrameBody::Lease(LeaseFrame {
                    ttl,
                    number_of_requests,
                    metadata: flags.contains(Flags::METADATA).then_some(rest),
                })
            }
            FrameType::KeepAlive => FrameBody::KeepAlive(KeepAliveFrame {
                respond: flags.contains(Flags::RESPOND),
                last_received_position: reader.u64()?,
                data: reader.rest(),
            }),
            FrameType::RequestResponse => {
                FrameBody::RequestResponse(decode_payload(flags, &mut reader)?)
            }
            FrameType::RequestFnf => FrameBody::RequestFnf(decode_payload(flags, &mut reader)?),
            FrameType::RequestStream => FrameBody::RequestStream {
                initial_request_n: read_request_n(&mut reader)?,
                payload: decode_payload(flags, &mut reader)?,
            },
            FrameType::RequestChannel => FrameBody::RequestChannel {
                initial_request_n: read_request_n(&mut reader)?,
                payload: decode_payload(flags, &mut reader)?,
                complete: flags.contains(Flags::COMPLETE),
            },
            FrameType::RequestN => FrameBody::RequestN(read_request_n(&mut reader)?),
            FrameType::Cancel => FrameBody::Cancel,
            FrameType::Payload => {
                let next = flags.contains(Flags::NEXT);
                let complete = flags.contains(Flags::COMPLETE);
                if !next && !complete {
                    return Err(FrameError::EmptyPayloadFrame);
                }
                FrameBody::Payload(PayloadFrame {
                    payload: decode_payload(flags, &mut reader)?,
                    next,
                    complete,
                })
            }
            FrameType::Error => {
                let code = ErrorCode::from_u32(reader.u32()?);
                let message = utf8(reader.rest(), "error message")?;
                FrameBody::Error(ErrorFrame { code, message })
            }
            FrameType::MetadataPush => FrameBody::MetadataPush(reader.rest()),
            FrameType::Resume | FrameType::ResumeOk | FrameType::Ext => {
                return Err(FrameError::UnsupportedFrameType {
                    frame_type: header.frame_type,
                    ignorable: flags.contains(Flags::IGNORE),
                });
            }
        };
        Ok(Self::new(header.stream_id, body))
    }

    fn body_size_hint(&self) -> usize {
        match self.body() {
            FrameBody::Setup(setup) => 64 + payload_len(&setup.payload),
            FrameBody::RequestResponse(payload)
            | FrameBody::RequestFnf(payload)
            | FrameBody::RequestStream { payload, .. }
            | FrameBody::RequestChannel { payload, .. } => 4 + payload_len(payload),
            FrameBody::Payload(frame) => payload_len(&frame.payload),
            FrameBody::Error(error) => 4 + error.message.len(),
            FrameBody::MetadataPush(metadata) => metadata.len(),
            FrameBody::KeepAlive(keepalive) => 8 + keepalive.data.len(),
            FrameBody::Lease(_) | FrameBody::RequestN(_) | FrameBody::Cancel => 8,
        }
    }
}

fn payload_len(payload: &Payload) -> usize {
    3 + payload.data().len() + payload.metadata().map_or(0, Bytes::len)
}

fn check_stream_scope(frame_type: FrameType, stream_id: u32) -> Result<(), FrameError> {
    let valid = match frame_type {
        t if t.is_connection_scoped() => stream_id == 0,
        FrameType::Error | FrameType::Ext => true,
        _ => stream_id != 0,
    };
    if valid {
        Ok(())
    } else {
        Err(FrameError::InvalidStreamId {
            frame_type,
            stream_id,
        })
    }
}

fn check_request_n(n: u32) -> Result<u32, FrameError> {
    match n {
        0 => Err(FrameError::ZeroRequestN),
        n => Ok(n.min(REQUEST_MAX)),
    }
}

fn read_request_n(reader: &mut Reader) -> Result<u32, FrameError> { check_request_n(reader.u32()?) }

fn millis(duration: Duration, field: &'static str) -> Result<u32, FrameError> {
    u32::try_from(duration.as_millis()).map_err(|_| FrameError::ValueOutOfRange { field })
}

fn encode_payload(payload: &Payload, dst: &mut BytesMut) -> Result<(), FrameError> {
    if let Some(metadata) = payload.metadata() {
        let len = u32::try_from(metadata.len())
            .ok()
            .and_then(write_network_u24)
            .ok_or(FrameError::FieldTooLong {
                field: "metadata",
                len: metadata.len(),
                max: MAX_U24 as usize,
            })?;
        dst.extend_from_slice(&len);
        dst.extend_from_slice(metadata);
    }
    dst.extend_from_slice(payload.data());
    Ok(())
}

fn decode_payload(flags: Flags, reader: &mut Reader) -> Result<Payload, FrameError> {
    let metadata = if flags.contains(Flags::METADATA) {
        let len = reader.u24()? as usize;
        Some(reader.take(len)?)
    } else {
        None
    };
    Ok(Payload::new(reader.rest(), metadata))
}

fn encode_mime(mime: &str, field: &'static str, dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = u8::try_from(mime.len()).map_err(|_| FrameError::FieldTooLong {
        field,
        len: mime.len(),
        max: usize::from(u8::MAX),
    })?;
    dst.extend_from_slice(&[len]);
    dst.extend_from_slice(mime.as_bytes());
    Ok(())
}

fn encode_setup(setup: &SetupFrame, dst: &mut BytesMut) -> Result<(), FrameError> {
    dst.extend_from_slice(&write_network_u16(setup.major_version));
    dst.extend_from_slice(&write_network_u16(setup.minor_version));
    dst.extend_from_slice(&write_network_u32(millis(
        setup.keepalive_interval,
        "keepalive interval",
    )?));
    dst.extend_from_slice(&write_network_u32(millis(setup.max_lifetime, "max lifetime")?));
    if let Some(token) = &setup.resume_token {
        let len = u16::try_from(token.len()).map_err(|_| FrameError::FieldTooLong {
            field: "resume token",
            len: token.len(),
            max: usize::from(u16::MAX),
        })?;
        dst.extend_from_slice(&write_network_u16(len));
        dst.extend_from_slice(token);
    }
    encode_mime(&setup.metadata_mime_type, "metadata mime type", dst)?;
    encode_mime(&setup.data_mime_type, "data mime type", dst)?;
    encode_payload(&setup.payload, dst)
}

fn decode_setup(flags: Flags, reader: &mut Reader) -> Result<SetupFrame, FrameError> {
    let major_version = reader.u16()?;
    let minor_version = reader.u16()?;
    let keepalive_interval = Duration::from_millis(u64::from(reader.u32()?));
    let max_lifetime = Duration::from_millis(u64::from(reader.u32()?));
    let resume_token = if flags.contains(Flags::RESUME_ENABLE) {
        let len = usize::from(reader.u16()?);
        Some(reader.take(len)?)
    } else {
        None
    };
    let metadata_len = usize::from(reader.u8()?);
    let metadata_mime_type = utf8(reader.take(metadata_len)?, "metadata mime type")?;
    let data_len = usize::from(reader.u8()?);
    let data_mime_type = utf8(reader.take(data_len)?, "data mime type")?;
    Ok(SetupFrame {
        major_version,
        minor_version,
        keepalive_interval,
        max_lifetime,
        resume_token,
        lease: flags.contains(Flags::LEASE),
        metadata_mime_type,
        data_mime_type,
        payload: decode_payload(flags, reader)?,
    })
}

fn utf8(bytes: Bytes, field: &'static str) -> Result<String, FrameError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::InvalidUtf8 { field })
}

/// Bounds-checked cursor over a frame body.
struct Reader {
    buf: Bytes,
}

impl Reader {
    fn new(buf: Bytes) -> Self { Self { buf } }

    fn take(&mut self, len: usize) -> Result<Bytes, FrameError> {
        if self.buf.len() < len {
            return Err(FrameError::Truncated {
                needed: len - self.buf.len(),
            });
        }
        Ok(self.buf.split_to(len))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FrameError> {
        let [byte] = self.array::<1>()?;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, FrameError> { Ok(read_network_u16(self.array()?)) }

    fn u24(&mut self) -> Result<u32, FrameError> { Ok(read_network_u24(self.array()?)) }

    fn u32(&mut self) -> Result<u32, FrameError> { Ok(read_network_u32(self.array()?)) }

    fn u64(&mut self) -> Result<u64, FrameError> { Ok(read_network_u64(self.array()?)) }

    /// Take everything that is left.
    fn rest(&mut self) -> Bytes { std::mem::take(&mut self.buf) }
}
