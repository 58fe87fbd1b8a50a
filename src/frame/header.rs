//! Fixed frame header: stream id, frame type, and flag bits.
//!
//! Every frame starts with six bytes: a 31-bit stream id (the top bit is
//! reserved and always zero) followed by a 16-bit word holding the 6-bit
//! frame type in its high bits and 10 flag bits below it.

use std::{fmt, ops::BitOr};

use super::FrameError;
use crate::byte_order::{read_network_u16, read_network_u32, write_network_u16, write_network_u32};

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest stream id representable in the 31-bit field.
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

const FRAME_TYPE_SHIFT: u16 = 10;
const FLAGS_MASK: u16 = 0x03FF;

/// Wire frame types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameType {
    Setup,
    Lease,
    KeepAlive,
    RequestResponse,
    RequestFnf,
    RequestStream,
    RequestChannel,
    RequestN,
    Cancel,
    Payload,
    Error,
    MetadataPush,
    Resume,
    ResumeOk,
    Ext,
}

impl FrameType {
    /// Decode a 6-bit frame type code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        let frame_type = match code {
            0x01 => Self::Setup,
            0x02 => Self::Lease,
            0x03 => Self::KeepAlive,
            0x04 => Self::RequestResponse,
            0x05 => Self::RequestFnf,
            0x06 => Self::RequestStream,
            0x07 => Self::RequestChannel,
            0x08 => Self::RequestN,
            0x09 => Self::Cancel,
            0x0A => Self::Payload,
            0x0B => Self::Error,
            0x0C => Self::MetadataPush,
            0x0D => Self::Resume,
            0x0E => Self::ResumeOk,
            0x3F => Self::Ext,
            _ => return None,
        };
        Some(frame_type)
    }

    /// Return the 6-bit wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Setup => 0x01,
            Self::Lease => 0x02,
            Self::KeepAlive => 0x03,
            Self::RequestResponse => 0x04,
            Self::RequestFnf => 0x05,
            Self::RequestStream => 0x06,
            Self::RequestChannel => 0x07,
            Self::RequestN => 0x08,
            Self::Cancel => 0x09,
            Self::Payload => 0x0A,
            Self::Error => 0x0B,
            Self::MetadataPush => 0x0C,
            Self::Resume => 0x0D,
            Self::ResumeOk => 0x0E,
            Self::Ext => 0x3F,
        }
    }

    /// Frames that only ever travel on stream zero.
    #[must_use]
    pub const fn is_connection_scoped(self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::Lease
                | Self::KeepAlive
                | Self::MetadataPush
                | Self::Resume
                | Self::ResumeOk
        )
    }

    /// Frames that open a stream.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::RequestResponse | Self::RequestFnf | Self::RequestStream | Self::RequestChannel
        )
    }

    /// Frames that may carry a length-prefixed metadata section.
    #[must_use]
    pub const fn can_have_metadata(self) -> bool {
        matches!(
            self,
            Self::Setup
                | Self::RequestResponse
                | Self::RequestFnf
                | Self::RequestStream
                | Self::RequestChannel
                | Self::Payload
        )
    }
}

/// The 10 flag bits of a frame header.
///
/// Bit meanings are type specific; the shared constants name the common
/// ones.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags(u16);

impl Flags {
    /// Receiver may ignore the frame if it does not understand it.
    pub const IGNORE: Self = Self(0x200);
    /// A metadata section is present.
    pub const METADATA: Self = Self(0x100);
    /// More fragments follow.
    pub const FOLLOWS: Self = Self(0x080);
    /// KEEPALIVE: the peer must answer.
    pub const RESPOND: Self = Self(0x080);
    /// SETUP: the client requests resumption.
    pub const RESUME_ENABLE: Self = Self(0x080);
    /// SETUP: the client honours LEASE frames.
    pub const LEASE: Self = Self(0x040);
    /// PAYLOAD / REQUEST_CHANNEL: the sending direction is complete.
    pub const COMPLETE: Self = Self(0x040);
    /// PAYLOAD: the frame carries a value.
    pub const NEXT: Self = Self(0x020);

    /// Empty flag set.
    #[must_use]
    pub const fn empty() -> Self { Self(0) }

    /// Build from raw bits, discarding anything above the 10-bit field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self { Self(bits & FLAGS_MASK) }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u16 { self.0 }

    /// Report whether every bit in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    /// Return a copy with `other` set when `enabled` is true.
    #[must_use]
    pub const fn with_if(self, other: Self, enabled: bool) -> Self {
        if enabled { Self(self.0 | other.0) } else { self }
    }
}

impl BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output { Self(self.0 | rhs.0) }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Flags({:#05x})", self.0) }
}

/// Decoded fixed header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub stream_id: u32,
    pub frame_type: FrameType,
    pub flags: Flags,
}

impl FrameHeader {
    /// Parse the header at the start of `src` without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] when fewer than [`HEADER_SIZE`]
    /// bytes are available and [`FrameError::UnknownFrameType`] for codes
    /// outside the known table.
    pub fn peek(src: &[u8]) -> Result<Self, FrameError> {
        let Some(&[a, b, c, d, e, f]) = src.first_chunk::<HEADER_SIZE>() else {
            return Err(FrameError::Truncated {
                needed: HEADER_SIZE - src.len(),
            });
        };
        let stream_id = read_network_u32([a, b, c, d]) & MAX_STREAM_ID;
        let word = read_network_u16([e, f]);
        let code = u8::try_from(word >> FRAME_TYPE_SHIFT).unwrap_or(u8::MAX);
        let frame_type = FrameType::from_code(code).ok_or(FrameError::UnknownFrameType(code))?;
        Ok(Self {
            stream_id,
            frame_type,
            flags: Flags::from_bits(word),
        })
    }

    /// Serialise the header into its six wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::StreamIdOutOfRange`] if the id uses the
    /// reserved top bit.
    pub fn to_bytes(self) -> Result<[u8; HEADER_SIZE], FrameError> {
        if self.stream_id > MAX_STREAM_ID {
            return Err(FrameError::StreamIdOutOfRange(self.stream_id));
        }
        let [a, b, c, d] = write_network_u32(self.stream_id);
        let word = (u16::from(self.frame_type.code()) << FRAME_TYPE_SHIFT) | self.flags.bits();
        let [e, f] = write_network_u16(word);
        Ok([a, b, c, d, e, f])
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FrameType::Setup)]
    #[case(FrameType::KeepAlive)]
    #[case(FrameType::RequestChannel)]
    #[case(FrameType::Payload)]
    #[case(FrameType::Ext)]
    fn frame_type_codes_round_trip(#[case] frame_type: FrameType) {
        assert_eq!(FrameType::from_code(frame_type.code()), Some(frame_type));
    }

    #[test]
    fn header_packs_type_above_flags() {
        let header = FrameHeader {
            stream_id: 5,
            frame_type: FrameType::Payload,
            flags: Flags::NEXT | Flags::COMPLETE,
        };
        let bytes = header.to_bytes().expect("valid header");
        assert_eq!(bytes, [0, 0, 0, 5, 0x28, 0x60]);
        assert_eq!(FrameHeader::peek(&bytes).expect("decode"), header);
    }

    #[test]
    fn reserved_stream_bit_is_ignored_on_read() {
        let bytes = [0x80, 0, 0, 1, 0x24, 0];
        let header = FrameHeader::peek(&bytes).expect("decode");
        assert_eq!(header.stream_id, 1);
        assert_eq!(header.frame_type, FrameType::Cancel);
    }

    #[test]
    fn stream_id_with_reserved_bit_is_rejected_on_write() {
        let header = FrameHeader {
            stream_id: 0x8000_0001,
            frame_type: FrameType::Cancel,
            flags: Flags::empty(),
        };
        assert_eq!(
            header.to_bytes(),
            Err(FrameError::StreamIdOutOfRange(0x8000_0001))
        );
    }

    #[test]
    fn short_input_reports_missing_bytes() {
        assert_eq!(
            FrameHeader::peek(&[0, 0, 0]),
            Err(FrameError::Truncated { needed: 3 })
        );
    }
}
