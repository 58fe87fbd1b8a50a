//! Numeric error codes carried in ERROR frames.

use std::fmt;

/// Error code taxonomy of the ERROR frame.
///
/// Codes in the `0x001..=0x0FF` range are only valid on stream zero during
/// setup, `0x101..=0x1FF` are connection scoped, and `0x201..` are scoped to a
/// single stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidSetup,
    UnsupportedSetup,
    RejectedSetup,
    RejectedResume,
    ConnectionError,
    ConnectionClose,
    ApplicationError,
    Rejected,
    Canceled,
    Invalid,
    /// Any code outside the defined table, preserved verbatim.
    Other(u32),
}

impl ErrorCode {
    /// Map a wire value onto the taxonomy.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            0x001 => Self::InvalidSetup,
            0x002 => Self::UnsupportedSetup,
            0x003 => Self::RejectedSetup,
            0x004 => Self::RejectedResume,
            0x101 => Self::ConnectionError,
            0x102 => Self::ConnectionClose,
            0x201 => Self::ApplicationError,
            0x202 => Self::Rejected,
            0x203 => Self::Canceled,
            0x204 => Self::Invalid,
            other => Self::Other(other),
        }
    }

    /// Wire value of this code.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::InvalidSetup => 0x001,
            Self::UnsupportedSetup => 0x002,
            Self::RejectedSetup => 0x003,
            Self::RejectedResume => 0x004,
            Self::ConnectionError => 0x101,
            Self::ConnectionClose => 0x102,
            Self::ApplicationError => 0x201,
            Self::Rejected => 0x202,
            Self::Canceled => 0x203,
            Self::Invalid => 0x204,
            Self::Other(value) => value,
        }
    }

    /// Codes that terminate the whole connection when received.
    #[must_use]
    pub const fn is_connection_scoped(self) -> bool { self.as_u32() < 0x200 }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(value) => write!(f, "Other({value:#05x})"),
            named => write!(f, "{}", named.name()),
        }
    }
}

impl ErrorCode {
    fn name(self) -> &'static str {
        match self {
            Self::InvalidSetup => "INVALID_SETUP",
            Self::UnsupportedSetup => "UNSUPPORTED_SETUP",
            Self::RejectedSetup => "REJECTED_SETUP",
            Self::RejectedResume => "REJECTED_RESUME",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::ConnectionClose => "CONNECTION_CLOSE",
            Self::ApplicationError => "APPLICATION_ERROR",
            Self::Rejected => "REJECTED",
            Self::Canceled => "CANCELED",
            Self::Invalid => "INVALID",
            Self::Other(_) => "OTHER",
        }
    }
}
