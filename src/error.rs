//! Canonical error type for connections and streams.
//!
//! [`RSocketError`] covers both locally raised failures and errors received
//! in ERROR frames. Connection-scoped variants terminate every stream on the
//! connection; the rest are confined to a single stream.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

use crate::frame::{ErrorCode, Frame, FrameError};

/// Errors surfaced by requesters, responders, and connection setup.
///
/// Cloneable so one teardown cause can be delivered to every pending stream.
#[derive(Clone, Debug, Error)]
pub enum RSocketError {
    /// Fatal connection failure, local or signalled by the peer.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection was disposed while the stream was still live.
    #[error("connection closed")]
    ConnectionClosed,

    /// Error produced by an application handler.
    #[error("application error ({code:?}): {message}")]
    Application { code: ErrorCode, message: String },

    /// The responder refused the SETUP frame.
    #[error("setup rejected: {0}")]
    RejectedSetup(String),

    /// The SETUP frame was malformed or missing.
    #[error("invalid setup: {0}")]
    InvalidSetup(String),

    /// The SETUP frame asked for something the responder does not support.
    #[error("unsupported setup: {0}")]
    UnsupportedSetup(String),

    /// The responder declined the request without processing it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The stream was cancelled.
    #[error("stream canceled: {0}")]
    Canceled(String),

    /// The request was invalid.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Encoding(#[from] FrameError),

    /// The peer sent a frame that is not valid in the current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No keepalive acknowledgement arrived in time.
    #[error("No keep-alive acks for {} ms", .0.as_millis())]
    Timeout(Duration),

    /// Transport failure.
    #[error("transport error: {0}")]
    Io(#[source] Arc<io::Error>),
}

impl From<io::Error> for RSocketError {
    fn from(error: io::Error) -> Self { Self::Io(Arc::new(error)) }
}

impl RSocketError {
    /// Build an application error with the generic APPLICATION_ERROR code.
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::Application {
            code: ErrorCode::ApplicationError,
            message: message.into(),
        }
    }

    /// Map an ERROR frame's code and message onto the taxonomy.
    #[must_use]
    pub fn from_error_frame(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCode::InvalidSetup => Self::InvalidSetup(message),
            ErrorCode::UnsupportedSetup => Self::UnsupportedSetup(message),
            ErrorCode::RejectedSetup => Self::RejectedSetup(message),
            ErrorCode::RejectedResume | ErrorCode::ConnectionError | ErrorCode::ConnectionClose => {
                Self::Connection(message)
            }
            ErrorCode::Rejected => Self::Rejected(message),
            ErrorCode::Canceled => Self::Canceled(message),
            ErrorCode::Invalid => Self::Invalid(message),
            ErrorCode::ApplicationError | ErrorCode::Other(_) => {
                Self::Application { code, message }
            }
        }
    }

    /// Code to place in an outbound ERROR frame for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidSetup(_) => ErrorCode::InvalidSetup,
            Self::UnsupportedSetup(_) => ErrorCode::UnsupportedSetup,
            Self::RejectedSetup(_) => ErrorCode::RejectedSetup,
            Self::Connection(_)
            | Self::ConnectionClosed
            | Self::ProtocolViolation(_)
            | Self::Timeout(_)
            | Self::Io(_) => ErrorCode::ConnectionError,
            Self::Application { code, .. } => *code,
            Self::Rejected(_) => ErrorCode::Rejected,
            Self::Canceled(_) => ErrorCode::Canceled,
            Self::Invalid(_) | Self::Encoding(_) => ErrorCode::Invalid,
        }
    }

    /// Message to place in an outbound ERROR frame.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::Connection(message)
            | Self::Application { message, .. }
            | Self::RejectedSetup(message)
            | Self::InvalidSetup(message)
            | Self::UnsupportedSetup(message)
            | Self::Rejected(message)
            | Self::Canceled(message)
            | Self::Invalid(message)
            | Self::ProtocolViolation(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// ERROR frame carrying this error on `stream_id`.
    ///
    /// Codes reserved for stream zero are replaced by APPLICATION_ERROR on
    /// other streams, and vice versa with CONNECTION_ERROR.
    #[must_use]
    pub fn to_frame(&self, stream_id: u32) -> Frame {
        let code = match (stream_id, self.error_code()) {
            (0, code) if !code.is_connection_scoped() => ErrorCode::ConnectionError,
            (0, code) => code,
            (_, code) if code.is_connection_scoped() => ErrorCode::ApplicationError,
            (_, code) => code,
        };
        Frame::error(stream_id, code, self.wire_message())
    }

    /// Report whether this error ends the whole connection.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::ConnectionClosed
                | Self::RejectedSetup(_)
                | Self::InvalidSetup(_)
                | Self::UnsupportedSetup(_)
                | Self::Timeout(_)
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ErrorCode::RejectedSetup)]
    #[case(ErrorCode::InvalidSetup)]
    #[case(ErrorCode::ApplicationError)]
    #[case(ErrorCode::Rejected)]
    #[case(ErrorCode::Canceled)]
    #[case(ErrorCode::Invalid)]
    #[case(ErrorCode::Other(0x0000_0300))]
    fn wire_codes_survive_mapping(#[case] code: ErrorCode) {
        let error = RSocketError::from_error_frame(code, "msg");
        assert_eq!(error.error_code(), code);
        assert_eq!(error.wire_message(), "msg");
    }

    #[test]
    fn connection_codes_are_fatal() {
        let error = RSocketError::from_error_frame(ErrorCode::ConnectionClose, "bye");
        assert!(error.is_connection_error());
        assert!(!RSocketError::application("x").is_connection_error());
    }

    #[rstest]
    #[case(0, RSocketError::Timeout(Duration::from_secs(1)), ErrorCode::ConnectionError)]
    #[case(0, RSocketError::application("x"), ErrorCode::ConnectionError)]
    #[case(0, RSocketError::RejectedSetup("x".into()), ErrorCode::RejectedSetup)]
    #[case(3, RSocketError::Connection("x".into()), ErrorCode::ApplicationError)]
    #[case(3, RSocketError::Canceled("x".into()), ErrorCode::Canceled)]
    fn error_frames_use_codes_valid_for_their_stream(
        #[case] stream_id: u32,
        #[case] error: RSocketError,
        #[case] code: ErrorCode,
    ) {
        let frame = error.to_frame(stream_id);
        assert_eq!(frame, Frame::error(stream_id, code, error.wire_message()));
    }

    #[test]
    fn timeout_message_reports_millis() {
        let error = RSocketError::Timeout(Duration::from_millis(1500));
        assert_eq!(error.to_string(), "No keep-alive acks for 1500 ms");
    }
}
