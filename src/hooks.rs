//! Application-facing hooks.
//!
//! [`RSocket`] is the handler applications implement to answer requests,
//! [`SocketAcceptor`] decides whether a server accepts a SETUP, and
//! [`ErrorSink`] receives every error the connection cannot hand to a
//! stream.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};

use crate::{
    error::RSocketError,
    frame::SetupFrame,
    payload::Payload,
    receiver::PayloadReceiver,
    requester::Requester,
};

/// Boxed sequence of payloads produced by a handler.
pub type PayloadStream = BoxStream<'static, Result<Payload, RSocketError>>;

/// Request handler for streams opened by the peer.
///
/// Every method has a default that rejects the interaction, so handlers
/// only implement the models they serve.
///
/// ```
/// use async_trait::async_trait;
/// use rsframe::{Payload, RSocket, RSocketError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl RSocket for Echo {
///     async fn request_response(
///         &self,
///         payload: Payload,
///     ) -> Result<Option<Payload>, RSocketError> {
///         Ok(Some(payload))
///     }
/// }
/// ```
#[async_trait]
pub trait RSocket: Send + Sync + 'static {
    /// Handle a request with no response. Errors go to the error sink.
    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), RSocketError> {
        Err(unsupported("fire-and-forget"))
    }

    /// Handle a request with at most one response.
    ///
    /// `Ok(None)` completes the stream without a value.
    async fn request_response(&self, _payload: Payload) -> Result<Option<Payload>, RSocketError> {
        Err(unsupported("request-response"))
    }

    /// Produce a response sequence. Items are pulled only as the requester
    /// grants credit.
    fn request_stream(&self, _payload: Payload) -> PayloadStream {
        Box::pin(stream::once(async { Err(unsupported("request-stream")) }))
    }

    /// Answer a bidirectional channel. `inbound` yields the requester's
    /// payloads, starting with the one that opened the channel.
    fn request_channel(&self, inbound: PayloadReceiver) -> PayloadStream {
        // Holding `inbound` until the stream is dropped keeps the rejection
        // from being preceded by a CANCEL.
        Box::pin(stream::once(async { Err(unsupported("request-channel")) }).map(
            move |item| {
                let _ = &inbound;
                item
            },
        ))
    }

    /// Handle connection-level metadata.
    async fn metadata_push(&self, _metadata: Bytes) -> Result<(), RSocketError> {
        Err(unsupported("metadata-push"))
    }
}

fn unsupported(model: &str) -> RSocketError {
    RSocketError::application(format!("{model} not implemented"))
}

/// Handler that rejects every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectAll;

impl RSocket for RejectAll {}

/// Decides whether to accept an incoming connection.
///
/// `requester` issues requests back to the client over the same connection.
/// Returning an error rejects the SETUP with `REJECTED_SETUP`.
#[async_trait]
pub trait SocketAcceptor: Send + Sync + 'static {
    async fn accept(
        &self,
        setup: &SetupFrame,
        requester: Requester,
    ) -> Result<Arc<dyn RSocket>, RSocketError>;
}

#[async_trait]
impl<F> SocketAcceptor for F
where
    F: Fn(&SetupFrame, Requester) -> Result<Arc<dyn RSocket>, RSocketError> + Send + Sync + 'static,
{
    async fn accept(
        &self,
        setup: &SetupFrame,
        requester: Requester,
    ) -> Result<Arc<dyn RSocket>, RSocketError> {
        self(setup, requester)
    }
}

/// Receiver for errors that have no stream to travel on.
///
/// The default sink logs at `error` level.
#[derive(Clone)]
pub struct ErrorSink(Arc<dyn Fn(&RSocketError) + Send + Sync>);

impl ErrorSink {
    /// Wrap a callback.
    pub fn new(f: impl Fn(&RSocketError) + Send + Sync + 'static) -> Self { Self(Arc::new(f)) }

    /// Hand `error` to the sink.
    pub fn report(&self, error: &RSocketError) {
        crate::metrics::inc_errors();
        (self.0)(error);
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::new(|error| tracing::error!(error = %error, "rsocket error"))
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ErrorSink") }
}
