//! Responder side of the interaction models.
//!
//! Requests from the peer are handed to the connection's [`RSocket`]
//! handler. Every stream with outstanding work has an entry in the
//! responder table holding the token that cancels it. Each payload sent or
//! received and each terminal event is applied to the entry's state
//! machine first; the event that closes the stream emits its terminal
//! frame.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::{
    connection::ConnectionInner,
    credit::Credit,
    demux::Inbound,
    error::RSocketError,
    frame::{ErrorFrame, Frame, FrameBody, FrameType, PayloadFrame},
    hooks::{PayloadStream, RSocket},
    metrics,
    payload::Payload,
    receiver::{ItemSender, PayloadReceiver, StreamControl},
    registry::Advance,
    state::{StreamEvent, StreamState},
};

/// Responder table entry.
pub(crate) enum ResponderEntry {
    Response {
        token: CancellationToken,
    },
    Stream {
        token: CancellationToken,
        credit: Arc<Credit>,
    },
    Channel {
        token: CancellationToken,
        credit: Arc<Credit>,
        /// Sink for the requester's payloads; `None` once that direction
        /// has completed.
        inbound: Option<ItemSender>,
    },
}

impl ResponderEntry {
    fn token(&self) -> &CancellationToken {
        match self {
            Self::Response { token } | Self::Stream { token, .. } | Self::Channel { token, .. } => {
                token
            }
        }
    }

    /// Stop the stream once its outcome is settled. Channel inbound sinks
    /// complete.
    fn terminate(self) { self.token().cancel(); }

    /// Stop the stream and fail any channel inbound sink with `error`.
    pub(crate) fn abort(self, error: RSocketError) {
        self.token().cancel();
        if let Self::Channel {
            inbound: Some(inbound),
            ..
        } = self
        {
            let _ = inbound.send(Err(error));
        }
    }
}

/// Apply an inbound frame addressed to a stream the peer opened.
pub(crate) fn handle(inner: &Arc<ConnectionInner>, item: Inbound, handler: &Arc<dyn RSocket>) {
    let frame = match item {
        Inbound::Frame(frame) => frame,
        Inbound::Malformed { stream_id, error } => {
            let error = RSocketError::from(error);
            inner.report(&error);
            if let Advance::Closed(entry) = inner.responses.advance(stream_id, StreamEvent::Error) {
                entry.abort(error.clone());
                send_terminal(inner, stream_id, &error.to_frame(stream_id));
            }
            return;
        }
    };
    let stream_id = frame.stream_id();
    let frame_type = frame.frame_type();
    if frame_type.is_request() && inner.responses.contains(stream_id) {
        inner.report(&RSocketError::ProtocolViolation(format!(
            "{frame_type:?} reuses live stream {stream_id}"
        )));
        return;
    }
    match frame.into_body() {
        FrameBody::RequestFnf(payload) => fire_and_forget(inner, handler, payload),
        FrameBody::RequestResponse(payload) => request_response(inner, handler, stream_id, payload),
        FrameBody::RequestStream {
            initial_request_n,
            payload,
        } => {
            metrics::inc_streams("request_stream");
            let stream = handler.request_stream(payload);
            let credit = Arc::new(Credit::new(initial_request_n));
            let token = CancellationToken::new();
            let entry = ResponderEntry::Stream {
                token: token.clone(),
                credit: Arc::clone(&credit),
            };
            if inner.responses.insert(stream_id, entry).is_ok() {
                tokio::spawn(pump(Arc::clone(inner), stream_id, stream, credit, token));
            }
        }
        FrameBody::RequestChannel {
            initial_request_n,
            payload,
            complete,
        } => request_channel(inner, handler, stream_id, initial_request_n, payload, complete),
        FrameBody::RequestN(n) => {
            let _ = inner
                .responses
                .advance_with(stream_id, StreamEvent::RequestN, |entry| match entry {
                    ResponderEntry::Stream { credit, .. }
                    | ResponderEntry::Channel { credit, .. } => credit.add(n),
                    ResponderEntry::Response { .. } => {}
                });
        }
        FrameBody::Cancel => {
            let step = inner.responses.advance(stream_id, StreamEvent::RemoteCancel);
            if let Advance::Closed(entry) = step {
                tracing::debug!(stream_id, "stream cancelled by requester");
                entry.abort(RSocketError::Canceled("cancelled by requester".to_owned()));
            }
        }
        FrameBody::Payload(PayloadFrame {
            payload,
            next,
            complete,
        }) => channel_inbound(inner, stream_id, frame_type, next.then_some(payload), complete),
        FrameBody::Error(ErrorFrame { code, message }) => {
            if let Advance::Closed(entry) = inner.responses.advance(stream_id, StreamEvent::Error) {
                entry.abort(RSocketError::from_error_frame(code, message));
            }
        }
        _ => inner.report(&RSocketError::ProtocolViolation(format!(
            "unexpected {frame_type:?} frame on responder stream {stream_id}"
        ))),
    }
}

fn fire_and_forget(inner: &ConnectionInner, handler: &Arc<dyn RSocket>, payload: Payload) {
    metrics::inc_streams("fire_and_forget");
    let handler = Arc::clone(handler);
    let sink = inner.error_sink.clone();
    tokio::spawn(async move {
        if let Err(error) = handler.fire_and_forget(payload).await {
            sink.report(&error);
        }
    });
}

fn request_response(
    inner: &Arc<ConnectionInner>,
    handler: &Arc<dyn RSocket>,
    stream_id: u32,
    payload: Payload,
) {
    metrics::inc_streams("request_response");
    let token = CancellationToken::new();
    let entry = ResponderEntry::Response {
        token: token.clone(),
    };
    if inner.responses.insert(stream_id, entry).is_err() {
        return;
    }
    let inner = Arc::clone(inner);
    let handler = Arc::clone(handler);
    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            () = token.cancelled() => return,
            result = handler.request_response(payload) => result,
        };
        let event = if result.is_ok() {
            StreamEvent::Complete
        } else {
            StreamEvent::Error
        };
        let Advance::Closed(_) = inner.responses.advance(stream_id, event) else {
            return;
        };
        let frame = match result {
            Ok(Some(payload)) => Frame::next_complete(stream_id, payload),
            Ok(None) => Frame::complete(stream_id),
            Err(error) => {
                inner.report(&error);
                error.to_frame(stream_id)
            }
        };
        send_terminal(&inner, stream_id, &frame);
    });
}

fn request_channel(
    inner: &Arc<ConnectionInner>,
    handler: &Arc<dyn RSocket>,
    stream_id: u32,
    initial_request_n: u32,
    payload: Payload,
    complete: bool,
) {
    metrics::inc_streams("request_channel");
    let control = Arc::new(ChannelInbound {
        inner: Arc::clone(inner),
        stream_id,
    });
    let (tx, receiver) = PayloadReceiver::new(control);
    let _ = tx.send(Ok(payload));
    let credit = Arc::new(Credit::new(initial_request_n));
    let token = CancellationToken::new();
    let entry = ResponderEntry::Channel {
        token: token.clone(),
        credit: Arc::clone(&credit),
        inbound: (!complete).then_some(tx),
    };
    if inner.responses.insert(stream_id, entry).is_err() {
        return;
    }
    let outbound = handler.request_channel(receiver);
    tokio::spawn(pump(Arc::clone(inner), stream_id, outbound, credit, token));
}

/// Deliver a requester payload to a channel's inbound sink.
fn channel_inbound(
    inner: &ConnectionInner,
    stream_id: u32,
    frame_type: FrameType,
    payload: Option<Payload>,
    complete: bool,
) {
    let is_channel = inner.responses.with(stream_id, |entry| {
        matches!(entry, ResponderEntry::Channel { .. })
    });
    match is_channel {
        Some(true) => {}
        Some(false) => {
            let error = RSocketError::ProtocolViolation(format!(
                "{frame_type:?} frame sent by requester on non-channel stream {stream_id}"
            ));
            inner.report(&error);
            if let Advance::Closed(entry) = inner.responses.advance(stream_id, StreamEvent::Error) {
                entry.abort(error.clone());
                send_terminal(inner, stream_id, &error.to_frame(stream_id));
            }
            return;
        }
        None => {
            tracing::debug!(stream_id, "discarding payload for retired stream");
            return;
        }
    }

    let has_payload = payload.is_some();
    let deliver = move |entry: &mut ResponderEntry| {
        if let ResponderEntry::Channel { inbound, .. } = entry {
            if let (Some(sink), Some(payload)) = (inbound.as_ref(), payload) {
                let _ = sink.send(Ok(payload));
            }
            if complete {
                *inbound = None;
            }
        }
    };
    if has_payload {
        let step = inner
            .responses
            .advance_with(stream_id, StreamEvent::Next, deliver);
        if let Advance::Refused(state) = step {
            tracing::debug!(stream_id, ?state, "discarding payload for closing stream");
        }
    } else {
        inner.responses.with(stream_id, deliver);
    }
}

/// Forward a handler's output sequence, one item per credit.
async fn pump(
    inner: Arc<ConnectionInner>,
    stream_id: u32,
    mut stream: PayloadStream,
    credit: Arc<Credit>,
    token: CancellationToken,
) {
    let (event, terminal) = loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = credit.acquire() => {}
        }
        let item = tokio::select! {
            biased;
            () = token.cancelled() => return,
            item = stream.next() => item,
        };
        match item {
            Some(Ok(payload)) => {
                let Advance::Open(_) = inner.responses.advance(stream_id, StreamEvent::Next) else {
                    return;
                };
                if inner.sender.send(&Frame::next(stream_id, payload)).is_err() {
                    return;
                }
            }
            Some(Err(error)) => {
                inner.report(&error);
                break (StreamEvent::Error, error.to_frame(stream_id));
            }
            None => break (StreamEvent::Complete, Frame::complete(stream_id)),
        }
    };
    if let Advance::Closed(entry) = inner.responses.advance(stream_id, event) {
        entry.terminate();
        send_terminal(&inner, stream_id, &terminal);
    }
}

fn send_terminal(inner: &ConnectionInner, stream_id: u32, frame: &Frame) {
    if let Err(error) = inner.sender.send(frame) {
        tracing::debug!(stream_id, error = %error, "terminal frame dropped");
    }
}

/// Demand signals from a channel responder back to the requester.
struct ChannelInbound {
    inner: Arc<ConnectionInner>,
    stream_id: u32,
}

impl StreamControl for ChannelInbound {
    fn request(&self, n: u32) {
        let open = self.inner.responses.state(self.stream_id);
        if open.is_some_and(StreamState::is_open) {
            let _ = self.inner.sender.send(&Frame::request_n(self.stream_id, n));
        }
    }

    fn cancel(&self) {
        let live = self.inner.responses.with(self.stream_id, |entry| {
            matches!(entry, ResponderEntry::Channel { inbound: Some(_), .. })
        });
        if live != Some(true) {
            return;
        }
        let step = self.inner.responses.advance(self.stream_id, StreamEvent::LocalCancel);
        if !matches!(step, Advance::Open(StreamState::Terminating)) {
            return;
        }
        let _ = self.inner.sender.send(&Frame::cancel(self.stream_id));
        let step = self.inner.responses.advance(self.stream_id, StreamEvent::CancelSent);
        if let Advance::Closed(entry) = step {
            entry.terminate();
        }
    }
}
