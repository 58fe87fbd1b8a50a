//! Requester side of the interaction models.
//!
//! [`Requester`] opens streams towards the peer. Each open stream has an
//! entry in the connection's requester table; inbound frames for it are
//! applied by [`handle`]. Whoever removes the entry (a terminal frame, a
//! local cancel, or connection teardown) delivers the stream's single
//! terminal signal.

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    config::MissingStreamPolicy,
    connection::{ConnectionInner, Termination},
    credit::Credit,
    demux::Inbound,
    error::RSocketError,
    frame::{ErrorFrame, Frame, FrameBody, FrameType, PayloadFrame},
    hooks::PayloadStream,
    metrics,
    payload::Payload,
    receiver::{ItemSender, PayloadReceiver, StreamControl},
    registry::Advance,
    state::{StreamEvent, StreamState},
};

type Response = Result<Option<Payload>, RSocketError>;

/// Requester table entry.
pub(crate) enum RequesterEntry {
    /// Request-response awaiting its single reply.
    Single(oneshot::Sender<Response>),
    /// Request-stream or request-channel.
    Many {
        tx: ItemSender,
        upstream: Option<Upstream>,
    },
}

/// Outbound half of a request-channel.
pub(crate) struct Upstream {
    credit: Arc<Credit>,
    token: CancellationToken,
}

impl RequesterEntry {
    fn is_single(&self) -> bool { matches!(self, Self::Single(_)) }

    /// Fail the stream with `error`, stopping any upstream.
    pub(crate) fn fail(self, error: RSocketError) {
        match self {
            Self::Single(tx) => {
                let _ = tx.send(Err(error));
            }
            Self::Many { tx, upstream } => {
                if let Some(upstream) = upstream {
                    upstream.token.cancel();
                }
                let _ = tx.send(Err(error));
            }
        }
    }

    /// Complete the stream, delivering `last` first if present.
    fn finish(self, last: Option<Payload>) {
        match self {
            Self::Single(tx) => {
                let _ = tx.send(Ok(last));
            }
            Self::Many { tx, upstream } => {
                if let Some(upstream) = upstream {
                    upstream.token.cancel();
                }
                if let Some(payload) = last {
                    let _ = tx.send(Ok(payload));
                }
            }
        }
    }

    fn deliver(&self, payload: Payload) {
        if let Self::Many { tx, .. } = self {
            let _ = tx.send(Ok(payload));
        }
    }

    fn stop_upstream(&self) {
        if let Self::Many {
            upstream: Some(upstream),
            ..
        } = self
        {
            upstream.token.cancel();
        }
    }
}

/// Apply an inbound frame addressed to a stream this side opened.
pub(crate) fn handle(inner: &ConnectionInner, item: Inbound) {
    let (stream_id, frame_type, body) = match item {
        Inbound::Frame(frame) => (frame.stream_id(), frame.frame_type(), frame.into_body()),
        Inbound::Malformed { stream_id, error } => {
            let error = RSocketError::from(error);
            match cancel_stream(inner, stream_id) {
                Advance::Closed(entry) => {
                    inner.report(&error);
                    entry.fail(error);
                }
                step => unapplied(inner, stream_id, None, step),
            }
            return;
        }
    };
    match body {
        FrameBody::Payload(PayloadFrame {
            payload,
            next,
            complete,
        }) => {
            let Some(single) = inner.requests.with(stream_id, |entry| entry.is_single()) else {
                return missing(inner, stream_id, Some(frame_type));
            };
            if single || complete {
                match inner.requests.advance(stream_id, StreamEvent::Complete) {
                    Advance::Closed(entry) => entry.finish(next.then_some(payload)),
                    step => unapplied(inner, stream_id, Some(frame_type), step),
                }
            } else {
                let step = inner
                    .requests
                    .advance_with(stream_id, StreamEvent::Next, |entry| entry.deliver(payload));
                unapplied(inner, stream_id, Some(frame_type), step);
            }
        }
        FrameBody::Error(ErrorFrame { code, message }) => {
            match inner.requests.advance(stream_id, StreamEvent::Error) {
                Advance::Closed(entry) => entry.fail(RSocketError::from_error_frame(code, message)),
                step => unapplied(inner, stream_id, Some(frame_type), step),
            }
        }
        FrameBody::RequestN(n) => {
            let step = inner
                .requests
                .advance_with(stream_id, StreamEvent::RequestN, |entry| {
                    if let RequesterEntry::Many {
                        upstream: Some(upstream),
                        ..
                    } = entry
                    {
                        upstream.credit.add(n);
                    }
                });
            unapplied(inner, stream_id, Some(frame_type), step);
        }
        FrameBody::Cancel => match inner.requests.advance(stream_id, StreamEvent::RemoteCancel) {
            Advance::Closed(entry) => {
                tracing::debug!(stream_id, "stream cancelled by responder");
                entry.fail(RSocketError::Canceled("cancelled by responder".to_owned()));
            }
            step => unapplied(inner, stream_id, Some(frame_type), step),
        },
        _ => {
            let error = RSocketError::ProtocolViolation(format!(
                "unexpected {frame_type:?} frame on requester stream {stream_id}"
            ));
            inner.report(&error);
            if let Advance::Closed(entry) = cancel_stream(inner, stream_id) {
                entry.fail(error);
            }
        }
    }
}

/// Account for a frame whose event left no entry to act on.
fn unapplied(
    inner: &ConnectionInner,
    stream_id: u32,
    frame_type: Option<FrameType>,
    step: Advance<RequesterEntry>,
) {
    match step {
        Advance::Missing => missing(inner, stream_id, frame_type),
        Advance::Refused(state) => {
            tracing::debug!(stream_id, ?frame_type, ?state, "discarding frame for closing stream");
        }
        Advance::Open(_) | Advance::Closed(_) => {}
    }
}

/// Handle a frame for a stream with no entry.
///
/// Ids that were issued and retired are a benign race with a local cancel;
/// ids never issued violate the protocol.
fn missing(inner: &ConnectionInner, stream_id: u32, frame_type: Option<FrameType>) {
    if inner.ids.was_issued(stream_id) {
        tracing::debug!(stream_id, ?frame_type, "discarding frame for retired stream");
        return;
    }
    let error = RSocketError::ProtocolViolation(format!(
        "frame ({frame_type:?}) for stream {stream_id} that was never requested"
    ));
    match inner.missing_stream_policy {
        MissingStreamPolicy::Fatal => inner.terminate(Termination::Local(error)),
        MissingStreamPolicy::Report => inner.report(&error),
    }
}

/// Walk a live stream through `Terminating`, emitting CANCEL on the way.
///
/// Frames arriving while the stream is terminating are refused by its
/// state, so a reply crossing the CANCEL on the wire is never delivered.
fn cancel_stream(inner: &ConnectionInner, stream_id: u32) -> Advance<RequesterEntry> {
    let step = inner
        .requests
        .advance_with(stream_id, StreamEvent::LocalCancel, |entry| entry.stop_upstream());
    if !matches!(step, Advance::Open(StreamState::Terminating)) {
        return step;
    }
    if inner.sender.send(&Frame::cancel(stream_id)).is_ok() {
        tracing::debug!(stream_id, "stream cancelled");
    }
    inner.requests.advance(stream_id, StreamEvent::CancelSent)
}

/// Issues requests to the peer of one connection.
#[derive(Clone)]
pub struct Requester {
    inner: Arc<ConnectionInner>,
}

impl Requester {
    pub(crate) fn new(inner: Arc<ConnectionInner>) -> Self { Self { inner } }

    /// Send a request that expects no response.
    ///
    /// # Errors
    ///
    /// Fails if the payload cannot be encoded or the connection is closed.
    pub fn fire_and_forget(&self, payload: Payload) -> Result<(), RSocketError> {
        let stream_id = self.inner.next_stream_id();
        self.inner
            .sender
            .send(&Frame::request_fnf(stream_id, payload))?;
        metrics::inc_streams("fire_and_forget");
        Ok(())
    }

    /// Send a request expecting at most one response.
    ///
    /// The request is sent immediately. Dropping the returned future before
    /// it resolves cancels the request.
    pub fn request_response(&self, payload: Payload) -> ResponseFuture {
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = oneshot::channel();
        let stream_id = inner.next_stream_id();
        let sent = match inner.requests.insert(stream_id, RequesterEntry::Single(tx)) {
            Err(_) => Err(RSocketError::ConnectionClosed),
            Ok(()) => inner
                .sender
                .send(&Frame::request_response(stream_id, payload))
                .inspect_err(|_| {
                    inner.requests.remove(stream_id);
                }),
        };
        let early = match sent {
            Ok(()) => {
                metrics::inc_streams("request_response");
                None
            }
            Err(error) => Some(error),
        };
        ResponseFuture {
            inner,
            stream_id,
            rx,
            early,
        }
    }

    /// Open a request-stream.
    ///
    /// Nothing is sent until the receiver first signals demand; the first
    /// `request(n)` (or first poll) sends the request with `n` as initial
    /// credit and later requests send REQUEST_N.
    pub fn request_stream(&self, payload: Payload) -> PayloadReceiver {
        self.open(|tx| Opening::Stream { payload, tx })
    }

    /// Open a request-channel fed by `upstream`.
    ///
    /// The channel is opened with the first upstream payload once the
    /// receiver signals demand. Further payloads are sent as the responder
    /// grants credit.
    pub fn request_channel<S>(&self, upstream: S) -> PayloadReceiver
    where
        S: Stream<Item = Result<Payload, RSocketError>> + Send + 'static,
    {
        let upstream: PayloadStream = upstream.boxed();
        self.open(|tx| Opening::Channel { upstream, tx })
    }

    /// Push connection-level metadata to the peer.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed.
    pub fn metadata_push(&self, metadata: Bytes) -> Result<(), RSocketError> {
        self.inner.sender.send(&Frame::metadata_push(metadata))
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool { self.inner.is_terminated() }

    #[must_use]
    pub fn availability(&self) -> f64 { self.inner.availability() }

    fn open(&self, opening: impl FnOnce(ItemSender) -> Opening) -> PayloadReceiver {
        let shared = Arc::new(LazyStream {
            inner: Arc::clone(&self.inner),
            slot: Mutex::new(Slot {
                local: StreamState::Idle,
                stream_id: None,
                opening: None,
                pending_demand: 0,
                pump: None,
            }),
        });
        let (tx, receiver) = PayloadReceiver::new(Arc::new(LazyControl(Arc::clone(&shared))));
        shared.lock().opening = Some(opening(tx));
        receiver
    }
}

impl fmt::Debug for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Requester")
            .field("role", &self.inner.role)
            .finish_non_exhaustive()
    }
}

/// Pending reply to a request-response.
///
/// Resolves to `Ok(Some(payload))`, `Ok(None)` for an empty completion, or
/// the stream's error.
#[must_use = "dropping the future cancels the request"]
pub struct ResponseFuture {
    inner: Arc<ConnectionInner>,
    stream_id: u32,
    rx: oneshot::Receiver<Response>,
    early: Option<RSocketError>,
}

impl ResponseFuture {
    #[must_use]
    pub fn stream_id(&self) -> u32 { self.stream_id }
}

impl Future for ResponseFuture {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(error) = this.early.take() {
            return Poll::Ready(Err(error));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                Poll::Ready(result.unwrap_or(Err(RSocketError::ConnectionClosed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) { let _ = cancel_stream(&self.inner, self.stream_id); }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("stream_id", &self.stream_id)
            .field(
                "state",
                &self
                    .inner
                    .requests
                    .state(self.stream_id)
                    .unwrap_or(StreamState::Closed),
            )
            .finish_non_exhaustive()
    }
}

enum Opening {
    Stream { payload: Payload, tx: ItemSender },
    Channel { upstream: PayloadStream, tx: ItemSender },
}

struct Slot {
    /// State before the stream is registered; the registry owns it after.
    local: StreamState,
    stream_id: Option<u32>,
    opening: Option<Opening>,
    /// Demand signalled while a channel waits for its first payload.
    pending_demand: u32,
    pump: Option<CancellationToken>,
}

/// A request-stream or request-channel whose id is allocated on first use.
struct LazyStream {
    inner: Arc<ConnectionInner>,
    slot: Mutex<Slot>,
}

impl LazyStream {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self, slot: &Slot) -> StreamState {
        match slot.stream_id {
            Some(stream_id) => self
                .inner
                .requests
                .state(stream_id)
                .unwrap_or(StreamState::Closed),
            None => slot.local,
        }
    }

    /// Register `entry` under a fresh id and send `frame(id)`.
    fn open(
        &self,
        slot: &mut Slot,
        entry: RequesterEntry,
        frame: impl FnOnce(u32) -> Frame,
    ) -> Option<u32> {
        let inner = &self.inner;
        let stream_id = inner.next_stream_id();
        if let Err(entry) = inner.requests.insert(stream_id, entry) {
            slot.local = StreamState::Closed;
            entry.fail(RSocketError::ConnectionClosed);
            return None;
        }
        slot.stream_id = Some(stream_id);
        if let Err(error) = inner.sender.send(&frame(stream_id)) {
            if let Advance::Closed(entry) = inner.requests.advance(stream_id, StreamEvent::Error) {
                entry.fail(error);
            }
            return None;
        }
        Some(stream_id)
    }
}

struct LazyControl(Arc<LazyStream>);

impl StreamControl for LazyControl {
    fn request(&self, n: u32) {
        let stream = &self.0;
        let mut slot = stream.lock();
        match stream.state(&slot) {
            StreamState::Idle => match slot.opening.take() {
                Some(Opening::Stream { payload, tx }) => {
                    let entry = RequesterEntry::Many { tx, upstream: None };
                    if stream
                        .open(&mut slot, entry, |id| Frame::request_stream(id, n, payload))
                        .is_some()
                    {
                        metrics::inc_streams("request_stream");
                    }
                }
                Some(Opening::Channel { upstream, tx }) => {
                    slot.pending_demand = n;
                    let token = CancellationToken::new();
                    slot.pump = Some(token.clone());
                    tokio::spawn(pump_channel(Arc::clone(stream), upstream, tx, token));
                }
                None => slot.pending_demand = slot.pending_demand.saturating_add(n),
            },
            StreamState::Requested | StreamState::Active => {
                if let Some(stream_id) = slot.stream_id {
                    let _ = stream.inner.sender.send(&Frame::request_n(stream_id, n));
                }
            }
            StreamState::Terminating | StreamState::Closed => {}
        }
    }

    fn cancel(&self) {
        let stream = &self.0;
        let mut slot = stream.lock();
        slot.opening = None;
        if let Some(token) = slot.pump.take() {
            token.cancel();
        }
        match slot.stream_id {
            Some(stream_id) => {
                let _ = cancel_stream(&stream.inner, stream_id);
            }
            None => {
                if let Some(next) = slot.local.next(StreamEvent::LocalCancel) {
                    slot.local = next;
                }
            }
        }
    }
}

/// Feed a channel's upstream to the responder.
///
/// The first payload opens the channel. Later payloads each wait for a
/// credit granted by the responder.
async fn pump_channel(
    stream: Arc<LazyStream>,
    mut upstream: PayloadStream,
    tx: ItemSender,
    token: CancellationToken,
) {
    let first = tokio::select! {
        biased;
        () = token.cancelled() => return,
        item = upstream.next() => item,
    };
    let credit = Arc::new(Credit::new(0));
    let opened = {
        let mut slot = stream.lock();
        if stream.state(&slot) != StreamState::Idle {
            return;
        }
        match first {
            None => {
                slot.local = StreamState::Closed;
                None
            }
            Some(Err(error)) => {
                slot.local = StreamState::Closed;
                let _ = tx.send(Err(error));
                None
            }
            Some(Ok(payload)) => {
                let n = slot.pending_demand.max(1);
                let entry = RequesterEntry::Many {
                    tx,
                    upstream: Some(Upstream {
                        credit: Arc::clone(&credit),
                        token: token.clone(),
                    }),
                };
                stream.open(&mut slot, entry, |id| {
                    Frame::request_channel(id, n, payload, false)
                })
            }
        }
    };
    let Some(stream_id) = opened else { return };
    metrics::inc_streams("request_channel");
    let inner = &stream.inner;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = credit.acquire() => {}
        }
        let item = tokio::select! {
            biased;
            () = token.cancelled() => return,
            item = upstream.next() => item,
        };
        match item {
            Some(Ok(payload)) => {
                let Advance::Open(_) = inner.requests.advance(stream_id, StreamEvent::Next) else {
                    return;
                };
                if inner.sender.send(&Frame::next(stream_id, payload)).is_err() {
                    return;
                }
            }
            Some(Err(error)) => {
                let step = inner.requests.advance(stream_id, StreamEvent::Error);
                if let Advance::Closed(entry) = step {
                    let _ = inner.sender.send(&error.to_frame(stream_id));
                    entry.fail(error);
                }
                return;
            }
            None => {
                if !inner.requests.state(stream_id).is_some_and(StreamState::is_open) {
                    return;
                }
                let live = inner.requests.with(stream_id, |entry| {
                    if let RequesterEntry::Many { upstream, .. } = entry {
                        *upstream = None;
                    }
                });
                if live.is_some() {
                    let _ = inner.sender.send(&Frame::complete(stream_id));
                }
                return;
            }
        }
    }
}
