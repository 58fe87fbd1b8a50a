//! Connection owner.
//!
//! A connection ties one transport to a send pipeline, an inbound
//! demultiplexer, the requester and responder stream tables, and the
//! keepalive timers. It handles stream-zero frames itself and tears
//! everything down exactly once, whatever triggers the teardown first.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use futures::{FutureExt, future::BoxFuture, stream::BoxStream};
use log::info;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConnectionConfig, MissingStreamPolicy},
    demux::{self, Inbound, ReadOutcome, RouteItem},
    error::RSocketError,
    frame::{ErrorFrame, FrameBody},
    hooks::{ErrorSink, RSocket},
    keepalive::KeepAlive,
    registry::StreamRegistry,
    requester::{self, Requester, RequesterEntry},
    responder::{self, ResponderEntry},
    send::{Outbound, Sender},
    stream_id::{Role, StreamIdAllocator},
    transport::DuplexConnection,
};

mod counter;

use counter::ActiveConnection;
pub use counter::open_connection_count;

/// What ended a connection.
#[derive(Debug)]
pub(crate) enum Termination {
    /// Disposed locally.
    Dispose,
    /// The transport ended cleanly.
    Closed,
    /// This side detected a fatal error; the peer is told with an ERROR
    /// frame on stream zero.
    Local(RSocketError),
    /// The peer or the transport failed the connection.
    Remote(RSocketError),
}

/// State shared by every task and handle of one connection.
pub(crate) struct ConnectionInner {
    pub(crate) role: Role,
    pub(crate) sender: Sender,
    pub(crate) ids: StreamIdAllocator,
    pub(crate) requests: StreamRegistry<RequesterEntry>,
    pub(crate) responses: StreamRegistry<ResponderEntry>,
    pub(crate) error_sink: ErrorSink,
    pub(crate) missing_stream_policy: MissingStreamPolicy,
    keepalive: KeepAlive,
    transport: Arc<dyn DuplexConnection>,
    terminated: AtomicBool,
    closed: CancellationToken,
    counter: Mutex<Option<ActiveConnection>>,
}

impl ConnectionInner {
    pub(crate) fn new(
        role: Role,
        transport: Arc<dyn DuplexConnection>,
        config: &ConnectionConfig,
        sender: Sender,
    ) -> Arc<Self> {
        Arc::new(Self {
            role,
            sender,
            ids: StreamIdAllocator::new(role),
            requests: StreamRegistry::new(),
            responses: StreamRegistry::new(),
            error_sink: config.error_sink.clone(),
            missing_stream_policy: config.missing_stream_policy,
            keepalive: KeepAlive::new(config.keepalive, role == Role::Client),
            transport,
            terminated: AtomicBool::new(false),
            closed: CancellationToken::new(),
            counter: Mutex::new(Some(ActiveConnection::new())),
        })
    }

    /// Spawn the writer, reader, route dispatchers, and keepalive timer.
    pub(crate) fn start(
        self: &Arc<Self>,
        inbound: BoxStream<'static, io::Result<Bytes>>,
        outbound: Outbound,
        prefetch: usize,
        handler: Arc<dyn RSocket>,
    ) {
        info!(
            "connection opened: role={:?}, rsframe_open_connections={}",
            self.role,
            open_connection_count()
        );

        let weak = Arc::downgrade(self);
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(error) = transport.send(outbound.into_stream()).await {
                if let Some(inner) = weak.upgrade() {
                    inner.terminate(Termination::Remote(error.into()));
                }
            }
            transport.dispose();
        });

        let (routes, reader) = demux::demultiplex(inbound, prefetch);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let termination = match reader.await {
                ReadOutcome::Closed => Termination::Closed,
                ReadOutcome::Failed(error @ RSocketError::Io(_)) => Termination::Remote(error),
                ReadOutcome::Failed(error) => Termination::Local(error),
            };
            inner.terminate(termination);
        });

        let (requester_route, responder_route) = match self.role {
            Role::Client => (routes.client_streams, routes.server_streams),
            Role::Server => (routes.server_streams, routes.client_streams),
        };
        let inner = Arc::clone(self);
        let zero_handler = Arc::clone(&handler);
        tokio::spawn(dispatch(routes.stream_zero, move |item| {
            inner.handle_stream_zero(item, &zero_handler);
        }));
        let inner = Arc::clone(self);
        tokio::spawn(dispatch(requester_route, move |item| requester::handle(&inner, item)));
        let inner = Arc::clone(self);
        tokio::spawn(dispatch(responder_route, move |item| {
            responder::handle(&inner, item, &handler);
        }));

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                error = inner.keepalive.run(&inner.sender) => {
                    inner.terminate(Termination::Local(error));
                }
                () = inner.closed.cancelled() => {}
            }
        });
    }

    fn handle_stream_zero(&self, item: Inbound, handler: &Arc<dyn RSocket>) {
        let Inbound::Frame(frame) = item else { return };
        let frame_type = frame.frame_type();
        match frame.into_body() {
            FrameBody::Error(ErrorFrame { code, message }) => {
                let error = RSocketError::from_error_frame(code, message);
                tracing::debug!(error = %error, "connection error received");
                self.terminate(Termination::Remote(error));
            }
            FrameBody::KeepAlive(keepalive) => self.keepalive.received(&keepalive, &self.sender),
            FrameBody::Lease(lease) => tracing::debug!(
                ttl_ms = lease.ttl.as_millis(),
                requests = lease.number_of_requests,
                "lease received"
            ),
            FrameBody::MetadataPush(metadata) => {
                let handler = Arc::clone(handler);
                let sink = self.error_sink.clone();
                tokio::spawn(async move {
                    if let Err(error) = handler.metadata_push(metadata).await {
                        sink.report(&error);
                    }
                });
            }
            FrameBody::Setup(_) => self.report(&RSocketError::ProtocolViolation(
                "SETUP received after connection establishment".to_owned(),
            )),
            _ => self.report(&RSocketError::ProtocolViolation(format!(
                "unexpected {frame_type:?} frame on stream 0"
            ))),
        }
    }

    pub(crate) fn report(&self, error: &RSocketError) { self.error_sink.report(error); }

    /// Allocate an id for a new locally initiated stream.
    pub(crate) fn next_stream_id(&self) -> u32 {
        self.ids.next_unused(|id| self.requests.contains(id))
    }

    pub(crate) fn is_terminated(&self) -> bool { self.terminated.load(Ordering::Acquire) }

    /// Tear the connection down. Only the first call has any effect.
    ///
    /// Pending requests and channel inbound sinks fail with the cause, or
    /// with [`RSocketError::ConnectionClosed`] for a plain close; responder
    /// outputs are cancelled. Queued frames are still written before the
    /// transport is disposed.
    pub(crate) fn terminate(&self, termination: Termination) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let cause = match termination {
            Termination::Dispose | Termination::Closed => RSocketError::ConnectionClosed,
            Termination::Local(error) => {
                self.report(&error);
                let _ = self.sender.send(&error.to_frame(0));
                error
            }
            Termination::Remote(error) => {
                self.report(&error);
                error
            }
        };
        self.requests
            .close_all(&self.error_sink, |_, entry| entry.fail(cause.clone()));
        self.responses
            .close_all(&self.error_sink, |_, entry| entry.abort(cause.clone()));
        self.sender.close();
        self.closed.cancel();
        drop(
            self.counter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        info!(
            "connection closed: role={:?}, cause={cause}, rsframe_open_connections={}",
            self.role,
            open_connection_count()
        );
    }

    pub(crate) fn availability(&self) -> f64 {
        if self.is_terminated() {
            0.0
        } else {
            self.transport.availability()
        }
    }

    pub(crate) fn on_close(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }
}

async fn dispatch(mut route: mpsc::UnboundedReceiver<RouteItem>, mut handle: impl FnMut(Inbound)) {
    while let Some(Ok(item)) = route.recv().await {
        handle(item);
    }
}

/// Handle onto an established connection.
///
/// Cloning yields another handle to the same connection. The connection
/// runs until it is disposed, the peer closes it, or a fatal error occurs.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(inner: Arc<ConnectionInner>) -> Self { Self { inner } }

    /// Issue requests to the peer.
    #[must_use]
    pub fn requester(&self) -> Requester { Requester::new(Arc::clone(&self.inner)) }

    /// Which end of the connection this is.
    #[must_use]
    pub fn role(&self) -> Role { self.inner.role }

    /// Close the connection, failing every live stream. Idempotent.
    pub fn dispose(&self) { self.inner.terminate(Termination::Dispose); }

    #[must_use]
    pub fn is_disposed(&self) -> bool { self.inner.is_terminated() }

    /// Resolves once the connection has been torn down.
    pub fn on_close(&self) -> BoxFuture<'static, ()> { self.inner.on_close() }

    /// Health of the connection in `[0, 1]`; zero once disposed.
    #[must_use]
    pub fn availability(&self) -> f64 { self.inner.availability() }

    /// Streams currently tracked by the requester and responder tables.
    #[must_use]
    pub fn active_streams(&self) -> usize { self.inner.requests.len() + self.inner.responses.len() }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.inner.role)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
