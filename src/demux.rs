//! Inbound connection demultiplexer.
//!
//! One task reads the transport's inbound frames, decodes them, and routes
//! each by stream id: stream zero, odd ids (client-initiated streams), and
//! even ids (server-initiated streams). Each route is an independent
//! ordered channel, so frames for one stream keep their wire order.

use std::io;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::{
    byte_order::read_network_u32,
    error::RSocketError,
    frame::{Frame, FrameError, MAX_STREAM_ID},
    metrics::{self, Direction},
};

mod fairness;

use fairness::ReadFairness;

/// Item delivered on a route.
#[derive(Debug)]
pub enum Inbound {
    Frame(Frame),
    /// A frame addressed to a stream that failed to decode.
    Malformed { stream_id: u32, error: FrameError },
}

/// Result carried by each route. An `Err` is the terminal transport error.
pub type RouteItem = Result<Inbound, RSocketError>;

/// The three logical inbound sequences of a connection.
#[derive(Debug)]
pub struct Routes {
    pub stream_zero: mpsc::UnboundedReceiver<RouteItem>,
    pub client_streams: mpsc::UnboundedReceiver<RouteItem>,
    pub server_streams: mpsc::UnboundedReceiver<RouteItem>,
}

struct Senders {
    stream_zero: mpsc::UnboundedSender<RouteItem>,
    client_streams: mpsc::UnboundedSender<RouteItem>,
    server_streams: mpsc::UnboundedSender<RouteItem>,
}

impl Senders {
    fn route(&self, stream_id: u32) -> &mpsc::UnboundedSender<RouteItem> {
        match stream_id {
            0 => &self.stream_zero,
            id if id % 2 == 1 => &self.client_streams,
            _ => &self.server_streams,
        }
    }

    fn fail_all(&self, error: &RSocketError) {
        for route in [&self.stream_zero, &self.client_streams, &self.server_streams] {
            let _ = route.send(Err(error.clone()));
        }
    }
}

/// Why the reader stopped.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The transport ended cleanly.
    Closed,
    /// The transport failed or sent an undecodable connection-level frame.
    Failed(RSocketError),
}

/// Build the three routes and the reader future feeding them.
///
/// The reader finishes when `inbound` ends or fails; the routes then end
/// or yield the failure respectively.
pub fn demultiplex<S>(
    inbound: S,
    prefetch: usize,
) -> (Routes, impl Future<Output = ReadOutcome> + Send + 'static)
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let (zero_tx, stream_zero) = mpsc::unbounded_channel();
    let (client_tx, client_streams) = mpsc::unbounded_channel();
    let (server_tx, server_streams) = mpsc::unbounded_channel();
    let senders = Senders {
        stream_zero: zero_tx,
        client_streams: client_tx,
        server_streams: server_tx,
    };
    let routes = Routes {
        stream_zero,
        client_streams,
        server_streams,
    };
    (routes, read_loop(inbound, senders, ReadFairness::new(prefetch)))
}

async fn read_loop<S>(mut inbound: S, senders: Senders, mut fairness: ReadFairness) -> ReadOutcome
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    while let Some(next) = inbound.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = RSocketError::from(e);
                senders.fail_all(&error);
                return ReadOutcome::Failed(error);
            }
        };
        metrics::inc_frames(Direction::Inbound);
        match classify(&bytes) {
            Ok(Some((stream_id, item))) => {
                let _ = senders.route(stream_id).send(Ok(item));
            }
            Ok(None) => {}
            Err(error) => {
                senders.fail_all(&error);
                return ReadOutcome::Failed(error);
            }
        }
        fairness.after_frame();
        if fairness.should_yield() {
            tokio::task::yield_now().await;
            fairness.reset();
        }
    }
    ReadOutcome::Closed
}

/// Decode one frame and decide where it goes.
///
/// Ignorable unknown frames are dropped. Undecodable frames addressed to a
/// stream are routed as [`Inbound::Malformed`]; undecodable connection-level
/// frames are fatal.
fn classify(bytes: &Bytes) -> Result<Option<(u32, Inbound)>, RSocketError> {
    match Frame::decode(bytes) {
        Ok(frame) => Ok(Some((frame.stream_id(), Inbound::Frame(frame)))),
        Err(error) if error.is_ignorable() => {
            tracing::debug!(error = %error, "ignoring unsupported frame");
            Ok(None)
        }
        Err(error) => match raw_stream_id(bytes) {
            Some(stream_id) if stream_id != 0 => {
                Ok(Some((stream_id, Inbound::Malformed { stream_id, error })))
            }
            _ => Err(RSocketError::Connection(format!("malformed frame: {error}"))),
        },
    }
}

fn raw_stream_id(bytes: &[u8]) -> Option<u32> {
    bytes
        .first_chunk::<4>()
        .map(|id| read_network_u32(*id) & MAX_STREAM_ID)
}
