//! Outbound send pipeline.
//!
//! Every producer on a connection (stream state machines, the keepalive
//! timer, connection control) encodes frames through a cloneable [`Sender`]
//! into one unbounded queue. A single [`Outbound`] drains the queue into the
//! transport in enqueue order. Enqueueing never waits on the transport.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::RSocketError,
    frame::Frame,
    metrics::{self, Direction},
};

/// Producer handle onto a connection's outbound queue.
#[derive(Clone, Debug)]
pub struct Sender {
    tx: mpsc::UnboundedSender<Bytes>,
    position: Arc<AtomicU64>,
    closing: CancellationToken,
}

/// Consumer side of the queue, handed to the transport writer.
#[derive(Debug)]
pub struct Outbound {
    rx: mpsc::UnboundedReceiver<Bytes>,
    position: Arc<AtomicU64>,
    closing: CancellationToken,
}

/// Create a connected [`Sender`] and [`Outbound`].
#[must_use]
pub fn channel() -> (Sender, Outbound) {
    let (tx, rx) = mpsc::unbounded_channel();
    let position = Arc::new(AtomicU64::new(0));
    let closing = CancellationToken::new();
    (
        Sender {
            tx,
            position: Arc::clone(&position),
            closing: closing.clone(),
        },
        Outbound {
            rx,
            position,
            closing,
        },
    )
}

impl Sender {
    /// Encode `frame` and enqueue it.
    ///
    /// # Errors
    ///
    /// Returns [`RSocketError::Encoding`] if the frame fails validation and
    /// [`RSocketError::ConnectionClosed`] once the pipeline is closed.
    pub fn send(&self, frame: &Frame) -> Result<(), RSocketError> {
        let bytes = frame.encode()?;
        self.send_bytes(bytes)?;
        tracing::trace!(
            stream_id = frame.stream_id(),
            frame_type = ?frame.frame_type(),
            "frame enqueued"
        );
        Ok(())
    }

    /// Enqueue an already encoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`RSocketError::ConnectionClosed`] once the pipeline is closed.
    pub fn send_bytes(&self, bytes: Bytes) -> Result<(), RSocketError> {
        if self.closing.is_cancelled() {
            return Err(RSocketError::ConnectionClosed);
        }
        self.tx.send(bytes).map_err(|_| RSocketError::ConnectionClosed)
    }

    /// Bytes handed to the transport so far.
    #[must_use]
    pub fn position(&self) -> u64 { self.position.load(Ordering::Acquire) }

    /// Refuse further frames. Frames already queued are still written.
    pub fn close(&self) { self.closing.cancel(); }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closing.is_cancelled() || self.tx.is_closed() }
}

impl Outbound {
    /// Queue contents as a stream that ends after [`Sender::close`] once the
    /// backlog is drained, or when every [`Sender`] is dropped.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Bytes> {
        stream::unfold(self, |mut outbound| async move {
            let bytes = tokio::select! {
                biased;
                bytes = outbound.rx.recv() => bytes,
                () = outbound.closing.cancelled() => {
                    outbound.rx.close();
                    outbound.rx.recv().await
                }
            }?;
            outbound
                .position
                .fetch_add(bytes.len() as u64, Ordering::AcqRel);
            metrics::inc_frames(Direction::Outbound);
            Some((bytes, outbound))
        })
        .boxed()
    }
}
