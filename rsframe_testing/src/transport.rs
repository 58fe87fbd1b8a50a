//! In-memory [`DuplexConnection`] driven directly by a test.
//!
//! [`TestConnection::new`] returns the transport handed to the engine and a
//! [`Peer`] that plays the other side frame by frame: it injects frames the
//! engine will read and decodes the frames the engine writes.

use std::{
    io,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures::{
    FutureExt,
    StreamExt,
    future::BoxFuture,
    stream::{self, BoxStream},
};
use rsframe::{DuplexConnection, Frame, FrameError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type InboundTx = mpsc::UnboundedSender<io::Result<Bytes>>;
type InboundRx = mpsc::UnboundedReceiver<io::Result<Bytes>>;

/// Transport whose peer is scripted by the test.
pub struct TestConnection {
    inbound: Mutex<Option<InboundRx>>,
    written: mpsc::UnboundedSender<Bytes>,
    disposed: CancellationToken,
    dispose_calls: Arc<AtomicUsize>,
}

/// The scripted far end of a [`TestConnection`].
pub struct Peer {
    inbound: Option<InboundTx>,
    written: mpsc::UnboundedReceiver<Bytes>,
    disposed: CancellationToken,
    dispose_calls: Arc<AtomicUsize>,
}

impl TestConnection {
    #[must_use]
    pub fn new() -> (Self, Peer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let disposed = CancellationToken::new();
        let dispose_calls = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            inbound: Mutex::new(Some(in_rx)),
            written: out_tx,
            disposed: disposed.clone(),
            dispose_calls: Arc::clone(&dispose_calls),
        };
        let peer = Peer {
            inbound: Some(in_tx),
            written: out_rx,
            disposed,
            dispose_calls,
        };
        (transport, peer)
    }
}

impl DuplexConnection for TestConnection {
    fn send(&self, frames: BoxStream<'static, Bytes>) -> BoxFuture<'static, io::Result<()>> {
        let written = self.written.clone();
        let disposed = self.disposed.clone();
        async move {
            let mut frames = frames;
            loop {
                let next = tokio::select! {
                    biased;
                    () = disposed.cancelled() => return Ok(()),
                    next = frames.next() => next,
                };
                let Some(bytes) = next else { return Ok(()) };
                // The peer may have gone away; the engine only cares that the
                // write was accepted.
                let _ = written.send(bytes);
            }
        }
        .boxed()
    }

    fn receive(&self) -> BoxStream<'static, io::Result<Bytes>> {
        let taken = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(rx) = taken else {
            return stream::once(async { Err(io::Error::other("receiver already taken")) }).boxed();
        };
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .take_until(self.disposed.clone().cancelled_owned())
            .boxed()
    }

    fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        self.disposed.cancel();
    }

    fn is_disposed(&self) -> bool { self.disposed.is_cancelled() }

    fn on_close(&self) -> BoxFuture<'static, ()> { self.disposed.clone().cancelled_owned().boxed() }
}

impl Peer {
    /// Deliver `frame` to the engine.
    ///
    /// # Panics
    ///
    /// Panics if `frame` cannot be encoded or the inbound side was closed.
    pub fn send(&self, frame: &Frame) {
        let bytes = frame.encode().expect("test frame must encode");
        self.send_bytes(bytes);
    }

    /// Deliver raw bytes as one frame, valid or not.
    ///
    /// # Panics
    ///
    /// Panics if the inbound side was closed.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) {
        self.inbound
            .as_ref()
            .expect("inbound closed")
            .send(Ok(bytes.into()))
            .expect("engine stopped reading");
    }

    /// Fail the engine's read side with `error`.
    ///
    /// # Panics
    ///
    /// Panics if the inbound side was closed.
    pub fn fail(&self, error: io::Error) {
        let _ = self.inbound.as_ref().expect("inbound closed").send(Err(error));
    }

    /// End the engine's read side cleanly.
    pub fn close(&mut self) { self.inbound = None; }

    /// Next frame written by the engine, or `None` once the writer is done
    /// and nothing remains.
    ///
    /// # Panics
    ///
    /// Panics if the engine wrote bytes that do not decode.
    pub async fn recv(&mut self) -> Option<Frame> {
        let bytes = self.written.recv().await?;
        Some(Frame::decode(&bytes).expect("engine wrote a malformed frame"))
    }

    /// Like [`Peer::recv`] but gives up after `wait`.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.recv()).await.ok().flatten()
    }

    /// Raw bytes of the next written frame.
    pub async fn recv_bytes(&mut self) -> Option<Bytes> { self.written.recv().await }

    /// Decode every frame already written without waiting.
    ///
    /// # Errors
    ///
    /// Returns the first decode failure.
    pub fn drain(&mut self) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        while let Ok(bytes) = self.written.try_recv() {
            frames.push(Frame::decode(&bytes)?);
        }
        Ok(frames)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool { self.disposed.is_cancelled() }

    /// Resolves once the engine disposes the transport.
    pub async fn disposed(&self) { self.disposed.cancelled().await; }

    /// How many times the engine called `dispose`.
    #[must_use]
    pub fn dispose_calls(&self) -> usize { self.dispose_calls.load(Ordering::SeqCst) }
}
