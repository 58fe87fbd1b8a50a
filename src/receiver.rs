//! Demand-driven receiver for multi-item streams.
//!
//! A [`PayloadReceiver`] yields the payloads of a request-stream, of the
//! response side of a request-channel, or of the inbound side handed to a
//! channel responder. Demand is signalled explicitly with
//! [`PayloadReceiver::request`]; a receiver polled without any explicit
//! demand asks for an unbounded amount. Dropping an unfinished receiver
//! cancels the stream.

use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;

use crate::{error::RSocketError, frame::REQUEST_MAX, payload::Payload};

/// Signals a receiver sends back towards its stream.
pub(crate) trait StreamControl: Send + Sync + 'static {
    /// Grant `n` more items. `n` is never zero.
    fn request(&self, n: u32);

    /// Abandon the stream.
    fn cancel(&self);
}

pub(crate) type ItemSender = mpsc::UnboundedSender<Result<Payload, RSocketError>>;

/// Stream of payloads with request-N flow control.
pub struct PayloadReceiver {
    rx: mpsc::UnboundedReceiver<Result<Payload, RSocketError>>,
    control: Arc<dyn StreamControl>,
    demanded: bool,
    rate: Option<RateLimit>,
    done: bool,
}

#[derive(Debug)]
struct RateLimit {
    batch: u32,
    received: u32,
}

impl PayloadReceiver {
    pub(crate) fn new(control: Arc<dyn StreamControl>) -> (ItemSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = Self {
            rx,
            control,
            demanded: false,
            rate: None,
            done: false,
        };
        (tx, receiver)
    }

    /// Ask the sender for `n` more payloads. Zero is ignored.
    pub fn request(&mut self, n: u32) {
        if n == 0 || self.done {
            return;
        }
        self.demanded = true;
        self.control.request(n.min(REQUEST_MAX));
    }

    /// Request `batch` payloads now and another `batch` each time that many
    /// have been received.
    #[must_use]
    pub fn limit_rate(mut self, batch: u32) -> Self {
        let batch = batch.clamp(1, REQUEST_MAX);
        self.rate = Some(RateLimit { batch, received: 0 });
        self.request(batch);
        self
    }

    /// Stop receiving. Buffered payloads are discarded.
    pub fn cancel(&mut self) {
        if !self.done {
            self.done = true;
            self.rx.close();
            self.control.cancel();
        }
    }

    /// Report whether the stream has ended or was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool { self.done }

    fn after_item(&mut self) {
        let Some(rate) = self.rate.as_mut() else { return };
        rate.received += 1;
        if rate.received == rate.batch {
            rate.received = 0;
            let batch = rate.batch;
            self.request(batch);
        }
    }
}

impl Stream for PayloadReceiver {
    type Item = Result<Payload, RSocketError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if !this.demanded {
            this.request(REQUEST_MAX);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(payload))) => {
                this.after_item();
                Poll::Ready(Some(Ok(payload)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PayloadReceiver {
    fn drop(&mut self) { self.cancel(); }
}

impl fmt::Debug for PayloadReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadReceiver")
            .field("demanded", &self.demanded)
            .field("rate", &self.rate)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
