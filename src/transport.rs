//! Duplex transport boundary.
//!
//! A connection consumes a [`DuplexConnection`]: something that accepts a
//! sequence of encoded frames to write and yields the sequence of encoded
//! frames read from the peer. [`FramedTransport`] adapts any byte stream.

use std::io;

use bytes::Bytes;
use futures::{future::BoxFuture, stream::BoxStream};

mod codec;
mod framed;

pub use codec::{FrameLengthCodec, FramingError, LENGTH_HEADER_SIZE};
pub use framed::FramedTransport;

/// Frame-level duplex transport.
pub trait DuplexConnection: Send + Sync + 'static {
    /// Write every frame of `frames` in order.
    ///
    /// The returned future completes when `frames` ends or a write fails.
    /// Only one outbound sequence is active per transport.
    fn send(&self, frames: BoxStream<'static, Bytes>) -> BoxFuture<'static, io::Result<()>>;

    /// Frames read from the peer.
    ///
    /// May be taken once; later calls yield a single error.
    fn receive(&self) -> BoxStream<'static, io::Result<Bytes>>;

    /// Close the transport. Idempotent.
    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    /// Resolves once the transport is disposed.
    fn on_close(&self) -> BoxFuture<'static, ()>;

    /// Health of the transport in `[0, 1]`.
    fn availability(&self) -> f64 {
        if self.is_disposed() { 0.0 } else { 1.0 }
    }
}

pub(crate) fn already_taken(what: &str) -> io::Error {
    io::Error::other(format!("transport {what} already taken"))
}
