//! [`DuplexConnection`] over any async byte stream.

use std::{
    io,
    sync::{Mutex, PoisonError},
};

use bytes::Bytes;
use futures::{
    FutureExt,
    SinkExt,
    StreamExt,
    future::{self, BoxFuture},
    stream::{self, BoxStream},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use super::{DuplexConnection, FrameLengthCodec, already_taken};

type Reader<T> = FramedRead<ReadHalf<T>, FrameLengthCodec>;
type Writer<T> = FramedWrite<WriteHalf<T>, FrameLengthCodec>;

/// Length-prefixed frames over a byte stream such as a `TcpStream` or a
/// `tokio::io::DuplexStream`.
///
/// ```
/// use rsframe::transport::{DuplexConnection, FramedTransport};
///
/// let (client, _server) = tokio::io::duplex(1024);
/// let transport = FramedTransport::new(client);
/// assert!(!transport.is_disposed());
/// transport.dispose();
/// assert_eq!(transport.availability(), 0.0);
/// ```
pub struct FramedTransport<T> {
    reader: Mutex<Option<Reader<T>>>,
    writer: Mutex<Option<Writer<T>>>,
    closed: CancellationToken,
}

impl<T> FramedTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap `io` using the largest frame length the prefix allows.
    pub fn new(io: T) -> Self { Self::with_codec(io, FrameLengthCodec::default) }

    /// Wrap `io`, building reader and writer codecs with `codec`.
    pub fn with_codec(io: T, codec: impl Fn() -> FrameLengthCodec) -> Self {
        let (read, write) = tokio::io::split(io);
        Self {
            reader: Mutex::new(Some(FramedRead::new(read, codec()))),
            writer: Mutex::new(Some(FramedWrite::new(write, codec()))),
            closed: CancellationToken::new(),
        }
    }
}

fn take<V>(slot: &Mutex<Option<V>>) -> Option<V> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl<T> DuplexConnection for FramedTransport<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    fn send(&self, frames: BoxStream<'static, Bytes>) -> BoxFuture<'static, io::Result<()>> {
        let Some(mut writer) = take(&self.writer) else {
            return future::ready(Err(already_taken("writer"))).boxed();
        };
        let closed = self.closed.clone();
        async move {
            let mut frames = frames.map(Ok);
            tokio::select! {
                result = writer.send_all(&mut frames) => result?,
                () = closed.cancelled() => return Ok(()),
            }
            writer.close().await
        }
        .boxed()
    }

    fn receive(&self) -> BoxStream<'static, io::Result<Bytes>> {
        match take(&self.reader) {
            Some(reader) => reader.take_until(self.closed.clone().cancelled_owned()).boxed(),
            None => stream::once(future::ready(Err(already_taken("reader")))).boxed(),
        }
    }

    fn dispose(&self) { self.closed.cancel(); }

    fn is_disposed(&self) -> bool { self.closed.is_cancelled() }

    fn on_close(&self) -> BoxFuture<'static, ()> { self.closed.clone().cancelled_owned().boxed() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_a_duplex_pipe() {
        let (a, b) = tokio::io::duplex(64);
        let left = FramedTransport::new(a);
        let right = FramedTransport::new(b);
        let frames = stream::iter([Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        left.send(frames.boxed()).await.expect("send");
        let received: Vec<_> = right.receive().take(2).map(|f| f.expect("frame")).collect().await;
        assert_eq!(received, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }

    #[tokio::test]
    async fn receive_is_single_subscription() {
        let (a, _b) = tokio::io::duplex(64);
        let transport = FramedTransport::new(a);
        drop(transport.receive());
        let second = transport.receive().next().await;
        assert!(matches!(second, Some(Err(_))));
    }

    #[tokio::test]
    async fn dispose_ends_inbound_and_resolves_on_close() {
        let (a, _b) = tokio::io::duplex(64);
        let transport = FramedTransport::new(a);
        let mut inbound = transport.receive();
        let closed = transport.on_close();
        transport.dispose();
        closed.await;
        assert!(inbound.next().await.is_none());
        assert!(transport.is_disposed());
    }
}
