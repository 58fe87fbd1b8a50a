//! Shared fixtures for connection-level integration tests.
//!
//! Each helper runs one `rsframe` endpoint over a [`TestConnection`] so the
//! test plays the remote side frame by frame.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use rsframe::{
    Connection,
    ConnectionConfig,
    Frame,
    FrameBody,
    KeepAliveConfig,
    Payload,
    PayloadReceiver,
    PayloadStream,
    RSocket,
    RSocketError,
    Requester,
    SetupFrame,
    frame::PROTOCOL_VERSION,
};
pub use rsframe_testing::{ErrorLog, Peer, TestConnection, TestResult};

/// How long a test waits for a frame it expects.
pub const WAIT: Duration = Duration::from_secs(2);

/// Config with keepalive timers off, reporting into `log`.
pub fn quiet_config(log: &ErrorLog) -> ConnectionConfig {
    ConnectionConfig::default()
        .keepalive(KeepAliveConfig::DISABLED)
        .error_sink(log.sink())
}

/// SETUP frame a well-behaved client would send.
pub fn setup_frame() -> Frame {
    setup_with_keepalive(Duration::from_secs(20), Duration::from_secs(90))
}

/// SETUP frame advertising the given keepalive interval and lifetime.
pub fn setup_with_keepalive(interval: Duration, max_lifetime: Duration) -> Frame {
    Frame::setup(SetupFrame {
        major_version: PROTOCOL_VERSION.0,
        minor_version: PROTOCOL_VERSION.1,
        keepalive_interval: interval,
        max_lifetime,
        resume_token: None,
        lease: false,
        metadata_mime_type: "application/binary".to_owned(),
        data_mime_type: "application/binary".to_owned(),
        payload: Payload::default(),
    })
}

/// Connect a client and consume its SETUP frame.
///
/// # Panics
///
/// Panics if the client does not open with SETUP.
pub async fn client(config: ConnectionConfig, handler: Arc<dyn RSocket>) -> (Connection, Peer) {
    let (transport, mut peer) = TestConnection::new();
    let connection = rsframe::connect(transport, config, handler).expect("connect");
    let setup = peer.recv_timeout(WAIT).await.expect("setup frame");
    assert!(matches!(setup.body(), FrameBody::Setup(_)));
    (connection, peer)
}

/// Accept a server connection after the peer sends a valid SETUP.
///
/// # Panics
///
/// Panics if the server refuses the SETUP.
pub async fn server(config: ConnectionConfig, handler: Arc<dyn RSocket>) -> (Connection, Peer) {
    server_with_setup(config, handler, setup_frame()).await
}

/// Accept a server connection after the peer sends `setup`.
///
/// # Panics
///
/// Panics if the server refuses the SETUP.
pub async fn server_with_setup(
    config: ConnectionConfig,
    handler: Arc<dyn RSocket>,
    setup: Frame,
) -> (Connection, Peer) {
    let (transport, peer) = TestConnection::new();
    peer.send(&setup);
    let acceptor =
        move |_: &SetupFrame, _: Requester| -> Result<Arc<dyn RSocket>, RSocketError> {
            Ok(Arc::clone(&handler))
        };
    let connection = rsframe::accept(transport, acceptor, config)
        .await
        .expect("accept");
    (connection, peer)
}

/// Next frame the engine writes, failing the test if none arrives.
///
/// # Panics
///
/// Panics when nothing is written within [`WAIT`].
pub async fn next_frame(peer: &mut Peer) -> Frame {
    peer.recv_timeout(WAIT).await.expect("expected a frame")
}

/// Handler covering every interaction model with simple echo semantics.
pub struct Echo {
    /// Items produced by `request_stream`.
    pub stream_items: usize,
}

impl Default for Echo {
    fn default() -> Self { Self { stream_items: 10 } }
}

#[async_trait]
impl RSocket for Echo {
    async fn fire_and_forget(&self, _payload: Payload) -> Result<(), RSocketError> { Ok(()) }

    async fn request_response(&self, payload: Payload) -> Result<Option<Payload>, RSocketError> {
        match payload.data_utf8() {
            Ok("ping") => Ok(Some(Payload::from("pong"))),
            Ok("empty") => Ok(None),
            Ok("fail") => Err(RSocketError::application("boom")),
            _ => Ok(Some(payload)),
        }
    }

    fn request_stream(&self, _payload: Payload) -> PayloadStream {
        stream::iter((0..self.stream_items).map(|i| Ok(Payload::from(i.to_string())))).boxed()
    }

    fn request_channel(&self, inbound: PayloadReceiver) -> PayloadStream {
        inbound
            .map(|item| {
                item.map(|payload| {
                    let text = payload.data_utf8().unwrap_or_default().to_uppercase();
                    Payload::from(text)
                })
            })
            .boxed()
    }

    async fn metadata_push(&self, _metadata: bytes::Bytes) -> Result<(), RSocketError> { Ok(()) }
}

/// Data of a payload-carrying frame as UTF-8.
///
/// # Panics
///
/// Panics if `frame` carries no payload.
pub fn frame_text(frame: &Frame) -> String {
    let payload = match frame.body() {
        FrameBody::Payload(p) => &p.payload,
        FrameBody::RequestResponse(p) | FrameBody::RequestFnf(p) => p,
        FrameBody::RequestStream { payload, .. } | FrameBody::RequestChannel { payload, .. } => {
            payload
        }
        other => panic!("frame carries no payload: {other:?}"),
    };
    payload.data_utf8().expect("utf8 payload").to_owned()
}
