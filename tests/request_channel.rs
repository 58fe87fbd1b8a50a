//! Request-channel: both directions flow-controlled on one stream id.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use rsframe::{
    ConnectionConfig,
    ErrorCode,
    Frame,
    FrameBody,
    Payload,
    PayloadReceiver,
    PayloadStream,
    RSocket,
    RSocketError,
    RejectAll,
    Requester,
    SetupFrame,
    transport::FramedTransport,
};
use tokio::sync::oneshot;

mod common;
use common::{Echo, ErrorLog, TestResult, client, frame_text, next_frame, quiet_config, server};

const QUIET: Duration = Duration::from_millis(100);

fn upstream(items: &[&'static str]) -> impl futures::Stream<Item = Result<Payload, RSocketError>> {
    stream::iter(items.to_vec()).map(|s| Ok(Payload::from(s)))
}

#[tokio::test]
async fn channel_echo_over_framed_transport() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(rsframe::accept(
        FramedTransport::new(server_io),
        |_: &SetupFrame, _: Requester| -> Result<Arc<dyn RSocket>, RSocketError> {
            Ok(Arc::new(Echo::default()))
        },
        ConnectionConfig::default(),
    ));
    let client = rsframe::connect(
        FramedTransport::new(client_io),
        ConnectionConfig::default(),
        Arc::new(RejectAll),
    )?;

    let replies: Vec<String> = client
        .requester()
        .request_channel(upstream(&["a", "b", "c"]))
        .map(|item| item.map(|p| p.data_utf8().unwrap_or_default().to_owned()))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;

    assert_eq!(replies, ["A", "B", "C"]);
    let server = server.await??;
    assert_eq!(client.active_streams(), 0);
    client.dispose();
    server.on_close().await;
    Ok(())
}

#[tokio::test]
async fn requester_opens_with_first_payload_and_waits_for_credit() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let mut replies = connection
        .requester()
        .request_channel(upstream(&["one", "two", "three"]));
    replies.request(2);

    let open = next_frame(&mut peer).await;
    assert!(matches!(
        open.body(),
        FrameBody::RequestChannel {
            initial_request_n: 2,
            complete: false,
            ..
        }
    ));
    assert_eq!(frame_text(&open), "one");
    assert!(peer.recv_timeout(QUIET).await.is_none(), "no credit granted yet");

    peer.send(&Frame::request_n(1, 1));
    let second = next_frame(&mut peer).await;
    assert_eq!(second, Frame::next(1, Payload::from("two")));
    assert!(peer.recv_timeout(QUIET).await.is_none());

    peer.send(&Frame::request_n(1, 5));
    assert_eq!(next_frame(&mut peer).await, Frame::next(1, Payload::from("three")));
    assert_eq!(next_frame(&mut peer).await, Frame::complete(1));

    peer.send(&Frame::next_complete(1, Payload::from("done")));
    assert_eq!(replies.next().await.transpose()?, Some(Payload::from("done")));
    assert!(replies.next().await.is_none());
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn upstream_error_is_sent_and_fails_receiver() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let items = vec![
        Ok(Payload::from("first")),
        Err(RSocketError::application("upstream broke")),
    ];
    let mut replies = connection.requester().request_channel(stream::iter(items));
    replies.request(1);
    next_frame(&mut peer).await;
    peer.send(&Frame::request_n(1, 1));

    assert_eq!(
        next_frame(&mut peer).await,
        Frame::error(1, ErrorCode::ApplicationError, "upstream broke")
    );
    assert!(matches!(replies.next().await, Some(Err(RSocketError::Application { .. }))));
}

#[tokio::test]
async fn cancel_from_responder_ends_both_directions() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let mut replies = connection
        .requester()
        .request_channel(upstream(&["a", "b"]));
    replies.request(1);
    next_frame(&mut peer).await;
    peer.send(&Frame::cancel(1));
    peer.send(&Frame::request_n(1, 10));

    assert!(matches!(replies.next().await, Some(Err(RSocketError::Canceled(_)))));
    assert!(peer.recv_timeout(QUIET).await.is_none(), "upstream stopped after cancel");
    assert!(log.is_empty());
}

#[tokio::test]
async fn responder_channel_receives_requester_payloads() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_channel(1, 10, Payload::from("x"), false));
    let mut seen = Vec::new();
    while seen.len() < 2 {
        seen.push(next_frame(&mut peer).await);
    }
    assert!(seen.contains(&Frame::next(1, Payload::from("X"))));
    assert!(
        seen.iter()
            .any(|f| matches!(f.body(), FrameBody::RequestN(_)) && f.stream_id() == 1),
        "responder grants demand on its inbound side"
    );

    peer.send(&Frame::next(1, Payload::from("y")));
    assert_eq!(next_frame(&mut peer).await, Frame::next(1, Payload::from("Y")));
    peer.send(&Frame::complete(1));
    assert_eq!(next_frame(&mut peer).await, Frame::complete(1));
    assert_eq!(connection.active_streams(), 0);
}

#[tokio::test]
async fn completed_channel_request_finishes_inbound_immediately() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_channel(1, 10, Payload::from("only"), true));

    let mut frames = Vec::new();
    while !frames.contains(&Frame::complete(1)) {
        frames.push(next_frame(&mut peer).await);
    }
    assert!(frames.contains(&Frame::next(1, Payload::from("ONLY"))));
    assert_eq!(connection.active_streams(), 0);
}

/// Hands the channel's inbound receiver to the test and never answers.
struct KeepInbound(Mutex<Option<oneshot::Sender<PayloadReceiver>>>);

#[async_trait]
impl RSocket for KeepInbound {
    fn request_channel(&self, inbound: PayloadReceiver) -> PayloadStream {
        let slot = self.0.lock().expect("lock").take();
        if let Some(tx) = slot {
            let _ = tx.send(inbound);
        }
        stream::pending().boxed()
    }
}

#[tokio::test]
async fn connection_error_fails_responder_inbound() -> TestResult {
    let log = ErrorLog::new();
    let (tx, rx) = oneshot::channel();
    let handler = Arc::new(KeepInbound(Mutex::new(Some(tx))));
    let (connection, peer) = server(quiet_config(&log), handler).await;

    peer.send(&Frame::request_channel(1, 1, Payload::from("x"), false));
    let mut inbound = tokio::time::timeout(common::WAIT, rx).await??;
    assert_eq!(inbound.next().await.transpose()?, Some(Payload::from("x")));

    peer.send(&Frame::error(0, ErrorCode::ConnectionError, "peer gave up"));
    connection.on_close().await;

    let after = tokio::time::timeout(common::WAIT, inbound.next()).await?;
    assert!(
        matches!(after, Some(Err(RSocketError::Connection(_)))),
        "inbound must fail, got {after:?}"
    );
    Ok(())
}
