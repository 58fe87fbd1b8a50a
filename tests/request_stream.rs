//! Request-stream flow control on both ends of a connection.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use rsframe::{ErrorCode, Frame, FrameBody, Payload, RSocketError, RejectAll, frame::REQUEST_MAX};

mod common;
use common::{Echo, ErrorLog, TestResult, client, frame_text, next_frame, quiet_config, server};

const QUIET: Duration = Duration::from_millis(100);

#[tokio::test]
async fn responder_sends_only_granted_items() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_stream(1, 5, Payload::from("go")));
    for i in 0..5 {
        let frame = next_frame(&mut peer).await;
        assert_eq!(frame, Frame::next(1, Payload::from(i.to_string())));
    }
    assert!(peer.recv_timeout(QUIET).await.is_none());

    peer.send(&Frame::request_n(1, 5));
    for i in 5..10 {
        assert_eq!(
            next_frame(&mut peer).await,
            Frame::next(1, Payload::from(i.to_string()))
        );
    }
    assert_eq!(next_frame(&mut peer).await, Frame::complete(1));
    assert!(peer.recv_timeout(QUIET).await.is_none());
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn responder_stops_on_cancel() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_stream(1, 2, Payload::from("go")));
    next_frame(&mut peer).await;
    next_frame(&mut peer).await;
    peer.send(&Frame::cancel(1));
    peer.send(&Frame::request_n(1, 8));

    assert!(peer.recv_timeout(QUIET).await.is_none());
    assert_eq!(connection.active_streams(), 0);
    assert!(log.is_empty());
}

#[tokio::test]
async fn requester_opens_on_demand_and_replenishes() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let mut items = connection.requester().request_stream(Payload::from("go"));
    assert!(peer.recv_timeout(QUIET).await.is_none(), "nothing sent before demand");

    items.request(5);
    let request = next_frame(&mut peer).await;
    assert!(matches!(
        request.body(),
        FrameBody::RequestStream {
            initial_request_n: 5,
            ..
        }
    ));
    assert_eq!((request.stream_id(), frame_text(&request).as_str()), (1, "go"));

    for i in 0..5 {
        peer.send(&Frame::next(1, Payload::from(i.to_string())));
    }
    for i in 0..5 {
        let item = items.next().await.ok_or("stream ended early")??;
        assert_eq!(item, Payload::from(i.to_string()));
    }

    items.request(5);
    assert_eq!(next_frame(&mut peer).await, Frame::request_n(1, 5));
    for i in 5..10 {
        peer.send(&Frame::next(1, Payload::from(i.to_string())));
    }
    peer.send(&Frame::complete(1));

    let rest: Vec<_> = items.by_ref().collect().await;
    assert_eq!(rest.len(), 5);
    assert!(items.is_done());
    drop(items);
    assert!(peer.recv_timeout(QUIET).await.is_none(), "no cancel after completion");
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn polling_without_demand_requests_unbounded() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let mut items = connection.requester().request_stream(Payload::from("go"));
    let poll = tokio::spawn(async move { items.next().await });

    let request = next_frame(&mut peer).await;
    assert!(matches!(
        request.body(),
        FrameBody::RequestStream { initial_request_n, .. } if *initial_request_n == REQUEST_MAX
    ));
    peer.send(&Frame::error(1, ErrorCode::ApplicationError, "nope"));
    let first = poll.await.expect("poll task");
    assert!(matches!(first, Some(Err(RSocketError::Application { .. }))));
}

#[tokio::test]
async fn dropping_receiver_cancels_open_stream() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let mut items = connection.requester().request_stream(Payload::from("go"));
    items.request(1);
    next_frame(&mut peer).await;
    drop(items);

    assert_eq!(next_frame(&mut peer).await, Frame::cancel(1));
    assert_eq!(connection.active_streams(), 0);
}

#[tokio::test]
async fn dropping_unopened_receiver_sends_nothing() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    drop(connection.requester().request_stream(Payload::from("go")));

    assert!(peer.recv_timeout(QUIET).await.is_none());
}

#[tokio::test]
async fn request_stream_over_framed_transport() -> TestResult {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(rsframe::accept(
        rsframe::transport::FramedTransport::new(server_io),
        |_: &rsframe::SetupFrame,
         _: rsframe::Requester|
         -> Result<Arc<dyn rsframe::RSocket>, RSocketError> {
            Ok(Arc::new(Echo { stream_items: 32 }))
        },
        rsframe::ConnectionConfig::default(),
    ));
    let client = rsframe::connect(
        rsframe::transport::FramedTransport::new(client_io),
        rsframe::ConnectionConfig::default(),
        Arc::new(RejectAll),
    )?;

    let items: Vec<_> = client
        .requester()
        .request_stream(Payload::from("go"))
        .limit_rate(4)
        .collect()
        .await;

    assert_eq!(items.len(), 32);
    assert!(items.iter().all(Result::is_ok));
    client.dispose();
    server.await??.on_close().await;
    Ok(())
}

struct Flaky;

#[async_trait::async_trait]
impl rsframe::RSocket for Flaky {
    fn request_stream(&self, _payload: Payload) -> rsframe::PayloadStream {
        Box::pin(async_stream::stream! {
            yield Ok(Payload::from("first"));
            yield Ok(Payload::from("second"));
            yield Err(RSocketError::application("ran dry"));
        })
    }
}

#[tokio::test]
async fn handler_error_terminates_stream_with_error_frame() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Flaky)).await;

    peer.send(&Frame::request_stream(1, REQUEST_MAX, Payload::from("go")));

    assert_eq!(next_frame(&mut peer).await, Frame::next(1, Payload::from("first")));
    assert_eq!(next_frame(&mut peer).await, Frame::next(1, Payload::from("second")));
    assert_eq!(
        next_frame(&mut peer).await,
        Frame::error(1, ErrorCode::ApplicationError, "ran dry")
    );
    assert_eq!(connection.active_streams(), 0);
    assert_eq!(log.len(), 1);
}
