//! Request-response in both directions over a scripted peer.

use std::{sync::Arc, time::Duration};

use rsframe::{ErrorCode, Frame, FrameBody, Payload, RSocketError, RejectAll, frame::PayloadFrame};
use rstest::rstest;

mod common;
use common::{Echo, ErrorLog, TestResult, client, frame_text, next_frame, quiet_config, server};

#[tokio::test]
async fn responder_answers_ping_with_one_next_complete() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_response(1, Payload::from("ping")));
    let reply = next_frame(&mut peer).await;

    assert_eq!(reply, Frame::next_complete(1, Payload::from("pong")));
    assert!(peer.recv_timeout(Duration::from_millis(100)).await.is_none());
    assert_eq!(connection.active_streams(), 0);
    assert!(log.is_empty());
    Ok(())
}

#[rstest]
#[case("empty", Frame::complete(1))]
#[case("fail", Frame::error(1, ErrorCode::ApplicationError, "boom"))]
#[tokio::test]
async fn responder_maps_handler_outcomes(#[case] request: &'static str, #[case] expected: Frame) {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::request_response(1, Payload::from(request)));

    assert_eq!(next_frame(&mut peer).await, expected);
    assert_eq!(connection.active_streams(), 0);
}

#[tokio::test]
async fn requester_resolves_with_reply() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let pending = connection
        .requester()
        .request_response(Payload::from("hello"));
    assert_eq!(pending.stream_id(), 1);
    let request = next_frame(&mut peer).await;
    assert!(matches!(request.body(), FrameBody::RequestResponse(_)));
    assert_eq!(frame_text(&request), "hello");

    peer.send(&Frame::next_complete(1, Payload::from("world")));
    assert_eq!(pending.await?, Some(Payload::from("world")));
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn requester_surfaces_stream_error() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let pending = connection.requester().request_response(Payload::from("x"));
    next_frame(&mut peer).await;
    peer.send(&Frame::error(1, ErrorCode::Rejected, "busy"));

    assert!(matches!(pending.await, Err(RSocketError::Rejected(m)) if m == "busy"));
    assert!(!connection.is_disposed());
    assert!(log.is_empty());
}

#[tokio::test]
async fn dropping_pending_response_cancels_once_and_ignores_late_reply() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let pending = connection.requester().request_response(Payload::from("slow"));
    next_frame(&mut peer).await;
    drop(pending);

    assert_eq!(next_frame(&mut peer).await, Frame::cancel(1));
    peer.send(&Frame::next_complete(1, Payload::from("late")));
    assert!(peer.recv_timeout(Duration::from_millis(100)).await.is_none());

    assert!(!connection.is_disposed());
    assert!(log.is_empty());
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn resolved_response_does_not_cancel() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let pending = connection.requester().request_response(Payload::from("x"));
    next_frame(&mut peer).await;
    peer.send(&Frame::new(
        1,
        FrameBody::Payload(PayloadFrame {
            payload: Payload::default(),
            next: false,
            complete: true,
        }),
    ));

    assert!(matches!(pending.await, Ok(None)));
    assert!(peer.recv_timeout(Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn client_stream_ids_are_odd_and_increasing() {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;
    let requester = connection.requester();

    let first = requester.request_response(Payload::from("a"));
    let second = requester.request_response(Payload::from("b"));

    assert_eq!((first.stream_id(), second.stream_id()), (1, 3));
    assert_eq!(next_frame(&mut peer).await.stream_id(), 1);
    assert_eq!(next_frame(&mut peer).await.stream_id(), 3);
}
