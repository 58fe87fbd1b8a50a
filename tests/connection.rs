//! Connection-wide behaviour: teardown, stream-zero frames, and the
//! never-issued stream policy.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rsframe::{
    ErrorCode,
    Frame,
    FrameBody,
    MissingStreamPolicy,
    Payload,
    RSocket,
    RSocketError,
    RejectAll,
    frame::KeepAliveFrame,
};
use rsframe_testing::{LoggerHandle, logger};
use rstest::rstest;
use serial_test::serial;
use tokio::sync::mpsc;

mod common;
use common::{Echo, ErrorLog, TestResult, client, next_frame, quiet_config, server};

const QUIET: Duration = Duration::from_millis(100);

#[tokio::test]
async fn connection_error_fails_every_stream_once() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;
    let requester = connection.requester();

    let single = requester.request_response(Payload::from("a"));
    let mut many = requester.request_stream(Payload::from("b"));
    many.request(4);
    next_frame(&mut peer).await;
    next_frame(&mut peer).await;

    peer.send(&Frame::error(0, ErrorCode::ConnectionError, "going away"));

    assert!(matches!(single.await, Err(RSocketError::Connection(m)) if m == "going away"));
    assert!(matches!(many.next().await, Some(Err(RSocketError::Connection(_)))));
    assert!(many.next().await.is_none());
    tokio::time::timeout(Duration::from_secs(2), peer.disposed()).await?;

    assert!(connection.is_disposed());
    assert!(connection.availability() < f64::EPSILON);
    assert_eq!(log.len(), 1);
    assert_eq!(peer.dispose_calls(), 1);
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn dispose_is_idempotent_and_fails_pending_requests() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;

    let pending = connection.requester().request_response(Payload::from("a"));
    next_frame(&mut peer).await;
    connection.dispose();
    connection.dispose();

    assert!(matches!(pending.await, Err(RSocketError::ConnectionClosed)));
    connection.on_close().await;
    tokio::time::timeout(Duration::from_secs(2), peer.disposed()).await?;
    assert_eq!(peer.dispose_calls(), 1);
    assert!(log.is_empty());

    let late = connection.requester().request_response(Payload::from("b"));
    assert!(matches!(late.await, Err(RSocketError::ConnectionClosed)));
    assert!(matches!(
        connection.requester().fire_and_forget(Payload::from("c")),
        Err(RSocketError::ConnectionClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn transport_eof_closes_without_reporting() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.close();
    connection.on_close().await;

    assert!(connection.is_disposed());
    assert!(log.is_empty());
    tokio::time::timeout(Duration::from_secs(2), peer.disposed()).await?;
    Ok(())
}

#[tokio::test]
async fn transport_failure_is_reported_once() {
    let log = ErrorLog::new();
    let (connection, peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.fail(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
    connection.on_close().await;

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RSocketError::Io(_)));
}

#[rstest]
#[case(MissingStreamPolicy::Fatal)]
#[case(MissingStreamPolicy::Report)]
#[tokio::test]
async fn frame_for_never_issued_stream_follows_policy(#[case] policy: MissingStreamPolicy) {
    let log = ErrorLog::new();
    let config = quiet_config(&log).missing_stream_policy(policy);
    let (connection, mut peer) = client(config, Arc::new(RejectAll)).await;

    peer.send(&Frame::next(7, Payload::from("stray")));

    match policy {
        MissingStreamPolicy::Fatal => {
            let frame = next_frame(&mut peer).await;
            assert_eq!(frame.stream_id(), 0);
            assert!(matches!(
                frame.body(),
                FrameBody::Error(e) if e.code == ErrorCode::ConnectionError
            ));
            connection.on_close().await;
        }
        MissingStreamPolicy::Report => {
            assert!(peer.recv_timeout(QUIET).await.is_none());
            assert!(!connection.is_disposed());
        }
    }
    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RSocketError::ProtocolViolation(_)));
}

#[tokio::test]
async fn malformed_stream_zero_frame_is_fatal() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    // EXT frame on stream 0 without the IGNORE flag.
    peer.send_bytes(Bytes::from_static(&[0, 0, 0, 0, 0xFC, 0x00]));

    let frame = next_frame(&mut peer).await;
    assert!(matches!(
        frame.body(),
        FrameBody::Error(e) if e.code == ErrorCode::ConnectionError
    ));
    connection.on_close().await;
    assert_eq!(log.len(), 1);
}

/// REQUEST_N with a zero count, which the codec refuses.
fn zero_request_n(stream_id: u32) -> Bytes {
    let mut frame = stream_id.to_be_bytes().to_vec();
    frame.extend_from_slice(&[0x20, 0x00, 0, 0, 0, 0]);
    Bytes::from(frame)
}

#[tokio::test]
async fn malformed_frame_errors_only_live_responder_streams() {
    let log = ErrorLog::new();
    let (connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send_bytes(zero_request_n(1));
    assert!(peer.recv_timeout(QUIET).await.is_none(), "no stream 1 to fail");
    assert_eq!(log.len(), 1);

    peer.send(&Frame::request_stream(3, 1, Payload::from("go")));
    assert_eq!(next_frame(&mut peer).await, Frame::next(3, Payload::from("0")));
    peer.send_bytes(zero_request_n(3));

    let reply = next_frame(&mut peer).await;
    assert_eq!(reply.stream_id(), 3);
    assert!(matches!(reply.body(), FrameBody::Error(_)));
    assert!(peer.recv_timeout(QUIET).await.is_none());
    assert_eq!(log.len(), 2);
    assert_eq!(connection.active_streams(), 0);
    assert!(!connection.is_disposed());
}

#[tokio::test]
async fn stream_errors_do_not_leak_into_other_streams() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;
    let requester = connection.requester();

    let failing = requester.request_response(Payload::from("a"));
    let healthy = requester.request_response(Payload::from("b"));
    next_frame(&mut peer).await;
    next_frame(&mut peer).await;

    peer.send(&Frame::error(1, ErrorCode::ApplicationError, "bad"));
    peer.send(&Frame::next_complete(3, Payload::from("ok")));

    assert!(failing.await.is_err());
    assert_eq!(healthy.await?, Some(Payload::from("ok")));
    assert!(!connection.is_disposed());
    Ok(())
}

#[tokio::test]
async fn responder_answers_keepalive_with_same_data() {
    let log = ErrorLog::new();
    let (_connection, mut peer) = server(quiet_config(&log), Arc::new(Echo::default())).await;

    peer.send(&Frame::keepalive(true, 0, Bytes::from_static(b"probe")));

    let reply = next_frame(&mut peer).await;
    assert!(matches!(
        reply.body(),
        FrameBody::KeepAlive(KeepAliveFrame { respond: false, data, .. })
            if data == &Bytes::from_static(b"probe")
    ));
}

struct Recording(mpsc::UnboundedSender<String>);

#[async_trait]
impl RSocket for Recording {
    async fn fire_and_forget(&self, payload: Payload) -> Result<(), RSocketError> {
        let _ = self.0.send(format!("fnf:{}", payload.data_utf8().unwrap_or_default()));
        Ok(())
    }

    async fn metadata_push(&self, metadata: Bytes) -> Result<(), RSocketError> {
        let _ = self
            .0
            .send(format!("push:{}", String::from_utf8_lossy(&metadata)));
        Ok(())
    }
}

#[tokio::test]
async fn fire_and_forget_and_metadata_push_reach_handler() {
    let log = ErrorLog::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_connection, peer) = server(quiet_config(&log), Arc::new(Recording(tx))).await;

    peer.send(&Frame::request_fnf(1, Payload::from("hello")));
    peer.send(&Frame::metadata_push(Bytes::from_static(b"routes")));

    let mut seen = vec![
        rx.recv().await.expect("first call"),
        rx.recv().await.expect("second call"),
    ];
    seen.sort();
    assert_eq!(seen, ["fnf:hello", "push:routes"]);
    assert!(log.is_empty());
}

#[tokio::test]
async fn requester_fire_and_forget_and_metadata_push_are_sent() -> TestResult {
    let log = ErrorLog::new();
    let (connection, mut peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;
    let requester = connection.requester();

    requester.fire_and_forget(Payload::from("note"))?;
    requester.metadata_push(Bytes::from_static(b"meta"))?;

    assert_eq!(
        next_frame(&mut peer).await,
        Frame::request_fnf(1, Payload::from("note"))
    );
    assert_eq!(
        next_frame(&mut peer).await,
        Frame::metadata_push(Bytes::from_static(b"meta"))
    );
    assert_eq!(connection.active_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn unsupported_model_is_rejected_with_application_error() {
    let log = ErrorLog::new();
    let (_connection, mut peer) = server(quiet_config(&log), Arc::new(RejectAll)).await;

    peer.send(&Frame::request_stream(1, 1, Payload::from("x")));

    let reply = next_frame(&mut peer).await;
    assert_eq!(reply.stream_id(), 1);
    assert!(matches!(
        reply.body(),
        FrameBody::Error(e) if e.code == ErrorCode::ApplicationError
    ));
}

#[rstest]
#[serial]
#[tokio::test]
async fn lifecycle_is_logged(mut logger: LoggerHandle) {
    let log = ErrorLog::new();
    let (connection, _peer) = client(quiet_config(&log), Arc::new(RejectAll)).await;
    connection.dispose();
    connection.on_close().await;

    let messages = logger.messages();
    assert!(
        messages
            .iter()
            .any(|m| m.starts_with("connection opened: role=Client")),
        "missing open log: {messages:?}"
    );
    assert!(
        messages
            .iter()
            .any(|m| m.starts_with("connection closed: role=Client, cause=connection closed")),
        "missing close log: {messages:?}"
    );
}
