//! Connection establishment.
//!
//! A client sends SETUP as its first frame and starts immediately. A server
//! reads the first frame, validates it, and asks a [`SocketAcceptor`] for
//! the handler; any refusal is answered with an ERROR frame on stream zero
//! before the transport is disposed.

use std::sync::Arc;

use bytes::Bytes;
use futures::{
    StreamExt,
    future,
    stream::{self, BoxStream},
};

use crate::{
    config::{ConnectionConfig, KeepAliveConfig},
    connection::{Connection, ConnectionInner, Termination},
    error::RSocketError,
    frame::{Frame, FrameBody, PROTOCOL_VERSION, SetupFrame},
    hooks::{RSocket, SocketAcceptor},
    requester::Requester,
    send,
    stream_id::Role,
    transport::DuplexConnection,
};

/// Open a client connection over `transport`.
///
/// `handler` answers requests the server sends back over the connection.
///
/// # Errors
///
/// Fails if the SETUP frame built from `config` cannot be encoded; the
/// transport is disposed in that case.
pub fn connect<T>(
    transport: T,
    config: ConnectionConfig,
    handler: Arc<dyn RSocket>,
) -> Result<Connection, RSocketError>
where
    T: DuplexConnection,
{
    let transport: Arc<dyn DuplexConnection> = Arc::new(transport);
    let setup = Frame::setup(SetupFrame {
        major_version: PROTOCOL_VERSION.0,
        minor_version: PROTOCOL_VERSION.1,
        keepalive_interval: config.keepalive.tick_period,
        max_lifetime: config.max_lifetime,
        resume_token: None,
        lease: false,
        metadata_mime_type: config.metadata_mime_type.clone(),
        data_mime_type: config.data_mime_type.clone(),
        payload: config.setup_payload.clone(),
    });
    let (sender, outbound) = send::channel();
    if let Err(error) = sender.send(&setup) {
        transport.dispose();
        return Err(error);
    }
    let inner = ConnectionInner::new(Role::Client, Arc::clone(&transport), &config, sender);
    inner.start(transport.receive(), outbound, config.prefetch, handler);
    Ok(Connection::new(inner))
}

/// Accept a server connection over `transport`.
///
/// Waits for the client's SETUP frame and hands it to `acceptor` together
/// with a [`Requester`] for calling back into the client. The connection
/// watches for client keepalives with the interval and maximum lifetime
/// the SETUP advertises; `config`'s own keepalive timing is not used.
///
/// # Errors
///
/// Returns [`RSocketError::InvalidSetup`] when the first frame is not a
/// valid SETUP, [`RSocketError::UnsupportedSetup`] for an unsupported
/// version or a resumption request, and [`RSocketError::RejectedSetup`]
/// when the acceptor refuses. The client is sent the matching ERROR frame
/// and the transport is disposed.
pub async fn accept<T, A>(
    transport: T,
    acceptor: A,
    config: ConnectionConfig,
) -> Result<Connection, RSocketError>
where
    T: DuplexConnection,
    A: SocketAcceptor,
{
    let transport: Arc<dyn DuplexConnection> = Arc::new(transport);
    let mut inbound = transport.receive();
    let setup = match read_setup(&mut inbound).await {
        Ok(setup) => setup,
        Err(error) => return Err(refuse(&*transport, &config, error).await),
    };
    tracing::debug!(
        version = %format_args!("{}.{}", setup.major_version, setup.minor_version),
        keepalive_ms = setup.keepalive_interval.as_millis(),
        max_lifetime_ms = setup.max_lifetime.as_millis(),
        data_mime_type = %setup.data_mime_type,
        "setup received"
    );
    let config = config.keepalive(KeepAliveConfig::from_setup(&setup));

    let (sender, outbound) = send::channel();
    let inner = ConnectionInner::new(Role::Server, Arc::clone(&transport), &config, sender);
    match acceptor
        .accept(&setup, Requester::new(Arc::clone(&inner)))
        .await
    {
        Ok(handler) => {
            inner.start(inbound, outbound, config.prefetch, handler);
            Ok(Connection::new(inner))
        }
        Err(error) => {
            inner.terminate(Termination::Dispose);
            let error = RSocketError::RejectedSetup(error.wire_message());
            Err(refuse(&*transport, &config, error).await)
        }
    }
}

async fn read_setup(
    inbound: &mut BoxStream<'static, std::io::Result<Bytes>>,
) -> Result<SetupFrame, RSocketError> {
    let bytes = match inbound.next().await {
        Some(Ok(bytes)) => bytes,
        Some(Err(error)) => return Err(error.into()),
        None => return Err(RSocketError::ConnectionClosed),
    };
    let frame = Frame::decode(&bytes)
        .map_err(|e| RSocketError::InvalidSetup(format!("malformed SETUP frame: {e}")))?;
    let frame_type = frame.frame_type();
    let FrameBody::Setup(setup) = frame.into_body() else {
        return Err(RSocketError::InvalidSetup(format!(
            "first frame must be SETUP, got {frame_type:?}"
        )));
    };
    if setup.major_version != PROTOCOL_VERSION.0 {
        return Err(RSocketError::UnsupportedSetup(format!(
            "unsupported protocol version {}.{}",
            setup.major_version, setup.minor_version
        )));
    }
    if setup.resume_token.is_some() {
        return Err(RSocketError::UnsupportedSetup(
            "resumption is not supported".to_owned(),
        ));
    }
    Ok(setup)
}

/// Report `error`, tell the client when the transport still works, and
/// dispose the transport.
async fn refuse(
    transport: &dyn DuplexConnection,
    config: &ConnectionConfig,
    error: RSocketError,
) -> RSocketError {
    config.error_sink.report(&error);
    let reply = match &error {
        RSocketError::Io(_) | RSocketError::ConnectionClosed => None,
        other => other.to_frame(0).encode().ok(),
    };
    if let Some(bytes) = reply {
        let frames = stream::once(future::ready(bytes)).boxed();
        if let Err(e) = transport.send(frames).await {
            tracing::debug!(error = %e, "setup refusal not delivered");
        }
    }
    transport.dispose();
    error
}
