//! Ping/pong over TCP.
//!
//! Run `cargo run --example ping_pong -- server [addr]` in one terminal and
//! `cargo run --example ping_pong -- client [addr]` in another. The client
//! sends a few request-response pings and then streams a countdown.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use rsframe::{
    ConnectionConfig,
    Payload,
    PayloadStream,
    RSocket,
    RSocketError,
    RejectAll,
    Requester,
    SetupFrame,
    transport::FramedTransport,
};
use tokio::net::{TcpListener, TcpStream};

struct PingPong;

#[async_trait]
impl RSocket for PingPong {
    async fn request_response(&self, payload: Payload) -> Result<Option<Payload>, RSocketError> {
        let text = payload
            .data_utf8()
            .map_err(|e| RSocketError::Invalid(e.to_string()))?;
        let Some(n) = text.strip_prefix("ping ") else {
            return Err(RSocketError::Invalid(format!("not a ping: {text}")));
        };
        Ok(Some(Payload::from(format!("pong {n}"))))
    }

    fn request_stream(&self, payload: Payload) -> PayloadStream {
        let from: u32 = payload
            .data_utf8()
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        stream::iter((0..=from).rev().map(|i| Ok(Payload::from(i.to_string())))).boxed()
    }
}

fn accept_ping_pong(setup: &SetupFrame, _: Requester) -> Result<Arc<dyn RSocket>, RSocketError> {
    println!("client connected: data mime {}", setup.data_mime_type);
    Ok(Arc::new(PingPong))
}

async fn serve(addr: SocketAddr) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    println!("listening on {}", listener.local_addr()?);
    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            match rsframe::accept(
                FramedTransport::new(socket),
                accept_ping_pong,
                ConnectionConfig::default(),
            )
            .await
            {
                Ok(connection) => {
                    connection.on_close().await;
                    println!("{peer} disconnected");
                }
                Err(e) => eprintln!("{peer} refused: {e}"),
            }
        });
    }
}

async fn run_client(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let socket = TcpStream::connect(addr).await?;
    let connection = rsframe::connect(
        FramedTransport::new(socket),
        ConnectionConfig::default().data_mime_type("text/plain"),
        Arc::new(RejectAll),
    )?;
    let requester = connection.requester();

    for i in 1..=3 {
        let reply = requester
            .request_response(Payload::from(format!("ping {i}")))
            .await?;
        if let Some(reply) = reply {
            println!("{}", reply.data_utf8()?);
        }
    }

    let mut countdown = requester.request_stream(Payload::from("5")).limit_rate(2);
    while let Some(item) = countdown.next().await {
        println!("countdown {}", item?.data_utf8()?);
    }

    connection.dispose();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "server".into());
    let addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:7878".into())
        .parse()?;
    match mode.as_str() {
        "server" => serve(addr).await?,
        "client" => run_client(addr).await?,
        other => return Err(format!("unknown mode {other}; expected server or client").into()),
    }
    Ok(())
}
