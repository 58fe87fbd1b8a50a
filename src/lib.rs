#![doc(html_root_url = "https://docs.rs/rsframe/latest")]
//! Public API for the `rsframe` library.
//!
//! This crate implements a multiplexed binary RPC protocol engine in the
//! style of RSocket: a frame codec, composite metadata, per-connection
//! stream bookkeeping, and the five interaction models (fire-and-forget,
//! request-response, request-stream, request-channel, metadata-push) over
//! any duplex transport.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rsframe::{
//!     ConnectionConfig, Payload, RSocket, RSocketError, RejectAll, SetupFrame, Requester,
//!     transport::FramedTransport,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl RSocket for Echo {
//!     async fn request_response(
//!         &self,
//!         payload: Payload,
//!     ) -> Result<Option<Payload>, RSocketError> {
//!         Ok(Some(payload))
//!     }
//! }
//!
//! # async fn run() -> Result<(), RSocketError> {
//! let (client_io, server_io) = tokio::io::duplex(64 * 1024);
//! let acceptor = |_: &SetupFrame, _: Requester| -> Result<Arc<dyn RSocket>, RSocketError> {
//!     Ok(Arc::new(Echo))
//! };
//! let server = tokio::spawn(rsframe::accept(
//!     FramedTransport::new(server_io),
//!     acceptor,
//!     ConnectionConfig::default(),
//! ));
//! let client = rsframe::connect(
//!     FramedTransport::new(client_io),
//!     ConnectionConfig::default(),
//!     Arc::new(RejectAll),
//! )?;
//! let reply = client.requester().request_response(Payload::from("ping")).await?;
//! assert_eq!(reply, Some(Payload::from("ping")));
//! # drop(server);
//! # Ok(())
//! # }
//! ```

pub mod byte_order;
pub mod config;
pub mod connection;
pub mod credit;
pub mod demux;
pub mod error;
pub mod frame;
pub mod hooks;
mod keepalive;
pub mod metadata;
pub mod metrics;
pub mod panic;
pub mod payload;
pub mod receiver;
pub mod registry;
pub mod requester;
mod responder;
pub mod send;
pub mod setup;
pub mod state;
pub mod stream_id;
pub mod transport;

pub use config::{ConnectionConfig, KeepAliveConfig, MissingStreamPolicy};
pub use connection::{Connection, open_connection_count};
pub use error::RSocketError;
pub use frame::{ErrorCode, Frame, FrameBody, FrameError, SetupFrame};
pub use hooks::{ErrorSink, PayloadStream, RSocket, RejectAll, SocketAcceptor};
pub use metadata::{CompositeMetadata, MimeType, WellKnownMimeType};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, STREAMS_OPENED};
pub use payload::Payload;
pub use receiver::PayloadReceiver;
pub use requester::{Requester, ResponseFuture};
pub use setup::{accept, connect};
pub use stream_id::Role;
pub use transport::DuplexConnection;
