//! An asynchronous HTTP/1.x keep-alive server engine
//!
//! This crate accepts connections, reads requests from each of them one after another,
//! hands every request to a user [`handler::Handler`] and writes the responses back in
//! order, keeping the connection open for as long as the peer, the handler and the
//! configured limits allow.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 persistent connections
//! - `Keep-Alive: timeout=N, max=M` negotiation with the peer and the handler
//! - Ordered response dispatch, even for pipelined requests
//! - Streaming request and response bodies, chunked encoding and trailers
//! - `Expect: 100-continue`
//! - Connection hand-over after `101 Switching Protocols`
//! - Graceful shutdown through a cancellation token
//! - Plain TCP or TLS (rustls) listeners
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::{Response, StatusCode};
//! use http_body_util::BodyExt;
//! use tracing::{Level, info};
//! use tracing_subscriber::FmtSubscriber;
//! use micro_keepalive::handler::{ServerRequest, make_handler};
//! use micro_keepalive::protocol::body::BoxError;
//! use micro_keepalive::server::{SessionOptions, listen_and_serve};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let handler = Arc::new(make_handler(hello_world));
//!     let server = listen_and_serve("127.0.0.1:8080", handler, SessionOptions::new()).await?;
//!     info!(local_addr = %server.local_addr(), "serving");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.close();
//!     server.closed().await;
//!     Ok(())
//! }
//!
//! async fn hello_world(request: ServerRequest) -> Result<Response<String>, BoxError> {
//!     let path = request.uri().path().to_string();
//!     let body = request.into_body().collect().await?.to_bytes();
//!     info!(%path, body_size = body.len(), "receiving request");
//!
//!     Ok(Response::builder()
//!         .status(StatusCode::OK)
//!         .header("keep-alive", "timeout=5, max=100")
//!         .body("Hello World!\r\n".to_string())?)
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: the listener supervisor and the session options
//! - [`connection`]: the per-connection session, its response queue and keep-alive state
//! - [`handler`]: the request handler trait and the request type handed to it
//! - [`cancel`]: the cancellation signal shared by the listener and its sessions
//! - [`protocol`]: protocol types and errors
//! - [`codec`]: request decoding and response encoding
//!
//! ## Keep-alive
//!
//! After every response the session negotiates the deadline for the next request and
//! the number of requests left: the tighter of what the peer declared in its
//! `Keep-Alive` header, what the handler declared in its response, and the configured
//! limits. The connection closes once the budget is used up, when either side sends
//! `Connection: close`, or when the peer stays idle past the deadline.
//!
//! ## Shutdown
//!
//! [`server::ServerHandle::close`] stops the accept loop and releases the socket.
//! Sessions stop the next time they wait for a request; handlers that are already
//! running finish and their responses are written.
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod cancel;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
