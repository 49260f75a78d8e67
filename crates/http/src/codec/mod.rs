//! The wire codec: turns bytes into requests and responses into bytes.
//!
//! - [`RequestDecoder`]: a `tokio_util` [`Decoder`](tokio_util::codec::Decoder) yielding
//!   request headers and body items
//! - [`ResponseEncoder`]: an [`Encoder`](tokio_util::codec::Encoder) for response heads
//!   and body items, trailers included
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_keepalive::codec::RequestDecoder;
//! use micro_keepalive::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n"[..]);
//! let message = RequestDecoder::new().decode(&mut buffer).unwrap();
//! assert!(matches!(message, Some(Message::Header(_))));
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
