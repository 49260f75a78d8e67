//! Body framing for requests and responses.
//!
//! Request bodies are decoded by [`PayloadDecoder`], response bodies encoded by
//! [`PayloadEncoder`]; each delegates to a `Content-Length` or a chunked strategy
//! chosen from the message's [`PayloadSize`](crate::protocol::PayloadSize).

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
