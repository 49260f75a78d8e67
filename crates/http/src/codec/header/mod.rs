//! Request header decoding and response header encoding.
//!
//! - [`HeaderDecoder`]: parses the request line and header fields, enforcing the
//!   header count and size limits
//! - [`HeaderEncoder`]: writes the status line and header fields, setting the
//!   `Content-Length` or `Transfer-Encoding` header that matches the body framing

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub(crate) use header_decoder::MAX_HEADER_NUM;
pub use header_encoder::HeaderEncoder;
