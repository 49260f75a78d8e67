//! HTTP response header handling.

use http::Response;

/// Type alias for HTTP response headers.
///
/// The header portion of a response, `http::Response<()>` with an empty body
/// placeholder, as passed to the response encoder.
pub type ResponseHead = Response<()>;
