//! Request and response body types.
//!
//! - [`ReqBody`]: the request body handed to handlers. It pulls payload items from the
//!   connection on demand, so the session stays in control of the byte stream and can
//!   skip whatever the handler leaves unread.
//! - [`ResponseBody`]: the response body accepted by the dispatch queue: empty, a
//!   single buffer, or a boxed stream, optionally followed by trailers.

mod req_body;
mod resp_body;

pub(crate) use req_body::{BodyReadError, body_channel};
pub use req_body::ReqBody;
pub use resp_body::{BoxError, ResponseBody};
