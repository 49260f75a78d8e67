//! Core HTTP protocol abstractions.
//!
//! - **Message Handling** ([`message`]): [`Message`], [`PayloadItem`] and [`PayloadSize`]
//!   shared by the request decoder and the response encoder
//! - **Request Processing** ([`request`]): [`RequestHeader`] and the peer's
//!   persistence intent
//! - **Keep-Alive** ([`keep_alive`]): [`KeepAlive`] preferences and `Connection` tokens
//! - **Response Processing** ([`response`]): [`ResponseHead`]
//! - **Body Streaming** ([`body`]): [`body::ReqBody`] and [`body::ResponseBody`]
//! - **Error Handling** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`]

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

pub mod keep_alive;
pub use keep_alive::KeepAlive;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
