//! Connection sessions.
//!
//! - [`HttpConnection`]: drives the keep-alive conversation over one connection:
//!   read a request, run the handler, flush the response, drain the request body, then
//!   decide whether to read the next request
//! - [`ResponseQueue`]: writes a connection's responses one after another, in the
//!   order they were submitted
//! - [`KeepAliveState`]: the read deadline and request budget negotiated after each
//!   exchange
//! - [`OnUpgrade`] / [`Upgraded`]: the connection handed to a handler after a
//!   `101 Switching Protocols` response

mod dispatch;
mod http_connection;
mod keep_alive;
mod upgrade;

pub use dispatch::{ResponseFlushed, ResponseQueue};
pub(crate) use http_connection::log_session_end;
pub use http_connection::{HttpConnection, SessionEnd, handle_keep_alive_conn};
pub use keep_alive::KeepAliveState;
pub use upgrade::{Io, OnUpgrade, UpgradeError, Upgraded};
