//! Listener supervision.
//!
//! - [`listen_and_serve`] / [`listen_and_serve_tls`]: bind an address and serve every
//!   accepted connection on its own task
//! - [`serve`]: the same for an already bound listener and any [`Accept`] transport
//! - [`ServerHandle`]: the running listener, closed with [`ServerHandle::close`]
//! - [`SessionOptions`]: timeouts, request budget and cancellation shared by the sessions

mod listener;
mod options;
mod tls;

pub use listener::{Accept, LocalAccept, PlainAccept, ServerHandle, listen_and_serve, serve};
pub use options::{DEFAULT_KEEP_ALIVE_TIMEOUT, DEFAULT_READ_TIMEOUT, SessionOptions};
pub use tls::{TlsAccept, TlsConfig, TlsError, listen_and_serve_tls};
