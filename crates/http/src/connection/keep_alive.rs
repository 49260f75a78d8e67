//! Keep-alive negotiation between the session defaults, the peer and the handler.
//!
//! Both the peer (through its request) and the handler (through its response) may send
//! a `Keep-Alive: timeout=T, max=M` header. After each exchange the next read deadline
//! becomes the smallest of the configured keep-alive timeout and every declared
//! timeout. Declarations are not remembered: an exchange without any falls back to the
//! configured keep-alive timeout.
//!
//! A declared `max` counts the current request, so `max=1` makes the current exchange
//! the last one. The remaining budget only ever shrinks.

use std::time::Duration;

use crate::protocol::KeepAlive;
use crate::server::SessionOptions;

/// The deadline for the next read and the number of requests still allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveState {
    timeout: Duration,
    /// `None` is unlimited
    remaining: Option<u64>,
}

impl KeepAliveState {
    /// The state of a fresh connection: nothing negotiated yet, so the read timeout applies
    pub fn initial(options: &SessionOptions) -> Self {
        Self { timeout: options.read_timeout(), remaining: options.max_requests() }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Returns true when no further request may be read on the connection
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Computes the state for the read following a completed exchange.
    #[must_use]
    pub fn negotiate(&self, options: &SessionOptions, peer: Option<KeepAlive>, handler: Option<KeepAlive>) -> Self {
        let declared = [peer, handler];
        let declared = declared.iter().flatten();

        let timeout = declared.clone().filter_map(KeepAlive::timeout).fold(options.keep_alive_timeout(), Duration::min);

        let remaining = declared
            .filter_map(KeepAlive::max)
            .map(|max| max.saturating_sub(1))
            .chain(self.remaining.map(|remaining| remaining.saturating_sub(1)))
            .min();

        Self { timeout, remaining }
    }
}
