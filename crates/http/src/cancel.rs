//! Cooperative cancellation shared by the listener and its connections.
//!
//! A [`Cancellation`] starts open and is closed at most once, either locally through
//! [`Cancellation::close`] or because the external token it was derived from was
//! cancelled. Closing a derived cancellation never cancels its parent.
//!
//! Waits that must stop on cancellation are wrapped with [`Cancellation::race`], which
//! reports [`Cancelled`] instead of an I/O error so callers can tell a requested stop
//! from a failure.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The outcome of a wait that lost the race against its [`Cancellation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cancellation that also closes when `external` is cancelled
    pub fn with_external(external: Option<&CancellationToken>) -> Self {
        match external {
            Some(external) => Self { token: external.child_token() },
            None => Self::new(),
        }
    }

    /// Creates a cancellation closed together with this one, but closable on its own
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token() }
    }

    /// Closes this cancellation and all of its children. Closing twice is a no-op.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until this cancellation is closed
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Runs `future` until it completes or this cancellation closes, whichever comes first.
    ///
    /// When cancellation wins the future is dropped, so it must be cancel safe for the
    /// resource it waits on to stay usable.
    pub async fn race<F: Future>(&self, future: F) -> Result<F::Output, Cancelled> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Cancelled),
            output = future => Ok(output),
        }
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}
