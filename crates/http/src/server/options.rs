//! Configuration threaded from the listener to each connection session.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Idle time allowed between two requests on a persistent connection
pub const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(75);

/// Time allowed for the first request on a fresh connection
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(75);

/// Options of a connection session, immutable once handed to a listener or a session.
///
/// ```
/// use std::time::Duration;
/// use micro_keepalive::server::SessionOptions;
///
/// let options = SessionOptions::new()
///     .with_read_timeout(Duration::from_secs(10))
///     .with_max_requests(100);
/// assert_eq!(options.keep_alive_timeout(), Duration::from_secs(75));
/// ```
#[derive(Debug, Clone)]
pub struct SessionOptions {
    cancellation: Option<CancellationToken>,
    keep_alive_timeout: Duration,
    read_timeout: Duration,
    max_requests: Option<u64>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the listener and pending reads of its sessions when `cancellation` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    #[must_use]
    pub fn with_keep_alive_timeout(mut self, keep_alive_timeout: Duration) -> Self {
        self.keep_alive_timeout = keep_alive_timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Limits the number of requests served on one connection.
    ///
    /// `0` closes every connection before reading a request.
    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        self.keep_alive_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn max_requests(&self) -> Option<u64> {
        self.max_requests
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { cancellation: None, keep_alive_timeout: DEFAULT_KEEP_ALIVE_TIMEOUT, read_timeout: DEFAULT_READ_TIMEOUT, max_requests: None }
    }
}
