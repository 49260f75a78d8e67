//! `Keep-Alive` and `Connection` header interpretation.
//!
//! A peer (or a handler, through its response) may state how long it is willing to
//! keep an idle connection open and how many more requests it will send on it:
//!
//! ```text
//! Connection: keep-alive
//! Keep-Alive: timeout=5, max=100
//! ```
//!
//! Parameters are matched case-insensitively and unknown parameters are ignored.

use std::time::Duration;

use http::header::CONNECTION;
use http::{HeaderMap, HeaderName};

/// The `Keep-Alive` header name, which `http` does not ship as a constant
pub const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Keep-alive preferences declared by one side of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAlive {
    timeout_secs: Option<u64>,
    max: Option<u64>,
}

impl KeepAlive {
    pub fn new(timeout_secs: Option<u64>, max: Option<u64>) -> Self {
        Self { timeout_secs, max }
    }

    /// The declared idle timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// The declared number of requests still allowed on the connection
    pub fn max(&self) -> Option<u64> {
        self.max
    }

    /// Reads the `Keep-Alive` header, returns `None` when it is absent.
    ///
    /// A negative `max` is clamped to zero, which ends the connection after the
    /// current exchange.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let mut values = headers.get_all(KEEP_ALIVE).iter().peekable();
        values.peek()?;

        let mut keep_alive = KeepAlive::default();
        for value in values {
            let Ok(value) = value.to_str() else {
                continue;
            };

            for param in value.split(',') {
                let Some((name, number)) = param.split_once('=') else {
                    continue;
                };
                let Ok(number) = number.trim().trim_matches('"').parse::<i64>() else {
                    continue;
                };
                let number = u64::try_from(number).unwrap_or(0);

                match name.trim() {
                    name if name.eq_ignore_ascii_case("timeout") => keep_alive.timeout_secs = Some(number),
                    name if name.eq_ignore_ascii_case("max") => keep_alive.max = Some(number),
                    _ => {}
                }
            }
        }

        Some(keep_alive)
    }
}

/// Returns true if any `Connection` header lists `token`
pub fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn absent_header_is_none() {
        assert_eq!(KeepAlive::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn parse_timeout_and_max() {
        let keep_alive = KeepAlive::from_headers(&headers(&[("keep-alive", "timeout=5, max=100")])).unwrap();
        assert_eq!(keep_alive.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(keep_alive.max(), Some(100));
    }

    #[test]
    fn parse_is_lenient() {
        let keep_alive = KeepAlive::from_headers(&headers(&[("Keep-Alive", "MAX=3 ,foo=bar, timeout=abc")])).unwrap();
        assert_eq!(keep_alive.timeout(), None);
        assert_eq!(keep_alive.max(), Some(3));

        let keep_alive = KeepAlive::from_headers(&headers(&[("keep-alive", "timeout=2"), ("keep-alive", "max=-1")])).unwrap();
        assert_eq!(keep_alive.timeout(), Some(Duration::from_secs(2)));
        assert_eq!(keep_alive.max(), Some(0));
    }

    #[test]
    fn connection_tokens() {
        let headers = headers(&[("connection", "Upgrade, Close")]);
        assert!(has_connection_token(&headers, "close"));
        assert!(has_connection_token(&headers, "upgrade"));
        assert!(!has_connection_token(&headers, "keep-alive"));
    }
}
