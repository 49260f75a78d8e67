//! HTTP request header handling implementation.
//!
//! This module wraps the standard `http::Request` type with the accessors the
//! connection session needs to drive keep-alive decisions.

use http::header::EXPECT;
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

use crate::protocol::keep_alive::{KeepAlive, has_connection_token};

/// Represents an HTTP request header.
///
/// This struct wraps a `http::Request<()>` to provide:
/// - Access to standard HTTP header fields
/// - Body attachment capabilities
/// - The peer's persistence intent (`Connection`, `Keep-Alive`, `Expect`)
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|()| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Determines if this request may carry a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// GET, HEAD, DELETE, OPTIONS and CONNECT.
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// The peer's declared keep-alive preference, if any
    pub fn keep_alive(&self) -> Option<KeepAlive> {
        KeepAlive::from_headers(self.headers())
    }

    /// Returns true if the peer asked to close the connection after this exchange.
    ///
    /// HTTP/1.1 connections persist unless `Connection: close` is sent, HTTP/1.0
    /// connections close unless `Connection: keep-alive` is sent.
    pub fn wants_close(&self) -> bool {
        let headers = self.headers();
        if has_connection_token(headers, "close") {
            return true;
        }

        self.version() == Version::HTTP_10 && !has_connection_token(headers, "keep-alive")
    }

    /// Returns true for `Expect: 100-continue`
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().len() >= 4 && value.as_bytes()[..4].eq_ignore_ascii_case(b"100-"))
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
