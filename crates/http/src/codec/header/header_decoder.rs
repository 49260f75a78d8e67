//! HTTP request header decoder.
//!
//! Parses the request line and header fields with `httparse`, converts them into a
//! [`RequestHeader`] and selects the request's [`PayloadSize`] from the
//! `Content-Length` and `Transfer-Encoding` headers.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
pub(crate) const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
pub(crate) const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request headers implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode HTTP headers from the provided bytes buffer.
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete header was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` on malformed or oversized input
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed request header");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            // HTTP/2 and HTTP/3 are not spoken here
            _ => return Err(ParseError::InvalidVersion(req.version)),
        };

        let mut builder = Request::builder()
            .method(req.method.ok_or(ParseError::InvalidMethod)?)
            .uri(req.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        if let Some(header_map) = builder.headers_mut() {
            header_map.reserve(req.headers.len());
            for header in req.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
                header_map.append(name, value);
            }
        }

        let header = match builder.body(()) {
            Ok(request) => RequestHeader::from(request),
            Err(e) if e.is::<http::method::InvalidMethod>() => return Err(ParseError::InvalidMethod),
            Err(_) => return Err(ParseError::InvalidUri),
        };

        let payload_size = parse_payload(&header)?;
        src.advance(body_offset);

        Ok(Some((header, payload_size)))
    }
}

/// Determines the payload framing of a request, refer to
/// [RFC 9112 §6.3](https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length).
///
/// Both `Content-Length` and `Transfer-Encoding` present is rejected.
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::new_empty()),

        (Some(te_value), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Err(ParseError::invalid_header("transfer-encoding without chunked as final coding"))
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 && !header.need_body() {
                return Ok(PayloadSize::new_empty());
            }
            Ok(PayloadSize::new_length(length))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Chunked must be the last transfer coding if present.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
