//! Serializes response heads.
//!
//! The status line is always written as `HTTP/1.1`; the framing header is derived from
//! the [`PayloadSize`] and replaces whatever the handler set. Informational (`1xx`) and
//! `204 No Content` responses are written without any framing header.

use std::io;
use std::io::ErrorKind;

use bytes::{BufMut, BytesMut};
use http::{HeaderValue, StatusCode, Version, header};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        if !matches!(head.version(), Version::HTTP_10 | Version::HTTP_11) {
            error!(http_version = ?head.version(), "unsupported http version");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }

        let status = head.status();
        dst.reserve(INIT_HEADER_SIZE);
        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
        dst.put_slice(b"\r\n");

        let headers = head.headers_mut();
        if has_framing(status) {
            match payload_size {
                PayloadSize::Length(n) => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, n.into());
                }
                PayloadSize::Chunked => {
                    headers.remove(header::CONTENT_LENGTH);
                    headers.insert(header::TRANSFER_ENCODING, CHUNKED);
                }
                PayloadSize::Empty => {
                    headers.remove(header::TRANSFER_ENCODING);
                    headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
                }
            }
        } else {
            headers.remove(header::CONTENT_LENGTH);
            headers.remove(header::TRANSFER_ENCODING);
        }

        for (name, value) in headers.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Returns false for statuses that never carry a body or framing header
pub(crate) fn has_framing(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT)
}
