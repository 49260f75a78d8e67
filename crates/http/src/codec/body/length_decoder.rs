//! Decoder for request bodies framed by `Content-Length`, refer to
//! [RFC 9112 §6.2](https://www.rfc-editor.org/rfc/rfc9112.html#name-content-length).

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Yields whatever part of the body is buffered, then `Eof` once `length` bytes were read.
///
/// Bytes past the declared length are left in the buffer: they belong to the next
/// pipelined request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes remaining to be read from the payload
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = usize::try_from(self.length).map_or(src.len(), |length| cmp::min(length, src.len()));
        let bytes = src.split_to(len).freeze();

        self.length -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}
