//! Decoder for request bodies sent with chunked transfer encoding, refer to
//! [RFC 9112 §7.1](https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding).
//!
//! Chunk extensions are skipped. Trailer fields following the last chunk are collected
//! into a [`HeaderMap`] and returned as [`PayloadItem::Trailers`].

use std::cmp;

use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::header::MAX_HEADER_NUM;
use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};

/// Longest chunk-size or trailer line accepted, extensions included
const MAX_LINE_BYTES: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: State,
    trailers: Option<HeaderMap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Read the `size[;ext]` line
    Size,
    /// Read chunk data
    Data { remaining: u64 },
    /// Read the CRLF closing a chunk
    DataEnd,
    /// Read trailer lines up to the empty line
    Trailer,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size, trailers: None }
    }

    fn push_trailer(&mut self, line: &[u8]) -> Result<(), ParseError> {
        let trailers = self.trailers.get_or_insert_with(HeaderMap::new);
        ensure!(trailers.len() < MAX_HEADER_NUM, ParseError::too_many_headers(MAX_HEADER_NUM));

        let colon = line.iter().position(|b| *b == b':').ok_or_else(|| ParseError::invalid_header("trailer line without colon"))?;
        let name = HeaderName::from_bytes(line[..colon].trim_ascii()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(line[colon + 1..].trim_ascii()).map_err(ParseError::invalid_header)?;
        trailers.append(name, value);
        Ok(())
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    let size = parse_chunk_size(&line)?;
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailer } else { State::Data { remaining: size } };
                }

                State::Data { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = usize::try_from(remaining).map_or(src.len(), |remaining| cmp::min(remaining, src.len()));
                    let bytes = src.split_to(len).freeze();
                    let remaining = remaining - bytes.len() as u64;

                    self.state = if remaining == 0 { State::DataEnd } else { State::Data { remaining } };
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                State::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    ensure!(&src[..2] == b"\r\n", ParseError::invalid_body("chunk data not followed by CRLF"));
                    src.advance(2);
                    self.state = State::Size;
                }

                State::Trailer => {
                    let Some(line) = take_line(src)? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.state = State::End;
                        return Ok(Some(self.trailers.take().map_or(PayloadItem::Eof, PayloadItem::Trailers)));
                    }
                    self.push_trailer(&line)?;
                }

                State::End => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Splits one line off `src`, without its line ending. Returns `None` until the line is complete.
fn take_line(src: &mut BytesMut) -> Result<Option<BytesMut>, ParseError> {
    let Some(lf) = src.iter().position(|b| *b == b'\n') else {
        ensure!(src.len() <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));
        return Ok(None);
    };
    ensure!(lf <= MAX_LINE_BYTES, ParseError::invalid_body("chunk line too long"));

    let mut line = src.split_to(lf + 1);
    line.truncate(lf);
    if line.last() == Some(&b'\r') {
        line.truncate(lf - 1);
    }
    Ok(Some(line))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let size = line.split(|b| *b == b';').next().unwrap_or_default().trim_ascii();
    ensure!(!size.is_empty(), ParseError::invalid_body("empty chunk size"));

    size.iter().try_fold(0u64, |acc, b| {
        let digit = char::from(*b).to_digit(16).ok_or_else(|| ParseError::invalid_body("invalid chunk size"))?;
        acc.checked_mul(16)
            .and_then(|acc| acc.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))
    })
}
