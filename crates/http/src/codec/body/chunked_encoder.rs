use std::fmt::Write;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::protocol::{PayloadItem, SendError};

/// Encodes a response body with chunked transfer encoding, ending it with
/// `0\r\n` followed by an optional trailer section and a blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                // a zero sized chunk would end the body early
                if !bytes.has_remaining() {
                    return Ok(());
                }
                write!(dst, "{:X}\r\n", bytes.remaining()).map_err(SendError::invalid_body)?;
                dst.reserve(bytes.remaining() + 2);
                dst.put(bytes);
                dst.put_slice(b"\r\n");
            }
            PayloadItem::Trailers(trailers) => {
                self.eof = true;
                dst.put_slice(b"0\r\n");
                for (name, value) in &trailers {
                    dst.put_slice(name.as_ref());
                    dst.put_slice(b": ");
                    dst.put_slice(value.as_bytes());
                    dst.put_slice(b"\r\n");
                }
                dst.put_slice(b"\r\n");
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.put_slice(b"0\r\n\r\n");
            }
        }
        Ok(())
    }
}
