use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

/// Writes a body announced with `Content-Length`, refusing to write past the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining() as u64;
                if size > self.remaining {
                    return Err(SendError::invalid_body(format!("body exceeds content-length by {} bytes", size - self.remaining)));
                }
                self.remaining -= size;
                dst.put(bytes);
                Ok(())
            }
            PayloadItem::Trailers(_) | PayloadItem::Eof => {
                self.eof = true;
                if self.remaining > 0 {
                    return Err(SendError::invalid_body(format!("body ends {} bytes short of content-length", self.remaining)));
                }
                Ok(())
            }
        }
    }
}

/// Encoder for responses that never carry a body, e.g. `204` and `1xx`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoBodyEncoder {
    eof: bool,
}

impl NoBodyEncoder {
    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for NoBodyEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, _dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) if bytes.has_remaining() => {
                warn!(size = bytes.remaining(), "drop body bytes of a response without body");
                Ok(())
            }
            PayloadItem::Chunk(_) => Ok(()),
            PayloadItem::Trailers(_) | PayloadItem::Eof => {
                self.eof = true;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn encode_exact_length() {
        let mut encoder = LengthEncoder::new(5);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hel")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"lo")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert!(encoder.is_finish());
        assert_eq!(&dst[..], b"hello");
    }

    #[test]
    fn reject_length_mismatch() {
        let mut dst = BytesMut::new();
        assert!(LengthEncoder::new(2).encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).is_err());

        let mut encoder = LengthEncoder::new(4);
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ab")), &mut dst).unwrap();
        assert!(encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).is_err());
    }
}
