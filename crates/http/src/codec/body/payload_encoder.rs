use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::{LengthEncoder, NoBodyEncoder};
use crate::protocol::{PayloadItem, PayloadSize, SendError};

/// Encodes the body of one response, framed as announced by its [`PayloadSize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// content-length payload
    Length(LengthEncoder),

    /// transfer-encoding chunked payload
    Chunked(ChunkedEncoder),

    /// no body on the wire
    NoBody(NoBodyEncoder),
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody(NoBodyEncoder::default()) }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    /// Returns true once the end of the body has been encoded
    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::NoBody(encoder) => encoder.is_finish(),
        }
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => Self::fix_length(size),
            PayloadSize::Chunked => Self::chunked(),
            PayloadSize::Empty => Self::empty(),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody(encoder) => encoder.encode(item, dst),
        }
    }
}
