use bytes::{Buf, Bytes};
use http::HeaderMap;

/// Represents a HTTP message that can either be a header or payload.
///
/// The generic parameter `T` is the header type (request or response header plus its
/// [`PayloadSize`]), while `Data` is the type of the payload data (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or an end marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP message payload stream.
///
/// Decoders produce `Chunk` and `Eof`; encoders additionally accept `Trailers`, which
/// ends a chunked payload with a trailer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream, carrying trailer fields
    Trailers(HeaderMap),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the size information of an HTTP payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        Self::Length(length)
    }

    #[inline]
    pub fn new_chunked() -> Self {
        Self::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        Self::Empty
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }
}

impl<T, D: Buf> Message<T, D> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item ends the payload stream, with or without trailers
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof | PayloadItem::Trailers(_))
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }

    /// Consumes the item and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Trailers(_) | PayloadItem::Eof => None,
        }
    }
}
