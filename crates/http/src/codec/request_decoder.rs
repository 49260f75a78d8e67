//! Streaming request decoder.
//!
//! Yields one `Message::Header` per request followed by its body as `Message::Payload`
//! items, ending with `Eof` or `Trailers`. Bytes of the next pipelined request stay in
//! the buffer until the current body has ended.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadSize, RequestHeader};

/// A decoder for HTTP requests that handles both headers and payload
///
/// `payload_decoder` is `None` while waiting for a request header and `Some` while
/// the body of the current request is being read.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let Some(item) = payload_decoder.decode(src)? else {
                return Ok(None);
            };
            if item.is_eof() {
                self.payload_decoder = None;
            }
            return Ok(Some(Message::Payload(item)));
        }

        let Some((header, payload_size)) = self.header_decoder.decode(src)? else {
            return Ok(None);
        };
        self.payload_decoder = Some(payload_size.into());
        Ok(Some(Message::Header((header, payload_size))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use indoc::indoc;

    use crate::protocol::PayloadItem;

    #[test]
    fn decode_pipelined_requests() {
        let mut buf = BytesMut::from(indoc! {"
            POST /echo HTTP/1.1
            Content-Length: 5

            helloGET /next HTTP/1.1
            Host: localhost

            "});
        let mut decoder = RequestDecoder::new();

        let Some(Message::Header((header, payload_size))) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect request header");
        };
        assert_eq!(header.uri().path(), "/echo");
        assert_eq!(payload_size, PayloadSize::Length(5));

        let Some(Message::Payload(item)) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect body chunk");
        };
        assert_eq!(item, PayloadItem::Chunk(Bytes::from_static(b"hello")));
        assert!(matches!(decoder.decode(&mut buf).unwrap(), Some(Message::Payload(PayloadItem::Eof))));

        let Some(Message::Header((header, payload_size))) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect second request header");
        };
        assert_eq!(header.uri().path(), "/next");
        assert!(payload_size.is_empty());
    }
}
