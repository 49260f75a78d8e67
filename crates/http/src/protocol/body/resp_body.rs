use std::error::Error;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The body of an outgoing response: nothing, raw bytes, or a stream of frames.
///
/// Every response submitted to a connection's dispatch queue is converted into a
/// `ResponseBody`, so handlers may return anything that implements
/// `Into<ResponseBody>`.
pub struct ResponseBody {
    inner: Kind,
    has_trailers: bool,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None), has_trailers: false }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)), has_trailers: false }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body.map_err(Into::into))), has_trailers: false }
    }

    /// Attaches a trailer section, computed by `trailers` once all body data has been written.
    ///
    /// A body with trailers is always sent with chunked transfer encoding.
    #[must_use]
    pub fn with_trailers<F>(self, trailers: F) -> Self
    where
        F: FnOnce() -> HeaderMap + Send + 'static,
    {
        let body = BodyExt::with_trailers(self, async move { Some(Ok(trailers())) });
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)), has_trailers: true }
    }

    pub fn has_trailers(&self) -> bool {
        self.has_trailers
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Kind::Once(Some(bytes)) => format!("Once({} bytes)", bytes.len()),
            Kind::Once(None) => "Empty".to_owned(),
            Kind::Stream(_) => "Stream".to_owned(),
        };
        f.debug_struct("ResponseBody").field("kind", &kind).field("has_trailers", &self.has_trailers).finish()
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from(value)) }
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from_static(value.as_bytes())) }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self::once(bytes) }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        Bytes::from(value).into()
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        if self.has_trailers {
            return SizeHint::new();
        }

        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}
