//! Request handlers.
//!
//! A [`Handler`] receives one [`ServerRequest`] per request read from a connection and
//! returns exactly one response. Handlers are shared between all connections of a
//! listener, so they must be `Send + Sync`; they may take as long as they need without
//! holding up other connections.

mod request;

pub use request::ServerRequest;

use async_trait::async_trait;
use http::Response;

use crate::protocol::body::{BoxError, ResponseBody};

#[async_trait]
pub trait Handler: Send + Sync {
    type RespBody: Into<ResponseBody> + Send;
    type Error: Into<BoxError> + Send;

    async fn call(&self, req: ServerRequest) -> Result<Response<Self::RespBody>, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<RespBody, Err, F, Fut> Handler for HandlerFn<F>
where
    RespBody: Into<ResponseBody> + Send,
    Err: Into<BoxError> + Send,
    F: Fn(ServerRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<RespBody>, Err>> + Send,
{
    type RespBody = RespBody;
    type Error = Err;

    async fn call(&self, req: ServerRequest) -> Result<Response<Self::RespBody>, Self::Error> {
        (self.f)(req).await
    }
}

/// Turns an async function into a [`Handler`].
///
/// ```
/// use http::Response;
/// use micro_keepalive::handler::{ServerRequest, make_handler};
/// use micro_keepalive::protocol::body::BoxError;
///
/// async fn hello(_request: ServerRequest) -> Result<Response<&'static str>, BoxError> {
///     Ok(Response::new("hello"))
/// }
///
/// let handler = make_handler(hello);
/// ```
pub fn make_handler<F, RespBody, Err, Fut>(f: F) -> HandlerFn<F>
where
    RespBody: Into<ResponseBody>,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Response<RespBody>, Err>>,
    F: Fn(ServerRequest) -> Fut,
{
    HandlerFn { f }
}
