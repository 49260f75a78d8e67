use std::net::SocketAddr;

use http::{Extensions, HeaderMap, Method, Request, Uri, Version};

use crate::connection::OnUpgrade;
use crate::protocol::body::ReqBody;

/// The context handed to a [`Handler`](crate::handler::Handler) for one request.
///
/// Built fresh for every request read from the connection:
/// - `request`: the decoded request with its lazily read body
/// - `data`: a per-request store for values shared between layers of a handler
/// - `on_upgrade`: the handle that yields the connection after a `101` response
/// - `remote_addr`: the peer address, when the connection came from a listener
#[derive(Debug)]
pub struct ServerRequest {
    request: Request<ReqBody>,
    data: Extensions,
    on_upgrade: Option<OnUpgrade>,
    remote_addr: Option<SocketAddr>,
}

impl ServerRequest {
    pub(crate) fn new(request: Request<ReqBody>, on_upgrade: OnUpgrade, remote_addr: Option<SocketAddr>) -> Self {
        Self { request, data: Extensions::new(), on_upgrade: Some(on_upgrade), remote_addr }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn version(&self) -> Version {
        self.request.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn request(&self) -> &Request<ReqBody> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<ReqBody> {
        &mut self.request
    }

    /// Gives up the context and keeps the request only
    pub fn into_request(self) -> Request<ReqBody> {
        self.request
    }

    pub fn body_mut(&mut self) -> &mut ReqBody {
        self.request.body_mut()
    }

    pub fn into_body(self) -> ReqBody {
        self.request.into_body()
    }

    pub fn data(&self) -> &Extensions {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Extensions {
        &mut self.data
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Takes the upgrade handle; only the first call returns it.
    ///
    /// It must be taken, and kept, before answering with `101 Switching Protocols`,
    /// otherwise the connection is closed once the response is sent.
    pub fn take_upgrade(&mut self) -> Option<OnUpgrade> {
        self.on_upgrade.take()
    }
}
