use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, error, info, info_span, warn};

use crate::cancel::{Cancellation, Cancelled};
use crate::connection::{HttpConnection, Io, log_session_end};
use crate::handler::Handler;
use crate::server::SessionOptions;

/// Turns an accepted TCP stream into the stream a session is run on.
///
/// Runs in the connection's own task, bounded by the read timeout, so a slow
/// handshake never holds up the accept loop.
#[trait_variant::make(Accept: Send)]
pub trait LocalAccept {
    type Io: Io;

    async fn accept(&self, stream: TcpStream) -> io::Result<Self::Io>;
}

/// Serves plain-text HTTP on the accepted stream
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAccept;

impl Accept for PlainAccept {
    type Io = TcpStream;

    async fn accept(&self, stream: TcpStream) -> io::Result<Self::Io> {
        Ok(stream)
    }
}

/// Handle of a running listener.
///
/// Dropping the handle leaves the listener running; [`ServerHandle::close`] stops it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancellation: Cancellation,
    accept_loop: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and releases the listening socket.
    ///
    /// Sessions stop when they next wait for a request; running handlers are not
    /// interrupted. Closing an already closed listener is a no-op.
    pub fn close(&self) {
        if !self.cancellation.is_closed() {
            info!(local_addr = %self.local_addr, "closing listener");
        }
        self.cancellation.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_closed() || self.accept_loop.is_finished()
    }

    /// Waits until the accept loop has ended and the listening socket is released
    pub async fn closed(self) {
        if let Err(e) = self.accept_loop.await {
            error!(cause = %e, "accept loop failed");
        }
    }
}

/// Binds `addr` and serves plain-text HTTP connections with `handler`.
///
/// ```no_run
/// use std::sync::Arc;
/// use http::Response;
/// use micro_keepalive::handler::{ServerRequest, make_handler};
/// use micro_keepalive::protocol::body::BoxError;
/// use micro_keepalive::server::{SessionOptions, listen_and_serve};
///
/// async fn hello(_request: ServerRequest) -> Result<Response<&'static str>, BoxError> {
///     Ok(Response::new("hello"))
/// }
///
/// # async fn run() -> std::io::Result<()> {
/// let server = listen_and_serve("127.0.0.1:8080", Arc::new(make_handler(hello)), SessionOptions::new()).await?;
/// tokio::signal::ctrl_c().await?;
/// server.close();
/// server.closed().await;
/// # Ok(())
/// # }
/// ```
pub async fn listen_and_serve<A, H>(addr: A, handler: Arc<H>, options: SessionOptions) -> io::Result<ServerHandle>
where
    A: ToSocketAddrs,
    H: Handler + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve(listener, PlainAccept, handler, options)
}

/// Serves connections accepted from an already bound `listener`, through `acceptor`.
///
/// Must be called within a tokio runtime.
pub fn serve<A, H>(listener: TcpListener, acceptor: A, handler: Arc<H>, options: SessionOptions) -> io::Result<ServerHandle>
where
    A: Accept + Sync + 'static,
    H: Handler + 'static,
{
    let local_addr = listener.local_addr()?;
    let cancellation = Cancellation::with_external(options.cancellation());
    info!(%local_addr, "start listening");

    let accept_loop = tokio::spawn(accept_loop(listener, Arc::new(acceptor), handler, options, cancellation.clone()));
    Ok(ServerHandle { local_addr, cancellation, accept_loop })
}

async fn accept_loop<A, H>(listener: TcpListener, acceptor: Arc<A>, handler: Arc<H>, options: SessionOptions, cancellation: Cancellation)
where
    A: Accept + Sync + 'static,
    H: Handler + 'static,
{
    loop {
        let (stream, remote_addr) = match cancellation.race(listener.accept()).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                error!(cause = %e, "failed to accept, stop listening");
                break;
            }
            Err(Cancelled) => {
                info!("listener cancelled, stop accepting");
                break;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(cause = %e, %remote_addr, "failed to set TCP_NODELAY");
        }

        let acceptor = Arc::clone(&acceptor);
        let handler = Arc::clone(&handler);
        let options = options.clone();
        let cancellation = cancellation.child();

        let span = info_span!("connection", %remote_addr);
        tokio::spawn(
            async move {
                let read_timeout = options.read_timeout();
                let io = match timeout(read_timeout, Accept::accept(&*acceptor, stream)).await {
                    Ok(Ok(io)) => io,
                    Ok(Err(e)) => {
                        warn!(cause = %e, "handshake failed");
                        return;
                    }
                    Err(_elapsed) => {
                        warn!(timeout = ?read_timeout, "handshake timed out");
                        return;
                    }
                };

                let connection = HttpConnection::new(io).options(options).remote_addr(remote_addr).cancellation(cancellation);
                log_session_end(connection.process(handler).await);
            }
            .instrument(span),
        );
    }

    let local_addr = listener.local_addr().ok();
    drop(listener);
    info!(?local_addr, "listener closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::Response;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::sync::CancellationToken;

    use crate::handler::{ServerRequest, make_handler};
    use crate::protocol::body::BoxError;

    async fn hello(request: ServerRequest) -> Result<Response<String>, BoxError> {
        if request.uri().path() == "/slow" {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(Response::new(format!("hello {}", request.uri().path())))
    }

    async fn start(options: SessionOptions) -> ServerHandle {
        listen_and_serve("127.0.0.1:0", Arc::new(make_handler(hello)), options).await.unwrap()
    }

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serve_connections_concurrently() {
        let server = start(SessionOptions::new()).await;
        let addr = server.local_addr();

        let (slow, fast) = tokio::join!(get(addr, "/slow"), get(addr, "/fast"));
        assert!(slow.starts_with("HTTP/1.1 200 OK\r\n"), "{slow}");
        assert!(slow.ends_with("hello /slow"));
        assert!(fast.ends_with("hello /fast"));

        server.close();
        server.closed().await;
    }

    #[tokio::test]
    async fn close_releases_the_socket() {
        let server = start(SessionOptions::new()).await;
        let addr = server.local_addr();

        server.close();
        server.close();
        assert!(server.is_closed());
        tokio::time::timeout(Duration::from_secs(1), server.closed()).await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn external_cancellation_stops_listener() {
        let token = CancellationToken::new();
        let server = start(SessionOptions::new().with_cancellation(token.clone())).await;

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), server.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn close_does_not_abort_running_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            make_handler(move |_request: ServerRequest| {
                let calls = Arc::clone(&calls);
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Response::new("done"))
                }
            })
        };
        let server = listen_and_serve("127.0.0.1:0", Arc::new(handler), SessionOptions::new()).await.unwrap();

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.close();
        server.closed().await;

        // the in-flight response is still delivered, then the idle session stops
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.ends_with("done"), "{response}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
