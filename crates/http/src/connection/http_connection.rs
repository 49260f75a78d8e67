use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use http::header::CONNECTION;
use http::{HeaderValue, Response, StatusCode};
use tokio::io::{AsyncWriteExt, ReadHalf};
use tokio::select;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

use crate::cancel::{Cancellation, Cancelled};
use crate::codec::RequestDecoder;
use crate::connection::dispatch::ResponseQueue;
use crate::connection::keep_alive::KeepAliveState;
use crate::connection::upgrade::{self, Io, Pending, Upgraded};
use crate::handler::{Handler, ServerRequest};
use crate::protocol::body::{BodyReadError, BoxError, ResponseBody, body_channel};
use crate::protocol::keep_alive::has_connection_token;
use crate::protocol::{HttpError, KeepAlive, Message, ParseError, PayloadSize, RequestHeader, SendError};
use crate::server::SessionOptions;

/// Size of the read buffer, and the initial capacity of the request decoder's buffer
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection between two requests
    PeerClosed,
    /// The peer or the handler asked to close the connection after a response
    CloseRequested,
    /// The negotiated request budget was used up
    KeepAliveExhausted,
    /// The session was cancelled while waiting for a request
    Cancelled,
    /// A `101` response handed the connection over; it was not closed
    Upgraded,
}

/// One accepted connection and the keep-alive conversation held over it.
///
/// `process` reads one request at a time: a request is read only once the response to
/// the previous one has been flushed and its body drained. Responses go through the
/// connection's [`ResponseQueue`], so they reach the wire in the order they were
/// submitted. The connection is shut down when the session ends, unless it was upgraded.
///
/// ```no_run
/// use std::sync::Arc;
/// use http::Response;
/// use micro_keepalive::connection::HttpConnection;
/// use micro_keepalive::handler::{ServerRequest, make_handler};
/// use micro_keepalive::protocol::body::BoxError;
/// use tokio::net::TcpListener;
///
/// async fn hello(_request: ServerRequest) -> Result<Response<&'static str>, BoxError> {
///     Ok(Response::new("hello"))
/// }
///
/// # async fn run() -> std::io::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:8080").await?;
/// let (stream, remote_addr) = listener.accept().await?;
/// let end = HttpConnection::new(stream).remote_addr(remote_addr).process(Arc::new(make_handler(hello))).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpConnection<IO> {
    io: IO,
    options: SessionOptions,
    remote_addr: Option<SocketAddr>,
    cancellation: Option<Cancellation>,
}

impl<IO: Io> HttpConnection<IO> {
    pub fn new(io: IO) -> Self {
        Self { io, options: SessionOptions::default(), remote_addr: None, cancellation: None }
    }

    #[must_use]
    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Uses `cancellation` instead of the one derived from the options
    #[must_use]
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Serves requests until the connection has to end.
    ///
    /// Returns `Ok` for expected ends and `Err` for timeouts, malformed requests and
    /// write failures. Either way the connection is closed before returning, unless it
    /// was handed over by an upgrade.
    pub async fn process<H: Handler>(self, handler: Arc<H>) -> Result<SessionEnd, HttpError> {
        let cancellation = self.cancellation.unwrap_or_else(|| Cancellation::with_external(self.options.cancellation()));
        let (reader, writer) = tokio::io::split(self.io);
        let (queue, writer_task) = ResponseQueue::spawn(writer);

        let mut session = Session {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::new(), READ_BUFFER_SIZE),
            queue,
            keep_alive: KeepAliveState::initial(&self.options),
            options: self.options,
            cancellation,
            remote_addr: self.remote_addr,
        };
        let result = session.run(&*handler).await;

        let Session { framed_read, queue, .. } = session;
        // the worker returns the write half once the last queued response is written
        drop(queue);
        let writer = match writer_task.await {
            Ok(writer) => writer,
            Err(e) => {
                error!(cause = %e, "response writer task failed");
                return Err(result.err().unwrap_or_else(|| SendError::QueueClosed.into()));
            }
        };

        let parts = framed_read.into_parts();
        let mut io = parts.io.unsplit(writer);

        match result {
            Ok(Exit::Upgrade(pending)) => {
                if pending.fulfill(Upgraded::new(io, parts.read_buf.freeze())).is_err() {
                    warn!("upgrade handle dropped by handler, connection closed");
                }
                Ok(SessionEnd::Upgraded)
            }
            result => {
                if let Err(e) = io.shutdown().await {
                    debug!(cause = %e, "failed to shutdown connection");
                }
                result.map(Exit::into_end)
            }
        }
    }
}

/// Serves requests on `io` with `handler` until the connection ends, logging the outcome.
///
/// For connections obtained elsewhere than from this crate's listener, e.g. handed over
/// by another server.
pub async fn handle_keep_alive_conn<IO, H>(io: IO, handler: Arc<H>, options: SessionOptions)
where
    IO: Io,
    H: Handler,
{
    log_session_end(HttpConnection::new(io).options(options).process(handler).await);
}

pub(crate) fn log_session_end(result: Result<SessionEnd, HttpError>) {
    match result {
        Ok(SessionEnd::Upgraded) => info!("connection upgraded"),
        Ok(end) => debug!(?end, "connection closed"),
        Err(e) if e.is_timeout() => debug!(cause = %e, "connection timed out"),
        Err(e) => error!(cause = %e, "connection closed with error"),
    }
}

enum Exit {
    End(SessionEnd),
    Upgrade(Pending),
}

impl Exit {
    fn into_end(self) -> SessionEnd {
        match self {
            Exit::End(end) => end,
            Exit::Upgrade(_) => SessionEnd::Upgraded,
        }
    }
}

struct Session<IO> {
    framed_read: FramedRead<ReadHalf<IO>, RequestDecoder>,
    queue: ResponseQueue,
    keep_alive: KeepAliveState,
    options: SessionOptions,
    cancellation: Cancellation,
    remote_addr: Option<SocketAddr>,
}

impl<IO: Io> Session<IO> {
    async fn run<H: Handler>(&mut self, handler: &H) -> Result<Exit, HttpError> {
        // a zero request budget serves nothing
        if self.keep_alive.is_exhausted() {
            return Ok(Exit::End(SessionEnd::KeepAliveExhausted));
        }

        loop {
            let read_timeout = self.keep_alive.timeout();
            let next = match self.cancellation.race(timeout(read_timeout, self.framed_read.next())).await {
                Err(Cancelled) => return Ok(Exit::End(SessionEnd::Cancelled)),
                Ok(Err(_elapsed)) => return Err(HttpError::timeout(read_timeout)),
                Ok(Ok(next)) => next,
            };

            let (header, payload_size) = match next {
                Some(Ok(Message::Header(header))) => header,
                Some(Ok(Message::Payload(_))) => {
                    error!("received body while expecting a request header");
                    self.reject(StatusCode::BAD_REQUEST).await;
                    return Err(ParseError::invalid_body("received body while expecting a request header").into());
                }
                Some(Err(e)) => {
                    if e.is_malformed() {
                        warn!(cause = %e, "malformed request");
                        self.reject(StatusCode::BAD_REQUEST).await;
                    }
                    return Err(e.into());
                }
                None => return Ok(Exit::End(SessionEnd::PeerClosed)),
            };

            if let Some(exit) = self.exchange(header, payload_size, handler).await? {
                return Ok(exit);
            }
        }
    }

    /// Runs one request through the handler and waits until its response is flushed.
    ///
    /// Returns `Some` when the connection must not be read from again.
    async fn exchange<H: Handler>(
        &mut self,
        header: RequestHeader,
        payload_size: PayloadSize,
        handler: &H,
    ) -> Result<Option<Exit>, HttpError> {
        let wants_close = header.wants_close();
        let peer_keep_alive = header.keep_alive();

        if header.expects_continue() && !payload_size.is_empty() {
            let interim = Response::builder().status(StatusCode::CONTINUE).body(ResponseBody::empty()).map_err(SendError::invalid_body)?;
            // queued ahead of the final response, no need to wait for it
            drop(self.queue.enqueue(interim));
            debug!("receive expect request header, queued continue response");
        }

        let (pending_upgrade, on_upgrade) = upgrade::pending();
        let (mut body_sender, req_body) =
            body_channel(&mut self.framed_read, payload_size, self.options.read_timeout(), self.cancellation.clone());
        let request = ServerRequest::new(header.body(req_body), on_upgrade, self.remote_addr);

        // The handler and the response body may both read the request body, so it is
        // served until the response is flushed. Unread leftovers are drained afterwards.
        let (status, next_keep_alive, response_close, flushed, body_error) = {
            let serve_body = body_sender.serve();
            let handle = handler.call(request);
            tokio::pin!(serve_body, handle);
            let mut serving = true;
            let mut body_error = None;

            let result = loop {
                select! {
                    biased;
                    result = &mut handle => break result,
                    served = &mut serve_body, if serving => {
                        serving = false;
                        body_error = served.err();
                    }
                }
            };

            let mut response = match result {
                Ok(response) => response.map(Into::into),
                Err(e) => {
                    let e: BoxError = e.into();
                    error!(cause = %e, "handle request error");
                    error_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            };

            let status = response.status();
            let handler_keep_alive = KeepAlive::from_headers(response.headers());
            let response_close = has_connection_token(response.headers(), "close");

            let next_keep_alive = self.keep_alive.negotiate(&self.options, peer_keep_alive, handler_keep_alive);
            if status != StatusCode::SWITCHING_PROTOCOLS && (wants_close || next_keep_alive.is_exhausted()) && !response_close {
                response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            }

            let flushed = self.queue.enqueue(response);
            tokio::pin!(flushed);
            let flushed = loop {
                select! {
                    biased;
                    flushed = &mut flushed => break flushed,
                    served = &mut serve_body, if serving => {
                        serving = false;
                        body_error = served.err();
                    }
                }
            };

            (status, next_keep_alive, response_close, flushed, body_error)
        };

        // a stalled or cancelled body read also fails a response streaming that body
        if let Some(e) = body_error {
            return body_read_exit(e);
        }
        flushed?;
        if let Err(e) = body_sender.drain().await {
            return body_read_exit(e);
        }

        if status == StatusCode::SWITCHING_PROTOCOLS {
            debug!("switching protocols, stop reading requests");
            return Ok(Some(Exit::Upgrade(pending_upgrade)));
        }

        if next_keep_alive.is_exhausted() {
            return Ok(Some(Exit::End(SessionEnd::KeepAliveExhausted)));
        }
        if wants_close || response_close {
            return Ok(Some(Exit::End(SessionEnd::CloseRequested)));
        }

        self.keep_alive = next_keep_alive;
        Ok(None)
    }

    /// Answers input that can't be parsed, then the connection is closed
    async fn reject(&mut self, status: StatusCode) {
        let mut response = error_response(status);
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
        if let Err(e) = self.queue.enqueue(response).await {
            debug!(cause = %e, %status, "failed to send error response");
        }
    }
}

fn body_read_exit(e: BodyReadError) -> Result<Option<Exit>, HttpError> {
    match e {
        BodyReadError::Parse(e) => Err(e.into()),
        BodyReadError::Timeout(timeout) => Err(HttpError::timeout(timeout)),
        BodyReadError::Cancelled => Ok(Some(Exit::End(SessionEnd::Cancelled))),
    }
}

fn error_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::empty());
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http_body_util::BodyExt;
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use crate::handler::make_handler;

    async fn route(mut request: ServerRequest) -> Result<Response<ResponseBody>, BoxError> {
        let response = match request.uri().path() {
            "/slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Response::new(ResponseBody::from("slow"))
            }
            "/fail" => return Err("handler failed".into()),
            "/echo" => Response::new(ResponseBody::stream(request.into_body())),
            "/collect" => {
                let body = request.body_mut().collect().await?.to_bytes();
                Response::new(ResponseBody::from(body))
            }
            "/short" => Response::builder().header("keep-alive", "timeout=1").body(ResponseBody::from("short"))?,
            path => Response::new(ResponseBody::from(format!("path {path}"))),
        };
        Ok(response)
    }

    /// Generic over the stream so the session future is checked to be `Send` for any `Io`
    fn spawn_session<IO: Io, H: Handler + 'static>(io: IO, handler: Arc<H>, options: SessionOptions) -> JoinHandle<Result<SessionEnd, HttpError>> {
        tokio::spawn(HttpConnection::new(io).options(options).process(handler))
    }

    fn session<H: Handler + 'static>(handler: H, options: SessionOptions) -> (DuplexStream, JoinHandle<Result<SessionEnd, HttpError>>) {
        let (client, server) = duplex(64 * 1024);
        (client, spawn_session(server, Arc::new(handler), options))
    }

    /// Sends `input`, closes the write side and collects everything written back
    async fn run(options: SessionOptions, input: &str) -> (Result<SessionEnd, HttpError>, String) {
        let (mut client, session) = session(make_handler(route), options);
        client.write_all(input.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        (session.await.unwrap(), output)
    }

    #[tokio::test]
    async fn pipelined_responses_keep_request_order() {
        let input = indoc! {"
            GET /slow HTTP/1.1\r
            Host: localhost\r
            \r
            GET /fast HTTP/1.1\r
            Host: localhost\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nslow\
             HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\npath /fast"
        );
    }

    #[tokio::test]
    async fn peer_max_closes_after_budget() {
        let request = "GET / HTTP/1.1\r\nHost: localhost\r\nKeep-Alive: timeout=5, max=2\r\n\r\n";
        let (end, output) = run(SessionOptions::new(), &request.repeat(3)).await;

        assert_eq!(end.unwrap(), SessionEnd::KeepAliveExhausted);
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 2);
        assert_eq!(output.matches("connection: close").count(), 1);
        assert!(output.ends_with("connection: close\r\ncontent-length: 6\r\n\r\npath /"), "{output}");
    }

    #[tokio::test]
    async fn configured_max_requests() {
        let request = "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (end, output) = run(SessionOptions::new().with_max_requests(1), &request.repeat(2)).await;

        assert_eq!(end.unwrap(), SessionEnd::KeepAliveExhausted);
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 1);
        assert!(output.contains("connection: close"));
    }

    #[tokio::test]
    async fn connection_close_ends_session() {
        let input = indoc! {"
            GET /first HTTP/1.1\r
            Connection: close\r
            \r
            GET /second HTTP/1.1\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::CloseRequested);
        assert_eq!(output, "HTTP/1.1 200 OK\r\nconnection: close\r\ncontent-length: 11\r\n\r\npath /first");
    }

    #[tokio::test]
    async fn http10_closes_without_keep_alive() {
        let (end, output) = run(SessionOptions::new(), "GET / HTTP/1.0\r\n\r\n").await;

        assert_eq!(end.unwrap(), SessionEnd::CloseRequested);
        assert!(output.contains("connection: close"), "{output}");
    }

    #[tokio::test]
    async fn http10_keep_alive_persists() {
        let request = "GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n";
        let (end, output) = run(SessionOptions::new(), &request.repeat(2)).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(output.matches("HTTP/1.1 200 OK").count(), 2);
        assert!(!output.contains("connection: close"));
    }

    #[tokio::test]
    async fn handler_error_answers_500_and_keeps_connection() {
        let input = indoc! {"
            GET /fail HTTP/1.1\r
            \r
            GET /after HTTP/1.1\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(
            output,
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n\
             HTTP/1.1 200 OK\r\ncontent-length: 11\r\n\r\npath /after"
        );
    }

    #[tokio::test]
    async fn malformed_request_is_rejected() {
        let (end, output) = run(SessionOptions::new(), "NOT AN HTTP REQUEST\r\n\r\n").await;

        assert!(end.is_err());
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{output}");
        assert!(output.contains("connection: close"));
    }

    #[tokio::test]
    async fn echo_request_body() {
        let input = indoc! {"
            POST /echo HTTP/1.1\r
            Content-Length: 5\r
            \r
            helloGET /next HTTP/1.1\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello\
             HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\npath /next"
        );
    }

    #[tokio::test]
    async fn collect_chunked_request_body() {
        let input = indoc! {"
            POST /collect HTTP/1.1\r
            Transfer-Encoding: chunked\r
            \r
            3\r
            abc\r
            2\r
            de\r
            0\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(output, "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nabcde");
    }

    #[tokio::test]
    async fn unread_body_is_drained() {
        let input = indoc! {"
            POST /ignored HTTP/1.1\r
            Content-Length: 10\r
            \r
            0123456789GET /next HTTP/1.1\r
            \r
        "};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(
            output,
            "HTTP/1.1 200 OK\r\ncontent-length: 13\r\n\r\npath /ignored\
             HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\npath /next"
        );
    }

    #[tokio::test]
    async fn expect_continue() {
        let input = indoc! {"
            POST /collect HTTP/1.1\r
            Expect: 100-continue\r
            Content-Length: 4\r
            \r
            body"};
        let (end, output) = run(SessionOptions::new(), input).await;

        assert_eq!(end.unwrap(), SessionEnd::PeerClosed);
        assert_eq!(output, "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\nbody");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            make_handler(move |request: ServerRequest| {
                calls.fetch_add(1, Ordering::SeqCst);
                route(request)
            })
        };
        let (mut client, session) = session(handler, SessionOptions::new().with_read_timeout(Duration::from_secs(1)));

        let end = session.await.unwrap();
        assert!(end.is_err_and(|e| e.is_timeout()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_keep_alive_shortens_idle_timeout() {
        let (mut client, session) = session(make_handler(route), SessionOptions::new());
        client.write_all(b"GET /short HTTP/1.1\r\n\r\n").await.unwrap();

        let started = tokio::time::Instant::now();
        let end = session.await.unwrap();
        assert!(end.is_err_and(|e| e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(2));

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert!(output.ends_with("short"), "{output}");
    }

    #[tokio::test]
    async fn cancel_idle_session() {
        let token = CancellationToken::new();
        let (mut client, session) = session(make_handler(route), SessionOptions::new().with_cancellation(token.clone()));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut head = [0u8; 15];
        client.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"HTTP/1.1 200 OK");

        token.cancel();
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Cancelled);
    }

    #[tokio::test]
    async fn upgrade_hands_over_connection() {
        let handler = make_handler(|mut request: ServerRequest| async move {
            let on_upgrade = request.take_upgrade().ok_or("no upgrade handle")?;
            tokio::spawn(async move {
                let mut upgraded = on_upgrade.await.unwrap();
                let mut ping = [0u8; 4];
                upgraded.read_exact(&mut ping).await.unwrap();
                upgraded.write_all(b"pong:").await.unwrap();
                upgraded.write_all(&ping).await.unwrap();
                upgraded.shutdown().await.unwrap();
            });

            Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header("connection", "upgrade")
                .header("upgrade", "echo")
                .body(ResponseBody::empty())
                .map_err(BoxError::from)
        });
        let (mut client, session) = session(handler, SessionOptions::new());

        client.write_all(b"GET /ws HTTP/1.1\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\nping").await.unwrap();
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Upgraded);

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, "HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: echo\r\n\r\npong:ping");
    }

    #[tokio::test]
    async fn zero_max_requests_serves_nothing() {
        let (mut client, session) = session(make_handler(route), SessionOptions::new().with_max_requests(0));

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::KeepAliveExhausted);
        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert!(output.is_empty(), "{output}");
    }

    #[tokio::test]
    async fn malformed_request_on_unsync_stream() {
        // `Upgraded` boxes the stream as `dyn Io`, which is `Send` but not `Sync`
        let (mut client, server) = duplex(1024);
        let upgraded = Upgraded::new(server, bytes::Bytes::from_static(b"NOT AN HTTP REQUEST\r\n\r\n"));
        let session = spawn_session(upgraded, Arc::new(make_handler(route)), SessionOptions::new());

        assert!(session.await.unwrap().is_err());
        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_unread_body_times_out() {
        let options = SessionOptions::new().with_read_timeout(Duration::from_secs(1)).with_keep_alive_timeout(Duration::from_secs(1));
        let (mut client, session) = session(make_handler(route), options);

        // three of the ten announced bytes, then the peer goes quiet
        client.write_all(b"POST /ignored HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(600), session).await.unwrap().unwrap();
        assert!(end.is_err_and(|e| e.is_timeout()));

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        assert!(output.ends_with("path /ignored"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_echo_body_times_out() {
        let options = SessionOptions::new().with_read_timeout(Duration::from_secs(1));
        let (mut client, session) = session(make_handler(route), options);

        client.write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(600), session).await.unwrap().unwrap();
        assert!(end.is_err_and(|e| e.is_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stalled_body_read() {
        let token = CancellationToken::new();
        let (mut client, session) = session(make_handler(route), SessionOptions::new().with_cancellation(token.clone()));

        client.write_all(b"POST /ignored HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        let end = tokio::time::timeout(Duration::from_secs(1), session).await.unwrap().unwrap();
        assert_eq!(end.unwrap(), SessionEnd::Cancelled);
    }
}
