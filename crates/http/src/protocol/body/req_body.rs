use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::cancel::{Cancellation, Cancelled};
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

/// Creates the two ends of a request body.
///
/// The [`ReqBody`] goes to the handler; the [`BodySender`] stays with the connection
/// session, which reads payload items from the connection only when the `ReqBody`
/// asks for them, and drains whatever is left once the exchange is over. Every read
/// must complete within `read_timeout` and loses against `cancellation`.
pub(crate) fn body_channel<S>(
    payload_stream: &mut S,
    payload_size: PayloadSize,
    read_timeout: Duration,
    cancellation: Cancellation,
) -> (BodySender<'_, S>, ReqBody)
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(8);
    let (data_sender, data_receiver) = mpsc::channel(8);

    let sender = BodySender { payload_stream, signal_receiver, data_sender, read_timeout, cancellation, eof: false };
    (sender, ReqBody::new(signal_sender, data_receiver, payload_size))
}

/// Why the session stopped reading a request body
#[derive(Debug, Error)]
pub(crate) enum BodyReadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("request body stalled for {0:?}")]
    Timeout(Duration),

    #[error("request body read cancelled")]
    Cancelled,
}

impl BodyReadError {
    /// The error reported to the handler reading the body
    fn to_parse_error(&self) -> ParseError {
        match self {
            Self::Parse(e) => ParseError::invalid_body(e),
            Self::Timeout(_) => ParseError::io(io::Error::new(io::ErrorKind::TimedOut, self.to_string())),
            Self::Cancelled => ParseError::io(io::Error::new(io::ErrorKind::Interrupted, self.to_string())),
        }
    }
}

#[derive(Debug)]
struct RequestData;

/// Producer side of a request body, borrowing the connection's payload stream.
pub(crate) struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<RequestData>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    read_timeout: Duration,
    cancellation: Cancellation,
    eof: bool,
}

impl<S> BodySender<'_, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    /// Answers chunk requests until the payload ends or the [`ReqBody`] is dropped.
    ///
    /// Read errors are forwarded to the `ReqBody` and returned.
    pub(crate) async fn serve(&mut self) -> Result<(), BodyReadError> {
        while !self.eof {
            if self.signal_receiver.next().await.is_none() {
                // the body was dropped, leftovers are drained later
                return Ok(());
            }

            match self.read_data().await {
                Ok(payload_item) => {
                    self.eof = payload_item.is_eof();
                    if self.data_sender.send(Ok(payload_item)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(cause = %e, "failed to read request body");
                    let _ = self.data_sender.send(Err(e.to_parse_error())).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Closes the body and skips unread payload, leaving the connection at
    /// the start of the next request.
    ///
    /// Safe to call more than once, and when the body was never read.
    pub(crate) async fn drain(&mut self) -> Result<(), BodyReadError> {
        self.signal_receiver.close();
        self.data_sender.close_channel();

        let mut skipped: usize = 0;
        while !self.eof {
            let payload_item = self.read_data().await?;
            self.eof = payload_item.is_eof();
            if let Some(bytes) = payload_item.as_bytes() {
                skipped += bytes.len();
            }
        }

        if skipped > 0 {
            debug!(size = skipped, "skip unread request body");
        }
        Ok(())
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    async fn read_data(&mut self) -> Result<PayloadItem, BodyReadError> {
        let next = match self.cancellation.race(timeout(self.read_timeout, self.payload_stream.next())).await {
            Ok(Ok(next)) => next,
            Ok(Err(_elapsed)) => {
                warn!(timeout = ?self.read_timeout, "request body read timed out");
                return Err(BodyReadError::Timeout(self.read_timeout));
            }
            Err(Cancelled) => return Err(BodyReadError::Cancelled),
        };

        match next {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("received header while reading request body");
                Err(ParseError::invalid_body("received header while reading request body").into())
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(ParseError::invalid_body("connection closed before request body ended").into()),
        }
    }
}

/// The request body handed to handlers, an [`http_body::Body`] of `Bytes`.
///
/// Each poll asks the session for one payload item and waits for it, so unread bytes
/// stay on the connection until the session drains them.
#[derive(Debug)]
pub struct ReqBody {
    signal_sender: mpsc::Sender<RequestData>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    in_flight: bool,
    finished: bool,
}

impl ReqBody {
    fn new(
        signal_sender: mpsc::Sender<RequestData>,
        data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        payload_size: PayloadSize,
    ) -> Self {
        let finished = payload_size.is_empty();
        Self { signal_sender, data_receiver, payload_size, in_flight: false, finished }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if Pin::new(&mut this.signal_sender).start_send(RequestData).is_err() {
                        this.finished = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("request body closed"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(_)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("request body closed"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        let item = match this.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => return Poll::Pending,
        };
        this.in_flight = false;

        match item {
            Some(Ok(PayloadItem::Chunk(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Ok(PayloadItem::Trailers(trailers))) => {
                this.finished = true;
                Poll::Ready(Some(Ok(Frame::trailers(trailers))))
            }
            Some(Ok(PayloadItem::Eof)) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.finished = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("request body closed before eof"))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        match self.payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http_body_util::BodyExt;

    type Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>;

    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    fn payload(items: Vec<PayloadItem>) -> impl Stream<Item = Item> + Unpin {
        stream::iter(items.into_iter().map(|item| Ok(Message::Payload(item))))
    }

    #[tokio::test]
    async fn serve_body_to_reader() {
        let mut stream = payload(vec![
            PayloadItem::Chunk(Bytes::from_static(b"hello ")),
            PayloadItem::Chunk(Bytes::from_static(b"world")),
            PayloadItem::Eof,
        ]);
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(11), READ_TIMEOUT, Cancellation::new());

        let (served, collected) = tokio::join!(sender.serve(), body.collect());
        served.unwrap();
        assert_eq!(collected.unwrap().to_bytes().as_ref(), b"hello world");
        assert!(sender.is_eof());
    }

    #[tokio::test]
    async fn drain_unread_body() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"unused")), PayloadItem::Eof]);
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(6), READ_TIMEOUT, Cancellation::new());
        drop(body);

        sender.serve().await.unwrap();
        assert!(!sender.is_eof());

        sender.drain().await.unwrap();
        assert!(sender.is_eof());
        sender.drain().await.unwrap();
    }

    #[tokio::test]
    async fn empty_body_is_finished() {
        let mut stream = payload(vec![PayloadItem::Eof]);
        let (mut sender, mut body) = body_channel(&mut stream, PayloadSize::new_empty(), READ_TIMEOUT, Cancellation::new());

        assert!(body.is_end_stream());
        assert!(body.frame().await.is_none());

        sender.drain().await.unwrap();
        assert!(sender.is_eof());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"par"))]);
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(10), READ_TIMEOUT, Cancellation::new());

        let (served, collected) = tokio::join!(sender.serve(), body.collect());
        assert!(served.is_err());
        assert!(collected.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_body_times_out() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"abc"))]).chain(stream::pending());
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(10), READ_TIMEOUT, Cancellation::new());

        let (served, collected) = tokio::join!(sender.serve(), body.collect());
        assert!(matches!(served, Err(BodyReadError::Timeout(timeout)) if timeout == READ_TIMEOUT));
        assert!(collected.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_drain_times_out() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"abc"))]).chain(stream::pending());
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(10), READ_TIMEOUT, Cancellation::new());
        drop(body);

        let started = tokio::time::Instant::now();
        assert!(matches!(sender.drain().await, Err(BodyReadError::Timeout(_))));
        assert!(started.elapsed() >= READ_TIMEOUT);
    }

    #[tokio::test]
    async fn cancellation_stops_drain() {
        let mut stream = payload(vec![PayloadItem::Chunk(Bytes::from_static(b"abc"))]).chain(stream::pending());
        let cancellation = Cancellation::new();
        let (mut sender, body) = body_channel(&mut stream, PayloadSize::new_length(10), READ_TIMEOUT, cancellation.clone());
        drop(body);

        cancellation.close();
        assert!(matches!(sender.drain().await, Err(BodyReadError::Cancelled)));
    }
}
