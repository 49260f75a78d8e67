//! The per-connection response dispatch queue.
//!
//! Responses are written by a single worker task that owns the write half of the
//! connection and drains submitted responses strictly in submission order: the first
//! byte of a response is only written after the last byte of the previous one, trailers
//! included, has been flushed. Submitting never waits for the worker; the returned
//! [`ResponseFlushed`] resolves once that particular response is on the wire.
//!
//! A write failure ends the worker. The failed response reports the error and every
//! response still queued behind it reports [`SendError::QueueClosed`].

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::SinkExt;
use http::Response;
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{error, trace};

use crate::codec::ResponseEncoder;
use crate::protocol::body::ResponseBody;
use crate::protocol::{Message, PayloadItem, PayloadSize, ResponseHead, SendError};

type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

struct Job {
    response: Response<ResponseBody>,
    flushed: oneshot::Sender<Result<(), SendError>>,
}

/// Submission side of a connection's response queue
#[derive(Debug, Clone)]
pub struct ResponseQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("status", &self.response.status()).finish_non_exhaustive()
    }
}

impl ResponseQueue {
    /// Spawns the worker writing to `writer`.
    ///
    /// The worker runs until every `ResponseQueue` handle is dropped and the queued
    /// responses are written, or until a write fails. Its join handle yields the writer
    /// back so the caller can shut the connection down or hand it over.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = DispatchWorker { framed_write: FramedWrite::new(writer, ResponseEncoder::new()), receiver };
        (Self { sender }, tokio::spawn(worker.run()))
    }

    /// Queues `response` behind every response submitted before it
    pub fn enqueue(&self, response: Response<ResponseBody>) -> ResponseFlushed {
        let (flushed, receiver) = oneshot::channel();
        if let Err(mpsc::error::SendError(job)) = self.sender.send(Job { response, flushed }) {
            let _ = job.flushed.send(Err(SendError::QueueClosed));
        }
        ResponseFlushed { receiver }
    }
}

/// Resolves once the submitted response has been written and flushed
#[derive(Debug)]
#[must_use = "a response is only known to be written once ResponseFlushed resolves"]
pub struct ResponseFlushed {
    receiver: oneshot::Receiver<Result<(), SendError>>,
}

impl Future for ResponseFlushed {
    type Output = Result<(), SendError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.receiver).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => Poll::Ready(Err(SendError::QueueClosed)),
        }
    }
}

struct DispatchWorker<W> {
    framed_write: FramedWrite<W, ResponseEncoder>,
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl<W> DispatchWorker<W>
where
    W: AsyncWrite + Unpin,
{
    async fn run(mut self) -> W {
        while let Some(Job { response, flushed }) = self.receiver.recv().await {
            let status = response.status();
            let result = self.write_response(response).await;

            let failed = result.is_err();
            if let Err(e) = &result {
                error!(cause = %e, %status, "failed to write response");
            } else {
                trace!(%status, "response flushed");
            }

            // the session may have stopped waiting, the outcome is logged above
            let _ = flushed.send(result);
            if failed {
                break;
            }
        }

        self.framed_write.into_inner()
    }

    async fn write_response(&mut self, response: Response<ResponseBody>) -> Result<(), SendError> {
        let (header_parts, mut body) = response.into_parts();

        let payload_size = match body.size_hint().exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        };

        self.framed_write.feed(ResponseMessage::Header((ResponseHead::from_parts(header_parts, ()), payload_size))).await?;

        loop {
            let payload_item = match body.frame().await {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(bytes) => PayloadItem::Chunk(bytes),
                    Err(frame) => match frame.into_trailers() {
                        Ok(trailers) => PayloadItem::Trailers(trailers),
                        Err(_) => continue,
                    },
                },
                Some(Err(e)) => return Err(SendError::invalid_body(format!("resolve response body error: {e}"))),
                None => PayloadItem::Eof,
            };

            let is_eof = payload_item.is_eof();
            // eof is fed, the final flush below covers it
            if is_eof {
                self.framed_write.feed(ResponseMessage::Payload(payload_item)).await?;
                break;
            }
            self.framed_write.send(ResponseMessage::Payload(payload_item)).await?;
        }

        SinkExt::<ResponseMessage>::flush(&mut self.framed_write).await
    }
}
