//! Handing a connection over after `101 Switching Protocols`.
//!
//! Every request carries an [`OnUpgrade`]. A handler that wants to take over the
//! connection keeps it, answers with status 101, and awaits it: once the 101 response
//! has been flushed the session stops reading requests and resolves the `OnUpgrade`
//! with the raw stream. Bytes the peer sent after the upgrade request and that were
//! already buffered are replayed first by [`Upgraded`].

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

/// A byte stream that can be handed over on upgrade
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// The connection after a protocol switch.
pub struct Upgraded {
    io: Box<dyn Io>,
    read_buf: Bytes,
}

impl Upgraded {
    pub(crate) fn new<T: Io>(io: T, read_buf: Bytes) -> Self {
        Self { io: Box::new(io), read_buf }
    }

    /// Splits into the stream and the bytes already read from it but not yet consumed
    pub fn into_parts(self) -> (Box<dyn Io>, Bytes) {
        (self.io, self.read_buf)
    }
}

impl std::fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upgraded").field("buffered", &self.read_buf.len()).finish_non_exhaustive()
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if self.read_buf.has_remaining() {
            let len = self.read_buf.remaining().min(buf.remaining());
            buf.put_slice(&self.read_buf[..len]);
            self.read_buf.advance(len);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

#[derive(Debug, Error)]
#[error("connection was not upgraded")]
pub struct UpgradeError;

/// Resolves with the [`Upgraded`] connection once a 101 response has been sent
#[derive(Debug)]
pub struct OnUpgrade {
    receiver: oneshot::Receiver<Upgraded>,
}

impl Future for OnUpgrade {
    type Output = Result<Upgraded, UpgradeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(ready!(Pin::new(&mut self.receiver).poll(cx)).map_err(|_closed| UpgradeError))
    }
}

/// The session's end of an [`OnUpgrade`]
#[derive(Debug)]
pub(crate) struct Pending {
    sender: oneshot::Sender<Upgraded>,
}

impl Pending {
    /// Hands the connection over. Returns it back when the `OnUpgrade` was dropped.
    pub(crate) fn fulfill(self, upgraded: Upgraded) -> Result<(), Upgraded> {
        self.sender.send(upgraded)
    }
}

pub(crate) fn pending() -> (Pending, OnUpgrade) {
    let (sender, receiver) = oneshot::channel();
    (Pending { sender }, OnUpgrade { receiver })
}
