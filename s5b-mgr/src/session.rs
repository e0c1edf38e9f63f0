//! The duplex byte stream handed back from a successful negotiation.

use std::collections::HashSet;
use std::io::Result as IoResult;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::tcp::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// An established bytestream.
///
/// Reads and writes go straight to the paired socket; use
/// [`BytestreamSession::split`] to drive the two directions from
/// separate tasks.  The session ID stays reserved for as long as this
/// object lives: closing (or dropping) the session releases it for
/// reuse.
pub struct BytestreamSession {
    /// The paired socket.
    stream: TcpStream,
    /// The session ID this stream belongs to.
    sid: String,
    /// The set of live session IDs, shared with the manager.
    live: Arc<Mutex<HashSet<String>>>,
}

impl BytestreamSession {
    /// Wrap a paired socket.  `sid` must already be present in `live`.
    pub(crate) fn new(stream: TcpStream, sid: String, live: Arc<Mutex<HashSet<String>>>) -> Self {
        BytestreamSession { stream, sid, live }
    }

    /// Return the ID of the session this stream belongs to.
    pub fn session_id(&self) -> &str {
        &self.sid
    }

    /// Borrow the read and write halves of the stream, so that both
    /// directions can be driven concurrently.
    pub fn split(&mut self) -> (ReadHalf<'_>, WriteHalf<'_>) {
        self.stream.split()
    }

    /// Shut the stream down cleanly and release its session ID.
    pub async fn close(mut self) -> IoResult<()> {
        self.stream.shutdown().await
        // Drop releases the session ID.
    }
}

impl Drop for BytestreamSession {
    fn drop(&mut self) {
        self.live
            .lock()
            .expect("poisoned live-session lock")
            .remove(&self.sid);
    }
}

impl AsyncRead for BytestreamSession {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for BytestreamSession {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<IoResult<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
