//! Adapter from a chunked byte stream (a response body) to `AsyncRead`.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tokio::io::{AsyncRead, ReadBuf};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Reads a stream of `Bytes` chunks through `AsyncRead`
pub struct BytesStreamReader {
    stream: Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>,
    /// Unread remainder of the current chunk
    pending: Bytes,
}

impl BytesStreamReader {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            stream: Box::pin(stream.map_err(|e| -> BoxError { e.into() })),
            pending: Bytes::new(),
        }
    }
}

/// Recover an `io::Error` as is; wrap anything else so it stays the error source
fn into_io_error(error: BoxError) -> io::Error {
    match error.downcast::<io::Error>() {
        Ok(io_error) => *io_error,
        Err(other) => io::Error::other(other),
    }
}

impl AsyncRead for BytesStreamReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                let n = buf.remaining().min(this.pending.len());
                buf.put_slice(&this.pending.split_to(n));
                return Poll::Ready(Ok(()));
            }

            // Empty chunks fall through and poll again
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(e)) => return Poll::Ready(Err(into_io_error(e))),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}
