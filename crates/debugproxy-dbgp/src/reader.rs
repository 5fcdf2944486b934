use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::frame_len;
use crate::{DbgpError, Result, NUL, READ_BUFFER_SIZE};

/// Reassembles DBGp frames from an arbitrarily chunked byte stream.
///
/// Each socket read is bounded to [`READ_BUFFER_SIZE`] bytes. A frame split
/// across reads is completed with further reads, and bytes past the end of a
/// frame stay buffered for the next call.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// Next complete frame (`<len>\0<payload>\0`), or `None` on a clean EOF.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }

            let n = self.fill().await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(DbgpError::UnexpectedEof {
                    buffered: self.buf.len(),
                });
            }
        }
    }

    async fn fill(&mut self) -> Result<usize> {
        let start = self.buf.len();
        self.buf.resize(start + READ_BUFFER_SIZE, 0);
        match self.inner.read(&mut self.buf[start..]).await {
            Ok(n) => {
                self.buf.truncate(start + n);
                Ok(n)
            }
            Err(err) => {
                self.buf.truncate(start);
                Err(err.into())
            }
        }
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(total) = frame_len(&self.buf)? else {
            return Ok(None);
        };
        if self.buf.len() < total {
            return Ok(None);
        }
        if self.buf[total - 1] != NUL {
            return Err(DbgpError::MissingTerminator { len: total });
        }

        let rest = self.buf.split_off(total);
        Ok(Some(std::mem::replace(&mut self.buf, rest)))
    }
}
