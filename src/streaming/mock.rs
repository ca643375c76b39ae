//! Scripted transports and sources for unit tests.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::transport::Transport;

/// What the mock transport does on its next write call.
#[derive(Debug, Clone, Copy)]
pub enum WriteStep {
    /// Accept the whole buffer.
    Accept,
    /// Accept at most this many bytes.
    Limit(usize),
    /// Fail with this error kind.
    Fail(io::ErrorKind),
}

/// Transport that records every write call and follows a script.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub output: Vec<u8>,
    /// Size accepted by each write call, in order.
    pub write_sizes: Vec<usize>,
    pub flushes: usize,
    steps: VecDeque<WriteStep>,
    flush_error: Option<io::ErrorKind>,
    no_flush: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: impl IntoIterator<Item = WriteStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn failing_flush(mut self, kind: io::ErrorKind) -> Self {
        self.flush_error = Some(kind);
        self
    }

    pub fn without_flush(mut self) -> Self {
        self.no_flush = true;
        self
    }

    pub fn output_str(&self) -> &str {
        std::str::from_utf8(&self.output).expect("mock output is utf-8")
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let n = match self.steps.pop_front().unwrap_or(WriteStep::Accept) {
            WriteStep::Accept => buf.len(),
            WriteStep::Limit(limit) => limit.min(buf.len()),
            WriteStep::Fail(kind) => return Poll::Ready(Err(io::Error::from(kind))),
        };
        self.output.extend_from_slice(&buf[..n]);
        self.write_sizes.push(n);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.flushes += 1;
        match self.flush_error {
            Some(kind) => Poll::Ready(Err(io::Error::from(kind))),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Transport for MockTransport {
    fn can_flush(&self) -> bool {
        !self.no_flush
    }
}

/// Source that hands out one scripted chunk per read call.
///
/// A chunk larger than the caller's buffer is split across reads.
#[derive(Debug, Default)]
pub struct ChunkedSource {
    chunks: VecDeque<io::Result<Vec<u8>>>,
}

impl ChunkedSource {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Ok(c.as_ref().to_vec())).collect(),
        }
    }

    pub fn then_fail(mut self, kind: io::ErrorKind) -> Self {
        self.chunks.push_back(Err(io::Error::from(kind)));
        self
    }
}

impl AsyncRead for ChunkedSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.chunks.pop_front() {
            None => Poll::Ready(Ok(())),
            Some(Err(e)) => Poll::Ready(Err(e)),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    self.chunks.push_front(Ok(rest));
                }
                Poll::Ready(Ok(()))
            }
        }
    }
}
