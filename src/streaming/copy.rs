//! Padded stream copy.
//!
//! Copies a byte source to a writer, wrapping every chunk read from the
//! source in a fixed prefix and suffix. One caller-owned buffer serves the
//! whole copy: the prefix is written into its head once, each read lands
//! right after it, the suffix is placed behind the payload, and the framed
//! region goes out in a single write call.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CopyError, StreamError};

/// Buffer size used by [`padded_copy`].
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Like [`padded_copy_buf`] with a freshly allocated 32 KiB buffer.
pub async fn padded_copy<W, R>(
    dst: &mut W,
    src: &mut R,
    prefix: &[u8],
    suffix: &[u8],
) -> Result<u64, CopyError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; DEFAULT_COPY_BUFFER_SIZE];
    padded_copy_buf(dst, src, prefix, suffix, &mut buf).await
}

/// Copy `src` to `dst`, emitting each read as `prefix ++ chunk ++ suffix`.
///
/// At most `buf.len() - prefix.len() - suffix.len()` payload bytes are read
/// per round. Returns the total number of bytes the destination reported
/// as written, padding included. A read of zero bytes ends the copy.
///
/// A write call that accepts fewer bytes than the frame is fatal and
/// reported as [`StreamError::ShortWrite`]; nothing is retried. On any
/// error, [`CopyError::written`] still counts every byte the destination
/// accepted, including those of a short write.
pub async fn padded_copy_buf<W, R>(
    dst: &mut W,
    src: &mut R,
    prefix: &[u8],
    suffix: &[u8],
    buf: &mut [u8],
) -> Result<u64, CopyError>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Unpin + ?Sized,
{
    let padding = prefix.len() + suffix.len();
    if buf.len() <= padding {
        return Err(CopyError {
            written: 0,
            source: StreamError::BufferTooSmall {
                len: buf.len(),
                padding,
            },
        });
    }

    let start = prefix.len();
    let stop = buf.len() - suffix.len();
    buf[..start].copy_from_slice(prefix);

    let mut written: u64 = 0;

    loop {
        let n = match src.read(&mut buf[start..stop]).await {
            Ok(0) => return Ok(written),
            Ok(n) => n,
            Err(e) => {
                return Err(CopyError {
                    written,
                    source: StreamError::Read(e),
                })
            }
        };

        buf[start + n..start + n + suffix.len()].copy_from_slice(suffix);

        let frame_len = n + padding;
        let nw = dst.write(&buf[..frame_len]).await.map_err(|e| CopyError {
            written,
            source: StreamError::Write(e),
        })?;
        written += nw as u64;

        if nw != frame_len {
            return Err(CopyError {
                written,
                source: StreamError::ShortWrite {
                    requested: frame_len,
                    written: nw,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::streaming::mock::{ChunkedSource, MockTransport, WriteStep};

    #[tokio::test]
    async fn test_overflow_forces_single_byte_chunks() {
        let mut dst = Vec::new();
        let mut src: &[u8] = b"BAZ";
        let mut buf = [0u8; 8];

        let n = padded_copy_buf(&mut dst, &mut src, b"foo", b"bar\n", &mut buf)
            .await
            .unwrap();

        assert_eq!(n, 24);
        assert_eq!(dst, b"fooBbar\nfooAbar\nfooZbar\n");
    }

    #[tokio::test]
    async fn test_sse_data_line() {
        let mut dst = Vec::new();
        let mut src: &[u8] = b"foo";

        let n = padded_copy(&mut dst, &mut src, b"data: ", b"\n").await.unwrap();

        assert_eq!(n, 10);
        assert_eq!(dst, b"data: foo\n");
    }

    #[tokio::test]
    async fn test_empty_source_writes_nothing() {
        let mut dst = MockTransport::new();
        let mut src: &[u8] = b"";
        let mut buf = [0u8; 64];

        let n = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap();

        assert_eq!(n, 0);
        assert!(dst.output.is_empty());
        assert!(dst.write_sizes.is_empty());
    }

    #[tokio::test]
    async fn test_one_frame_per_read() {
        let mut dst = MockTransport::new();
        let mut src = ChunkedSource::new(["hello", " world"]);
        let mut buf = [0u8; 4096];

        let n = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap();

        assert_eq!(dst.output_str(), "data: hello\ndata:  world\n");
        assert_eq!(dst.write_sizes, vec![12, 13]);
        assert_eq!(n, 25);
    }

    #[tokio::test]
    async fn test_buffer_size_changes_line_count_not_content() {
        let payload = b"abcdefghij";

        let mut large = Vec::new();
        let mut buf = [0u8; 1024];
        padded_copy_buf(&mut large, &mut &payload[..], b"data: ", b"\n", &mut buf)
            .await
            .unwrap();
        assert_eq!(large, b"data: abcdefghij\n");

        // 10 - 6 - 1 leaves room for 3 payload bytes per frame.
        let mut small = Vec::new();
        let mut buf = [0u8; 10];
        let n = padded_copy_buf(&mut small, &mut &payload[..], b"data: ", b"\n", &mut buf)
            .await
            .unwrap();

        assert_eq!(
            std::str::from_utf8(&small).unwrap(),
            "data: abc\ndata: def\ndata: ghi\ndata: j\n"
        );
        assert_eq!(n, 38);

        let content: Vec<u8> = std::str::from_utf8(&small)
            .unwrap()
            .lines()
            .flat_map(|l| l.strip_prefix("data: ").unwrap().bytes())
            .collect();
        assert_eq!(content, payload);
    }

    #[tokio::test]
    async fn test_any_buffer_size_preserves_content() {
        let prefix = b"data: ";
        let suffix = b"\n";
        let padding = prefix.len() + suffix.len();
        let payload: Vec<u8> = (0..200u8).map(|i| b'a' + i % 26).collect();
        let splits = [1, 17, 64, 3, 100, 15];

        for len in padding + 1..=64 {
            let mut chunks = Vec::new();
            let mut rest = &payload[..];
            for &at in &splits {
                let (head, tail) = rest.split_at(at.min(rest.len()));
                chunks.push(head.to_vec());
                rest = tail;
            }
            let mut src = ChunkedSource::new(chunks);
            let mut dst = MockTransport::new();
            let mut buf = vec![0u8; len];

            let n = padded_copy_buf(&mut dst, &mut src, prefix, suffix, &mut buf)
                .await
                .unwrap();

            assert_eq!(n as usize, dst.output.len(), "buffer {len}");

            let mut content = Vec::new();
            let mut frames = &dst.output[..];
            for &size in &dst.write_sizes {
                let (frame, tail) = frames.split_at(size);
                frames = tail;
                assert!(frame.starts_with(prefix), "buffer {len}");
                assert!(frame.ends_with(suffix), "buffer {len}");
                let chunk = &frame[prefix.len()..size - suffix.len()];
                assert!(!chunk.is_empty() && chunk.len() <= len - padding, "buffer {len}");
                content.extend_from_slice(chunk);
            }
            assert_eq!(content, payload, "buffer {len}");
        }
    }

    #[tokio::test]
    async fn test_short_write_is_fatal() {
        let mut dst = MockTransport::with_steps([WriteStep::Limit(5)]);
        let mut src = ChunkedSource::new(["foo", "bar"]);
        let mut buf = [0u8; 64];

        let err = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap_err();

        assert_eq!(err.written, 5);
        assert!(matches!(
            err.source,
            StreamError::ShortWrite {
                requested: 10,
                written: 5
            }
        ));
        assert_eq!(dst.output, b"data:");
        assert_eq!(dst.write_sizes, vec![5]);
    }

    #[tokio::test]
    async fn test_written_matches_destination_after_short_write() {
        let mut dst = MockTransport::with_steps([WriteStep::Accept, WriteStep::Limit(2)]);
        let mut src = ChunkedSource::new(["one", "two", "three"]);
        let mut buf = [0u8; 64];

        let err = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap_err();

        let accepted: usize = dst.write_sizes.iter().sum();
        assert_eq!(err.written, accepted as u64);
        assert_eq!(err.written, 12);
    }

    #[tokio::test]
    async fn test_write_error_stops_copy() {
        let mut dst = MockTransport::with_steps([
            WriteStep::Accept,
            WriteStep::Fail(io::ErrorKind::ConnectionAborted),
        ]);
        let mut src = ChunkedSource::new(["a", "b", "c"]);
        let mut buf = [0u8; 64];

        let err = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap_err();

        assert_eq!(err.written, 8);
        match err.source {
            StreamError::Write(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dst.output, b"data: a\n");
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let mut dst = MockTransport::new();
        let mut src = ChunkedSource::new(["x"]).then_fail(io::ErrorKind::InvalidData);
        let mut buf = [0u8; 64];

        let err = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap_err();

        assert_eq!(err.written, 8);
        assert_eq!(dst.output, b"data: x\n");
        match err.source {
            StreamError::Read(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffer_must_exceed_padding() {
        let mut dst = MockTransport::new();
        let mut src: &[u8] = b"foo";
        let mut buf = [0u8; 7];

        let err = padded_copy_buf(&mut dst, &mut src, b"data: ", b"\n", &mut buf)
            .await
            .unwrap_err();

        assert_eq!(err.written, 0);
        assert!(matches!(
            err.source,
            StreamError::BufferTooSmall { len: 7, padding: 7 }
        ));
        assert!(dst.output.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_survives_reused_buffer() {
        let mut buf = [0u8; 16];

        let mut first = Vec::new();
        padded_copy_buf(&mut first, &mut &b"one"[..], b"data: ", b"\n", &mut buf)
            .await
            .unwrap();

        let mut second = Vec::new();
        padded_copy_buf(&mut second, &mut &b"xy"[..], b"> ", b"|\n", &mut buf)
            .await
            .unwrap();

        assert_eq!(first, b"data: one\n");
        assert_eq!(second, b"> xy|\n");
    }
}
