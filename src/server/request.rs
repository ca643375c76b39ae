//! HTTP/1.x request head reading.
//!
//! Only the head is consumed: event streams are requested with `GET`, so no
//! request body is expected.

use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::RequestError;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A parsed request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    target: String,
    version: String,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Parse a complete request head (terminator optional).
    pub fn parse(head: &[u8]) -> Result<Self, RequestError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| RequestError::Malformed("request head is not UTF-8".to_string()))?;

        let mut lines = text.split("\r\n");
        let request_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| RequestError::Malformed("empty request line".to_string()))?;

        let mut parts = request_line.split(' ');
        let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
            _ => {
                return Err(RequestError::Malformed(format!(
                    "bad request line: {:?}",
                    request_line
                )))
            }
        };

        if !version.starts_with("HTTP/1.") {
            return Err(RequestError::Malformed(format!(
                "unsupported version: {}",
                version
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RequestError::Malformed(format!("bad header line: {:?}", line)))?;
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(RequestError::Malformed(format!("bad header name: {:?}", name)));
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full request target, query included.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The id a reconnecting client last saw, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.header("Last-Event-ID").filter(|v| !v.is_empty())
    }
}

/// Read and parse one request head from `stream`.
///
/// Fails with [`RequestError::TooLarge`] once `max_size` bytes have arrived
/// without a complete head, and with [`RequestError::Timeout`] if the head
/// does not arrive within `timeout`.
pub async fn read_request<R>(
    stream: &mut R,
    max_size: usize,
    timeout: Duration,
) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    tokio::time::timeout(timeout, read_request_inner(stream, max_size))
        .await
        .map_err(|_| RequestError::Timeout)?
}

async fn read_request_inner<R>(stream: &mut R, max_size: usize) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(max_size.min(1024));
    let mut scanned: usize = 0;

    loop {
        if buf.len() >= max_size {
            return Err(RequestError::TooLarge(max_size));
        }
        buf.reserve(1024.min(max_size - buf.len()));

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(RequestError::Incomplete);
        }

        // Resume the search a few bytes back so a terminator split across reads is found.
        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = find(&buf[from..], HEAD_TERMINATOR) {
            let end = from + pos;
            if end > max_size {
                return Err(RequestError::TooLarge(max_size));
            }
            return Request::parse(&buf[..end]);
        }
        scanned = buf.len();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let req = Request::parse(
            b"GET /events?topic=a HTTP/1.1\r\nHost: localhost\r\nLast-Event-ID: 41\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.method(), "GET");
        assert_eq!(req.target(), "/events?topic=a");
        assert_eq!(req.path(), "/events");
        assert_eq!(req.query(), Some("topic=a"));
        assert_eq!(req.version(), "HTTP/1.1");
        assert_eq!(req.header("host"), Some("localhost"));
        assert_eq!(req.last_event_id(), Some("41"));
        assert_eq!(req.headers().count(), 2);
    }

    #[test]
    fn test_empty_last_event_id_is_none() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nLast-Event-ID:\r\n").unwrap();
        assert_eq!(req.header("last-event-id"), Some(""));
        assert_eq!(req.last_event_id(), None);
    }

    #[test]
    fn test_parse_rejects_bad_request_line() {
        assert!(matches!(
            Request::parse(b"GET /\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            Request::parse(b"GET / SPDY/3\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(Request::parse(b""), Err(RequestError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_bad_header() {
        let err = Request::parse(b"GET / HTTP/1.1\r\nno-colon\r\n\r\n").unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_read_request_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"GET /events HTTP/1.1\r\n").await.unwrap();
            client.write_all(b"Accept: text/event-stream\r\n\r").await.unwrap();
            client.write_all(b"\n").await.unwrap();
            client
        });

        let req = read_request(&mut server, 8192, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(req.path(), "/events");
        assert_eq!(req.header("Accept"), Some("text/event-stream"));

        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_request_too_large() {
        let mut src: &[u8] = &[b'a'; 512];
        let err = read_request(&mut src, 128, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::TooLarge(128)));
    }

    #[tokio::test]
    async fn test_read_request_incomplete() {
        let mut src: &[u8] = b"GET / HTTP/1.1\r\n";
        let err = read_request(&mut src, 1024, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Incomplete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_request_timeout() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request(&mut server, 1024, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Timeout));
    }
}
