//! SSE (Server-Sent Events) response heads and fixed wire strings.

/// HTTP head for an event-stream response.
pub const SSE_HEADERS: &str = "\
HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream; charset=utf-8\r\n\
Cache-Control: no-cache\r\n\
Connection: close\r\n\
X-Accel-Buffering: no\r\n\
\r\n";

/// Comment line sent once the stream is established.
pub const CONNECTION_GREETING: &str = ": connected\n\n";

fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        431 => "Request Header Fields Too Large",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Format an HTTP error response with the given status code and reason.
/// The reason is sanitized to prevent HTTP response splitting.
pub fn format_error_response(status: u16, reason: &str) -> String {
    let status_text = status_text(status);
    let safe_reason: String = reason.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let body = format!("{}: {}\n", status_text, safe_reason);
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    )
}

/// Format a bodiless response, as sent when a stream cannot be served at all.
///
/// Carries the event-stream content type, since the request was for a stream.
pub fn format_empty_response(status: u16) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/event-stream; charset=utf-8\r\nCache-Control: no-cache\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status,
        status_text(status)
    )
}
