//! Transport capabilities needed by the event writer.

use nix::libc;
use std::io;
use tokio::io::AsyncWrite;

/// A byte sink an event stream can be written to.
///
/// Besides being an [`AsyncWrite`], a transport answers two questions the
/// writer cannot answer portably on its own: whether an explicit flush
/// actually pushes data to the peer, and whether a given write error means
/// the peer has gone away.
pub trait Transport: AsyncWrite + Unpin + Send {
    /// Whether `flush` delivers buffered bytes to the peer.
    fn can_flush(&self) -> bool {
        true
    }

    /// Whether `err` means the remote end closed the connection.
    fn is_peer_gone(&self, err: &io::Error) -> bool {
        is_disconnect(err)
    }
}

/// Boxed transport handed to event handlers.
pub type DynTransport = Box<dyn Transport>;

/// Broken-pipe class check used by the stock transports.
pub fn is_disconnect(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => true,
        _ => matches!(err.raw_os_error(), Some(libc::EPIPE) | Some(libc::ECONNRESET)),
    }
}

impl Transport for tokio::net::TcpStream {}

impl Transport for tokio::net::UnixStream {}

impl Transport for tokio::io::DuplexStream {}

impl Transport for Vec<u8> {}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn can_flush(&self) -> bool {
        (**self).can_flush()
    }

    fn is_peer_gone(&self, err: &io::Error) -> bool {
        (**self).is_peer_gone(err)
    }
}
