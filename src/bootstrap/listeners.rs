use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, UnixListener};

/// Upper bound on how much of a connection's first chunk is scanned for a
/// malformed Host header.
const PREAMBLE_SCAN_LIMIT: usize = 2048;

/// Accepted connection as handed to the HTTP layer.
pub trait DaemonStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DaemonStream for T {}

enum ListenerKind {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// A listener the daemon has bound, optionally hardened against malformed
/// request preambles. Hardening does not change the listener's identity or
/// lifecycle, only how accepted connections read.
pub struct BoundListener {
    kind: ListenerKind,
    hardened: bool,
}

impl BoundListener {
    pub fn tcp(listener: TcpListener) -> Self {
        Self {
            kind: ListenerKind::Tcp(listener),
            hardened: false,
        }
    }

    pub fn unix(listener: UnixListener) -> Self {
        Self {
            kind: ListenerKind::Unix(listener),
            hardened: false,
        }
    }

    pub fn is_hardened(&self) -> bool {
        self.hardened
    }

    pub async fn accept(&self) -> io::Result<Box<dyn DaemonStream>> {
        match &self.kind {
            ListenerKind::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(self.wrap(stream))
            }
            ListenerKind::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(self.wrap(stream))
            }
        }
    }

    fn wrap<S>(&self, stream: S) -> Box<dyn DaemonStream>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if self.hardened {
            Box::new(SanitizedStream::new(stream))
        } else {
            Box::new(stream)
        }
    }
}

/// Marks listeners whose accepted connections must have malformed host-header
/// input normalized before it reaches the HTTP request parser.
///
/// Domain sockets present a single logical endpoint, so for `unix` only the
/// first listener is hardened; every inherited descriptor under `fd` is an
/// independent endpoint, so all of them are. Other transports pass through
/// unmodified.
pub fn harden_listeners(proto: &str, mut listeners: Vec<BoundListener>) -> Vec<BoundListener> {
    match proto {
        "unix" => {
            if let Some(first) = listeners.first_mut() {
                first.hardened = true;
            }
        }
        "fd" => {
            for listener in &mut listeners {
                listener.hardened = true;
            }
        }
        _ => {}
    }
    listeners
}

/// Rewrites a Host header whose value the HTTP parser would reject (empty, or
/// a socket path sent by legacy clients) to `localhost`. Returns whether a
/// rewrite happened. Only the first header block is considered.
pub fn sanitize_host_header(buf: &mut Vec<u8>) -> bool {
    let scan_end = buf.len().min(PREAMBLE_SCAN_LIMIT);
    let Some((value_start, value_end)) = find_host_value(&buf[..scan_end]) else {
        return false;
    };
    let value = &buf[value_start..value_end];
    let first_nonblank = value.iter().copied().find(|&b| b != b' ' && b != b'\t');
    let malformed = match first_nonblank {
        None => true,
        Some(b) => b == b'/',
    };
    if malformed {
        buf.splice(value_start..value_end, b" localhost".iter().copied());
        return true;
    }
    false
}

/// Locates the value span of the first `Host:` header line, stopping at the
/// end of the header block.
fn find_host_value(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = buf.iter().position(|&b| b == b'\n')? + 1;
    while line_start < buf.len() {
        let line_end = buf[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| line_start + i)
            .unwrap_or(buf.len());
        let line = &buf[line_start..line_end];
        if line.is_empty() || line == b"\r" {
            // end of headers
            return None;
        }
        if line.len() >= 5 && line[..5].eq_ignore_ascii_case(b"host:") {
            let value_end = if line.ends_with(b"\r") {
                line_end - 1
            } else {
                line_end
            };
            return Some((line_start + 5, value_end));
        }
        line_start = line_end + 1;
    }
    None
}

enum SanitizeState {
    Pending,
    Buffered { data: Vec<u8>, pos: usize },
    Done,
}

/// Stream decorator that sanitizes the first chunk read from the connection,
/// then becomes a transparent passthrough.
pub struct SanitizedStream<S> {
    inner: S,
    state: SanitizeState,
}

impl<S> SanitizedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SanitizeState::Pending,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SanitizedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                SanitizeState::Pending => {
                    let mut chunk = [0u8; PREAMBLE_SCAN_LIMIT];
                    let mut chunk_buf = ReadBuf::new(&mut chunk);
                    match Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Ready(Ok(())) => {}
                    }
                    let filled = chunk_buf.filled();
                    if filled.is_empty() {
                        this.state = SanitizeState::Done;
                        return Poll::Ready(Ok(()));
                    }
                    let mut data = filled.to_vec();
                    if sanitize_host_header(&mut data) {
                        tracing::debug!("rewrote malformed host header on accepted connection");
                    }
                    this.state = SanitizeState::Buffered { data, pos: 0 };
                }
                SanitizeState::Buffered { data, pos } => {
                    let remaining = &data[*pos..];
                    let n = remaining.len().min(buf.remaining());
                    buf.put_slice(&remaining[..n]);
                    *pos += n;
                    if *pos == data.len() {
                        this.state = SanitizeState::Done;
                    }
                    return Poll::Ready(Ok(()));
                }
                SanitizeState::Done => return Pin::new(&mut this.inner).poll_read(cx, buf),
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SanitizedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn bind_tcp_listeners(n: usize) -> Vec<BoundListener> {
        let mut listeners = Vec::new();
        for _ in 0..n {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listeners.push(BoundListener::tcp(listener));
        }
        listeners
    }

    #[tokio::test]
    async fn test_unix_transport_hardens_first_listener_only() {
        let listeners = harden_listeners("unix", bind_tcp_listeners(3).await);
        let flags: Vec<bool> = listeners.iter().map(BoundListener::is_hardened).collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_fd_transport_hardens_every_listener() {
        let listeners = harden_listeners("fd", bind_tcp_listeners(3).await);
        assert!(listeners.iter().all(BoundListener::is_hardened));
    }

    #[tokio::test]
    async fn test_other_transports_pass_through() {
        let listeners = harden_listeners("tcp", bind_tcp_listeners(3).await);
        assert!(listeners.iter().all(|l| !l.is_hardened()));
    }

    #[test]
    fn test_sanitize_socket_path_host() {
        let mut buf = b"GET /_ping HTTP/1.1\r\nHost: /var/run/loomd.sock\r\nAccept: */*\r\n\r\n"
            .to_vec();
        assert!(sanitize_host_header(&mut buf));
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Host: localhost\r\n"));
        assert!(text.contains("Accept: */*"));
    }

    #[test]
    fn test_sanitize_empty_host() {
        let mut buf = b"GET / HTTP/1.1\r\nHost: \r\n\r\n".to_vec();
        assert!(sanitize_host_header(&mut buf));
        assert!(String::from_utf8(buf).unwrap().contains("Host: localhost"));
    }

    #[test]
    fn test_well_formed_host_untouched() {
        let original = b"GET / HTTP/1.1\r\nHost: example.com:2375\r\n\r\n".to_vec();
        let mut buf = original.clone();
        assert!(!sanitize_host_header(&mut buf));
        assert_eq!(buf, original);
    }

    #[test]
    fn test_host_outside_header_block_ignored() {
        let original = b"POST / HTTP/1.1\r\nContent-Length: 8\r\n\r\nHost: /x".to_vec();
        let mut buf = original.clone();
        assert!(!sanitize_host_header(&mut buf));
        assert_eq!(buf, original);
    }

    #[tokio::test]
    async fn test_hardened_accept_rewrites_first_chunk() {
        let mut listeners = harden_listeners("fd", bind_tcp_listeners(1).await);
        let listener = listeners.remove(0);
        let addr = match &listener.kind {
            ListenerKind::Tcp(l) => l.local_addr().unwrap(),
            ListenerKind::Unix(_) => unreachable!(),
        };

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /_ping HTTP/1.1\r\nHost: /var/run/loomd.sock\r\n\r\n")
                .await
                .unwrap();
            stream.shutdown().await.unwrap();
        });

        let mut stream = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        client.await.unwrap();

        let text = String::from_utf8(received).unwrap();
        assert!(text.contains("Host: localhost\r\n"));
        assert!(!text.contains("loomd.sock"));
    }
}
