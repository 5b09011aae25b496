//! TCP transport through a terminal server

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Upper bound on bytes discarded by a single drain
const MAX_DRAIN: usize = 64 * 1024;

/// TCP transport to a terminal-server serial port
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
    drain_window: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
            drain_window: Duration::from_millis(50),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long the line must stay quiet before a drain finishes
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr_str = format!("{}:{}", self.addr, self.port);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?
            .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))?;

        self.socket_addr = Some(*addr);
        Ok(*addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Commands are a few bytes each
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        self.socket_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {:?}", data.len(), String::from_utf8_lossy(data));

        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }

    async fn receive(&mut self, timeout_duration: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut buf = BytesMut::with_capacity(1024);

        let n = timeout(timeout_duration, stream.read_buf(&mut buf))
            .await
            .map_err(|_| Error::ReadTimeout)?
            .map_err(Error::Io)?;

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes: {:?}", n, String::from_utf8_lossy(&buf[..n]));

        Ok(buf)
    }

    async fn drain(&mut self) -> Result<usize> {
        let window = self.drain_window;
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let mut discarded = 0;
        let mut buf = BytesMut::with_capacity(1024);

        while discarded < MAX_DRAIN {
            buf.clear();
            match timeout(window, stream.read_buf(&mut buf)).await {
                // Quiet line
                Err(_) => break,
                Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                Ok(Ok(n)) => {
                    trace!("Discarding {} bytes: {:?}", n, String::from_utf8_lossy(&buf[..n]));
                    discarded += n;
                }
                Ok(Err(e)) => return Err(Error::Io(e)),
            }
        }

        if discarded >= MAX_DRAIN {
            warn!("Input still arriving after discarding {} bytes", discarded);
        } else if discarded > 0 {
            debug!("Discarded {} pending bytes", discarded);
        }

        Ok(discarded)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("192.168.1.201", 4001);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "192.168.1.201:4001");
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport = TcpTransport::new("invalid..address", 4001)
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_transport_refused_fails_promptly() {
        // Grab a free port, then close it so nothing is listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new("127.0.0.1", port)
            .with_connect_timeout(Duration::from_secs(2));

        let started = std::time::Instant::now();
        let result = transport.connect().await;

        assert!(matches!(result, Err(Error::Io(_)) | Err(Error::ConnectionTimeout)));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_tcp_transport_not_connected() {
        let mut transport = TcpTransport::new("127.0.0.1", 4001);

        assert!(matches!(transport.send(b"A?\r\n").await, Err(Error::NotConnected)));
        assert!(matches!(
            transport.receive(Duration::from_millis(10)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(transport.drain().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_tcp_transport_send_receive_drain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"terminal server banner\r\n").await.unwrap();

            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"A?\r\n");
            socket.write_all(b"Done\r\n").await.unwrap();

            // Hold the socket until the client hangs up
            let _ = socket.read(&mut buf).await;
        });

        let mut transport = TcpTransport::new("127.0.0.1", port)
            .with_drain_window(Duration::from_millis(100));
        transport.connect().await.unwrap();
        assert!(matches!(transport.connect().await, Err(Error::AlreadyConnected)));

        let discarded = transport.drain().await.unwrap();
        assert_eq!(discarded, b"terminal server banner\r\n".len());

        transport.send(b"A?\r\n").await.unwrap();
        let reply = transport.receive(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply.as_ref(), b"Done\r\n");

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_transport_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let _ = socket.read(&mut buf).await;
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();

        let result = transport.receive(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));
        assert!(result.unwrap_err().is_timeout());

        transport.disconnect().await.unwrap();
        server.await.unwrap();
    }
}
