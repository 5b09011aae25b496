//! Direct serial transport
//!
//! For a controller wired straight to the host instead of through a
//! terminal server. The DD-series RS-232 port runs at 9600 8N1 without
//! flow control.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Upper bound on bytes discarded by a single drain
const MAX_DRAIN: usize = 64 * 1024;

/// Serial port transport
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    stream: Option<SerialStream>,
    drain_window: Duration,
}

impl SerialTransport {
    /// Create new serial transport at the controller's default 9600 baud
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: 9600,
            stream: None,
            drain_window: Duration::from_millis(50),
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set how long the line must stay quiet before a drain finishes
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        debug!("Opening {} at {} baud...", self.path, self.baud_rate);

        let path = self.path.clone();
        let baud_rate = self.baud_rate;

        // Opening a tty can block on some drivers
        let stream = spawn_blocking(move || {
            tokio_serial::new(&path, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
        .map_err(|e| Error::Io(e.into()))?;

        debug!("Opened {}", self.path);

        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("Closed {}", self.path);
        }
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

        let mut buf = BytesMut::with_capacity(256);

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
        let mut buf = BytesMut::with_capacity(256);

        while discarded < MAX_DRAIN {
            buf.clear();
            match timeout(window, stream.read_buf(&mut buf)).await {
                Err(_) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(Error::Io(e)),
            }
        }

        if discarded > 0 {
            debug!("Discarded {} pending bytes", discarded);
        }

        Ok(discarded)
    }

    fn remote_addr(&self) -> String {
        self.path.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Serial transport dropped while still open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_transport_create() {
        let transport = SerialTransport::new("/dev/ttyUSB0").with_baud_rate(19200);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_serial_transport_missing_port() {
        let mut transport = SerialTransport::new("/dev/ozatten-does-not-exist");
        assert!(matches!(transport.connect().await, Err(Error::Io(_))));
        assert!(!transport.is_connected());
    }
}
