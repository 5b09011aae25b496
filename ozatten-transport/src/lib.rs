//! Transport layer for the DD-series attenuator protocol
//!
//! Provides the byte pipe to a controller: TCP through a terminal server,
//! or a local serial port with the `serial` feature.

pub mod error;
#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available (with timeout)
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;

    /// Discard pending input, returning the number of bytes dropped
    async fn drain(&mut self) -> Result<usize>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
