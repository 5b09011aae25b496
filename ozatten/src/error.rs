//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ozatten_core::Error),

    #[error("Connection error: {0}")]
    Transport(#[from] ozatten_transport::Error),

    #[error("Device not connected")]
    NotConnected,
}

impl Error {
    /// Unreachable host, timeout, closed link, or no link at all
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }

    /// Malformed or unexpected reply, device error status, or rejected argument
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Device error code, if the device reported the failure
    pub fn device_code(&self) -> Option<ozatten_core::DeviceErrorCode> {
        match self {
            Self::Protocol(e) => e.device_code(),
            _ => None,
        }
    }

    /// Check if the link should be re-established before the next command
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Transport(ozatten_transport::Error::ConnectionClosed)
                | Self::Transport(ozatten_transport::Error::Io(_))
        )
    }
}
