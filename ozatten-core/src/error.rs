//! Error types for ozatten-core

use ozatten_types::Attenuation;

use crate::model::DeviceModel;
use crate::response::DeviceErrorCode;

/// Result type alias for ozatten protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reply does not follow the expected layout for the command
    #[error("Malformed reply to '{command}': {reason} (reply: {reply:?})")]
    MalformedReply {
        command: String,
        reason: String,
        reply: String,
    },

    /// Reply completed without a value the command should report
    #[error("Missing '{field}' in reply to '{command}' (reply: {reply:?})")]
    MissingField {
        command: String,
        field: &'static str,
        reply: String,
    },

    /// Device reported an error status
    #[error("Device rejected '{command}': {code}")]
    Device {
        command: String,
        code: DeviceErrorCode,
    },

    /// Requested attenuation outside the model's range
    #[error("Attenuation {value} dB outside {model} range ({min} to {max})")]
    AttenuationOutOfRange {
        value: f64,
        model: DeviceModel,
        min: Attenuation,
        max: Attenuation,
    },

    /// Requested attenuation is not a usable number
    #[error("Invalid attenuation: {0}")]
    InvalidAttenuation(#[from] ozatten_types::Error),

    /// Command text cannot be sent on the line
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Reply bytes are not text
    #[error("Reply is not valid UTF-8")]
    NotUtf8,

    /// Reply grew past the limit without a status line
    #[error("Reply too large: {size} bytes without a status line (max: {max} bytes)")]
    ReplyTooLarge {
        size: usize,
        max: usize,
    },

    /// Unknown device model name
    #[error("Unknown device model: {0}")]
    UnknownModel(String),

    /// Invalid session state
    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

impl Error {
    /// Device error code, if the device itself reported the failure
    pub fn device_code(&self) -> Option<DeviceErrorCode> {
        match self {
            Self::Device { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Check if the error was caught before anything was sent
    pub fn is_rejected_argument(&self) -> bool {
        matches!(
            self,
            Self::AttenuationOutOfRange { .. }
                | Self::InvalidAttenuation(_)
                | Self::InvalidCommand(_)
        )
    }

    /// Check if the device reported a hardware fault (needs service)
    pub fn is_hardware_fault(&self) -> bool {
        self.device_code().is_some_and(DeviceErrorCode::is_hardware_fault)
    }
}
