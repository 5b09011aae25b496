//! # ozatten-core
//!
//! Core protocol implementation for OZ Optics DD-series attenuator
//! controllers.
//!
//! This crate provides the protocol primitives:
//! - Command definitions and ASCII encoding
//! - Reply framing and parsing
//! - Per-model command syntax and limits
//! - Session state

pub mod command;
pub mod constants;
pub mod error;
pub mod model;
pub mod response;
pub mod session;

pub use command::Command;
pub use error::{Error, Result};
pub use model::{DeviceModel, ModelSpec};
pub use response::{DeviceErrorCode, ReplyBuffer, Response, Status};
pub use session::{Session, SessionState};
