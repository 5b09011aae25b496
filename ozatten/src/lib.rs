//! # ozatten
//!
//! Driver for OZ Optics DD-100-MC and DD-600-MC variable optical
//! attenuators, reached over a terminal server (TCP-to-serial bridge).
//!
//! ## Features
//!
//! - Typed commands and replies for the DD-series ASCII protocol
//! - Async/await API using Tokio
//! - Range checks per model before anything is sent
//! - Optional direct serial port access (`serial` feature)
//!
//! ## Quick Start
//!
//! ```no_run
//! use ozatten::Controller;
//!
//! #[tokio::main]
//! async fn main() -> ozatten::Result<()> {
//!     // Connect through the terminal server
//!     let mut controller = Controller::new("192.168.1.50", 10001);
//!     controller.connect().await?;
//!
//!     // Set and read back attenuation
//!     controller.set_attenuation(12.5).await?;
//!     let atten = controller.attenuation().await?;
//!     println!("{}", atten);
//!
//!     // Disconnect
//!     controller.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;

// Re-exports
pub use config::ControllerConfig;
pub use controller::Controller;
pub use error::{Error, Result};

// Re-export types
pub use ozatten_core::{Command, DeviceErrorCode, DeviceModel, Response, Session, Status};
pub use ozatten_transport::Transport;
pub use ozatten_types::{Attenuation, DeviceIdentity, Readout};
