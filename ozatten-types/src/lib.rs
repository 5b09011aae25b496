//! Type definitions for ozatten

pub mod attenuation;
pub mod error;
pub mod identity;
pub mod readout;

pub use attenuation::Attenuation;
pub use error::{Error, Result};
pub use identity::DeviceIdentity;
pub use readout::Readout;
