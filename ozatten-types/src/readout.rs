//! Combined attenuation/position readout

use std::fmt;

use crate::attenuation::Attenuation;

/// Current attenuation and motor step position (`D` command)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readout {
    /// Attenuation reported by the unit
    pub attenuation: Attenuation,

    /// Motor steps from the home position
    pub position: u32,
}

impl Readout {
    pub fn new(attenuation: Attenuation, position: u32) -> Self {
        Self {
            attenuation,
            position,
        }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ step {}", self.attenuation, self.position)
    }
}
