//! Supported attenuator models
//!
//! Each model is a row in a static table rather than its own type: the
//! command set is shared and only the limits differ.

use std::fmt;
use std::str::FromStr;

use ozatten_types::Attenuation;

use crate::constants;
use crate::error::{Error, Result};

/// Per-model command syntax and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    /// Catalogue name
    pub name: &'static str,

    /// Lowest settable attenuation
    pub min: Attenuation,

    /// Highest settable attenuation
    pub max: Attenuation,

    /// Line terminator expected by the controller
    pub terminator: &'static str,

    /// Serial baud rate behind the terminal server
    pub baud_rate: u32,
}

const DD_100_MC: ModelSpec = ModelSpec {
    name: "DD-100-MC",
    min: Attenuation::ZERO,
    max: Attenuation::from_centi_db(6000),
    terminator: constants::TERMINATOR,
    baud_rate: constants::serial::BAUD_RATE,
};

const DD_600_MC: ModelSpec = ModelSpec {
    name: "DD-600-MC",
    min: Attenuation::ZERO,
    max: Attenuation::from_centi_db(6000),
    terminator: constants::TERMINATOR,
    baud_rate: constants::serial::BAUD_RATE,
};

/// OZ Optics DD-series controller models
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceModel {
    #[default]
    Dd100Mc,
    Dd600Mc,
}

impl DeviceModel {
    /// All supported models
    pub const ALL: [DeviceModel; 2] = [Self::Dd100Mc, Self::Dd600Mc];

    /// Model table entry
    pub fn spec(self) -> &'static ModelSpec {
        match self {
            Self::Dd100Mc => &DD_100_MC,
            Self::Dd600Mc => &DD_600_MC,
        }
    }

    /// Catalogue name
    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Settable attenuation range (inclusive)
    pub fn range(self) -> (Attenuation, Attenuation) {
        let spec = self.spec();
        (spec.min, spec.max)
    }

    /// Check a requested attenuation against this model's range
    ///
    /// The value is rounded to the 0.01 dB resolution before the check.
    pub fn validate_attenuation(self, db: f64) -> Result<Attenuation> {
        let (min, max) = self.range();

        let out_of_range = || Error::AttenuationOutOfRange {
            value: db,
            model: self,
            min,
            max,
        };

        // Below zero after rounding; -0.004 still lands on 0.00
        if db.is_finite() && (db * 100.0).round() < 0.0 {
            return Err(out_of_range());
        }

        let value = Attenuation::from_db(db)?;
        if value < min || value > max {
            return Err(out_of_range());
        }

        Ok(value)
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceModel {
    type Err = Error;

    /// Accepts `DD-100-MC`, `dd100mc`, `DD_600_MC` and similar spellings
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match normalized.as_str() {
            "DD100MC" => Ok(Self::Dd100Mc),
            "DD600MC" => Ok(Self::Dd600Mc),
            _ => Err(Error::UnknownModel(s.to_string())),
        }
    }
}
