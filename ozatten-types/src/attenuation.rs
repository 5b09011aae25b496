//! Attenuation values

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Optical attenuation in dB, held in hundredths of a dB.
///
/// The DD-series controllers accept and report two digits after the
/// decimal point, so a value is stored exactly at that precision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Attenuation {
    centi_db: u32,
}

impl Attenuation {
    /// Zero attenuation
    pub const ZERO: Self = Self { centi_db: 0 };

    /// Build from a dB value, rounding to the nearest 0.01 dB
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for NaN, infinite or negative values.
    pub fn from_db(db: f64) -> Result<Self> {
        if !db.is_finite() {
            return Err(Error::Validation(format!("attenuation {} is not finite", db)));
        }

        let centi = (db * 100.0).round();
        if centi < 0.0 {
            return Err(Error::Validation(format!("attenuation {} dB is negative", db)));
        }
        if centi > u32::MAX as f64 {
            return Err(Error::Validation(format!("attenuation {} dB is too large", db)));
        }

        Ok(Self { centi_db: centi as u32 })
    }

    /// Build from hundredths of a dB
    pub const fn from_centi_db(centi_db: u32) -> Self {
        Self { centi_db }
    }

    /// Value in dB
    pub fn db(self) -> f64 {
        f64::from(self.centi_db) / 100.0
    }

    /// Value in hundredths of a dB
    pub const fn centi_db(self) -> u32 {
        self.centi_db
    }
}

impl fmt::Display for Attenuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} dB", self.centi_db / 100, self.centi_db % 100)
    }
}

impl FromStr for Attenuation {
    type Err = Error;

    /// Parse a plain decimal dB value such as `12.5` or `+3.25`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_suffix("dB")
            .or_else(|| trimmed.strip_suffix("DB"))
            .unwrap_or(trimmed)
            .trim_end();

        let db: f64 = trimmed
            .parse()
            .map_err(|_| Error::Parse(format!("'{}' is not a dB value", s)))?;

        Self::from_db(db)
    }
}
