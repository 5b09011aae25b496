//! Device identity structures

use std::fmt;

/// Unit configuration as reported by the `CD` command
///
/// The controller prints its configuration as `Key: Value` lines. Entries
/// keep their original order and spelling; the accessors look up the
/// common fields by keyword.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceIdentity {
    /// Parsed `Key: Value` entries, in reply order
    pub entries: Vec<(String, String)>,

    /// Lines that did not carry a key/value pair
    pub notes: Vec<String>,
}

impl DeviceIdentity {
    /// Build from the data lines of a configuration reply
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut identity = Self::default();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            match line.split_once(':').or_else(|| line.split_once('=')) {
                Some((key, value)) if !key.trim().is_empty() => {
                    identity
                        .entries
                        .push((key.trim().to_string(), value.trim().to_string()));
                }
                _ => identity.notes.push(line.to_string()),
            }
        }

        identity
    }

    /// Look up an entry whose key contains `keyword` (case-insensitive)
    pub fn get(&self, keyword: &str) -> Option<&str> {
        let keyword = keyword.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase().contains(&keyword))
            .map(|(_, value)| value.as_str())
    }

    /// Device model
    pub fn model(&self) -> Option<&str> {
        self.get("model").or_else(|| self.get("part"))
    }

    /// Device serial number
    pub fn serial_number(&self) -> Option<&str> {
        self.get("serial").or_else(|| self.get("s/n"))
    }

    /// Firmware version
    pub fn firmware_version(&self) -> Option<&str> {
        self.get("firmware").or_else(|| self.get("version"))
    }

    /// Calibration wavelength in nm
    pub fn wavelength_nm(&self) -> Option<f64> {
        let value = self.get("wavelength")?;
        let digits: String = value
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        digits.parse().ok()
    }

    /// True when the reply carried nothing at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.notes.is_empty()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device[Model: {}, SN: {}, FW: {}]",
            self.model().unwrap_or("?"),
            self.serial_number().unwrap_or("?"),
            self.firmware_version().unwrap_or("?")
        )
    }
}
