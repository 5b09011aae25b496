//! DD-series controller command definitions

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use ozatten_types::Attenuation;

use crate::error::{Error, Result};
use crate::model::DeviceModel;

/// Controller commands
///
/// Commands from the DD-100-MC / DD-600-MC operating manual. Commands the
/// driver has no typed wrapper for (I2C/SPI setup, insertion loss,
/// wavelength selection) go through [`Command::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// `A<n>`: set attenuation
    SetAttenuation(Attenuation),
    /// `A?`: get attenuation
    GetAttenuation,
    /// `B`: one step backward
    StepBackward,
    /// `F`: one step forward
    StepForward,
    /// `CD`: dump unit configuration
    Configuration,
    /// `D`: current attenuation and step position
    Display,
    /// `E0` / `E1`: RS-232 echo off / on
    Echo(bool),
    /// `H`: re-home the unit
    Home,
    /// `RES?`: previous command response
    LastResponse,
    /// `RST`: restart into self-test
    Reset,
    /// `S?`: current step position
    GetPosition,
    /// `S<n>`: absolute step position
    SetPosition(u32),
    /// `S+<n>`: move `n` steps forward
    StepsForward(u32),
    /// `S-<n>`: move `n` steps backward
    StepsBackward(u32),
    /// Any other command, sent verbatim
    Custom(String),
}

impl Command {
    /// Build a custom command after checking it can be sent on the line
    pub fn custom(text: impl Into<String>) -> Result<Self> {
        let text = text.into();

        if let Some(c) = text.chars().find(|c| matches!(c, '\r' | '\n')) {
            return Err(Error::InvalidCommand(format!(
                "{:?} contains line break {:?}",
                text, c
            )));
        }

        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(Error::InvalidCommand("empty command".into()));
        }
        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_graphic() && *c != ' ') {
            return Err(Error::InvalidCommand(format!(
                "{:?} contains non-printable character {:?}",
                trimmed, c
            )));
        }

        Ok(Self::Custom(trimmed.to_string()))
    }

    /// Command mnemonic as listed in the manual
    pub fn mnemonic(&self) -> &str {
        match self {
            Self::SetAttenuation(_) => "A",
            Self::GetAttenuation => "A?",
            Self::StepBackward => "B",
            Self::StepForward => "F",
            Self::Configuration => "CD",
            Self::Display => "D",
            Self::Echo(false) => "E0",
            Self::Echo(true) => "E1",
            Self::Home => "H",
            Self::LastResponse => "RES?",
            Self::Reset => "RST",
            Self::GetPosition => "S?",
            Self::SetPosition(_) => "S",
            Self::StepsForward(_) => "S+",
            Self::StepsBackward(_) => "S-",
            Self::Custom(text) => text.as_str(),
        }
    }

    /// Get command name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetAttenuation(_) => "SET_ATTENUATION",
            Self::GetAttenuation => "GET_ATTENUATION",
            Self::StepBackward => "STEP_BACKWARD",
            Self::StepForward => "STEP_FORWARD",
            Self::Configuration => "CONFIGURATION",
            Self::Display => "DISPLAY",
            Self::Echo(_) => "ECHO",
            Self::Home => "HOME",
            Self::LastResponse => "LAST_RESPONSE",
            Self::Reset => "RESET",
            Self::GetPosition => "GET_POSITION",
            Self::SetPosition(_) => "SET_POSITION",
            Self::StepsForward(_) => "STEPS_FORWARD",
            Self::StepsBackward(_) => "STEPS_BACKWARD",
            Self::Custom(_) => "CUSTOM",
        }
    }

    /// Command text without the line terminator
    pub fn encode(&self) -> String {
        match self {
            Self::SetAttenuation(value) => format!(
                "A{}.{:02}",
                value.centi_db() / 100,
                value.centi_db() % 100
            ),
            Self::SetPosition(steps) => format!("S{}", steps),
            Self::StepsForward(steps) => format!("S+{}", steps),
            Self::StepsBackward(steps) => format!("S-{}", steps),
            other => other.mnemonic().to_string(),
        }
    }

    /// Command line as sent to a given model
    pub fn to_bytes(&self, model: DeviceModel) -> Bytes {
        let text = self.encode();
        let terminator = model.spec().terminator;

        let mut buf = BytesMut::with_capacity(text.len() + terminator.len());
        buf.put_slice(text.as_bytes());
        buf.put_slice(terminator.as_bytes());
        buf.freeze()
    }

    /// Check if the command drives the motor
    ///
    /// Motion commands only report a status once the move has finished.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Self::SetAttenuation(_)
                | Self::StepBackward
                | Self::StepForward
                | Self::Home
                | Self::Reset
                | Self::SetPosition(_)
                | Self::StepsForward(_)
                | Self::StepsBackward(_)
        )
    }

    /// Check if the reply carries a value
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::GetAttenuation
                | Self::Configuration
                | Self::Display
                | Self::LastResponse
                | Self::GetPosition
        )
    }

    /// Check if the reply may quote an earlier `Error-<n>` as data
    ///
    /// `RES?` repeats the previous reply, so only a final `Done` ends it.
    pub fn quotes_status(&self) -> bool {
        matches!(self, Self::LastResponse)
    }
}

impl TryFrom<&str> for Command {
    type Error = Error;

    /// Parse a command line as a controller would read it
    ///
    /// Unknown mnemonics are rejected; use [`Command::custom`] to send them.
    fn try_from(line: &str) -> Result<Self> {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();

        let invalid = || Error::InvalidCommand(format!("unknown command {:?}", line));
        let steps = |digits: &str| digits.parse::<u32>().map_err(|_| invalid());

        let command = match upper.as_str() {
            "A?" => Self::GetAttenuation,
            "B" => Self::StepBackward,
            "F" => Self::StepForward,
            "CD" => Self::Configuration,
            "D" => Self::Display,
            "E0" => Self::Echo(false),
            "E1" => Self::Echo(true),
            "H" => Self::Home,
            "RES?" => Self::LastResponse,
            "RST" => Self::Reset,
            "S?" => Self::GetPosition,
            _ => {
                if let Some(rest) = upper.strip_prefix("S+") {
                    Self::StepsForward(steps(rest)?)
                } else if let Some(rest) = upper.strip_prefix("S-") {
                    Self::StepsBackward(steps(rest)?)
                } else if let Some(rest) = upper.strip_prefix('S') {
                    Self::SetPosition(steps(rest)?)
                } else if let Some(rest) = upper.strip_prefix('A') {
                    let value: Attenuation = rest.parse().map_err(|_| invalid())?;
                    Self::SetAttenuation(value)
                } else {
                    return Err(invalid());
                }
            }
        };

        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.encode())
    }
}
