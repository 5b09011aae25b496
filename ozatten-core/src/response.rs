//! Reply framing and parsing
//!
//! # Reply Structure
//!
//! ```text
//! A?\r\n            <- echoed command (only when echo is on)
//! Atten:12.50\r\n   <- zero or more data lines
//! Done\r\n          <- status line: "Done" or "Error-<n>"
//! ```
//!
//! Lines may end in CR, LF or both. Data lines carry `Label:value`
//! tokens separated by whitespace or commas.

use std::fmt;

use bytes::BytesMut;
use ozatten_types::{Attenuation, Readout};
use tracing::trace;

use crate::command::Command;
use crate::constants::{self, fields};
use crate::error::{Error, Result};

/// Error codes reported on an `Error-<n>` status line
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// `Error-2`: bad command, ignored
    BadCommand,
    /// `Error-5`: home sensor error
    HomeSensor,
    /// `Error-6`: overflow, command ignored
    Overflow,
    /// `Error-7`: motor voltage exceeds safe limits
    MotorVoltage,
    /// Any other code
    Unknown(u16),
}

impl DeviceErrorCode {
    /// Numeric code as printed by the device
    pub fn code(self) -> u16 {
        match self {
            Self::BadCommand => 2,
            Self::HomeSensor => 5,
            Self::Overflow => 6,
            Self::MotorVoltage => 7,
            Self::Unknown(code) => code,
        }
    }

    /// Description from the operating manual
    pub fn description(self) -> &'static str {
        match self {
            Self::BadCommand => "bad command, the command is ignored",
            Self::HomeSensor => "home sensor error, return unit to factory for repair",
            Self::Overflow => "overflow, the command is ignored",
            Self::MotorVoltage => "motor voltage exceeds safe limits",
            Self::Unknown(_) => "unknown error",
        }
    }

    /// Check if the unit reported a hardware fault rather than a rejected command
    pub fn is_hardware_fault(self) -> bool {
        matches!(self, Self::HomeSensor | Self::MotorVoltage)
    }
}

impl From<u16> for DeviceErrorCode {
    fn from(code: u16) -> Self {
        match code {
            2 => Self::BadCommand,
            5 => Self::HomeSensor,
            6 => Self::Overflow,
            7 => Self::MotorVoltage,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error-{} ({})", self.code(), self.description())
    }
}

/// Reply status line
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    Done,
    Error(DeviceErrorCode),
}

impl Status {
    /// Recognise a status line, `None` for data lines
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();

        if line.eq_ignore_ascii_case(constants::STATUS_DONE) {
            return Some(Self::Done);
        }

        if !has_prefix(line, constants::STATUS_ERROR_PREFIX) {
            return None;
        }

        let rest = &line[constants::STATUS_ERROR_PREFIX.len()..];
        if rest.is_empty() {
            return Some(Self::Error(DeviceErrorCode::Unknown(0)));
        }

        let digits = rest.strip_prefix('-')?;
        digits
            .parse::<u16>()
            .ok()
            .map(|code| Self::Error(code.into()))
    }

    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Accumulates received bytes until a full reply has arrived
#[derive(Debug)]
pub struct ReplyBuffer {
    buf: BytesMut,
    max_size: usize,
    /// Only `Done` ends a reply; `Error-<n>` lines are data
    done_only: bool,
}

impl ReplyBuffer {
    pub fn new() -> Self {
        Self::with_max_size(constants::MAX_REPLY_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            max_size,
            done_only: false,
        }
    }

    /// Buffer framing the reply to `command`
    pub fn for_command(command: &Command) -> Self {
        let mut buffer = Self::new();
        buffer.done_only = command.quotes_status();
        buffer
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Split off the first complete reply, if one has arrived
    ///
    /// A reply ends after the terminator of its status line. Bytes past
    /// that point stay buffered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReplyTooLarge`] once the buffer passes its limit
    /// without a status line, or when the completed reply is over the limit.
    pub fn next_reply(&mut self) -> Result<Option<BytesMut>> {
        let size = match self.reply_end() {
            Some(end) if end <= self.max_size => {
                trace!("Reply complete after {} bytes", end);
                return Ok(Some(self.buf.split_to(end)));
            }
            Some(end) => end,
            None if self.buf.len() > self.max_size => self.buf.len(),
            None => return Ok(None),
        };

        Err(Error::ReplyTooLarge {
            size,
            max: self.max_size,
        })
    }

    /// Offset just past the first complete status line
    fn reply_end(&self) -> Option<usize> {
        let mut line_start = 0;

        for (idx, byte) in self.buf.iter().enumerate() {
            if *byte != b'\r' && *byte != b'\n' {
                continue;
            }

            let line = &self.buf[line_start..idx];
            line_start = idx + 1;

            let is_status = match std::str::from_utf8(line).ok().and_then(Status::parse_line) {
                Some(Status::Done) => true,
                Some(Status::Error(_)) => !self.done_only,
                None => false,
            };

            if is_status {
                // Take the LF of a CR LF pair with the reply
                if *byte == b'\r' && self.buf.get(idx + 1) == Some(&b'\n') {
                    return Some(idx + 2);
                }
                return Some(idx + 1);
            }
        }

        None
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for ReplyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed controller reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Command text the reply answers
    pub command: String,

    /// Data lines, echo removed
    pub lines: Vec<String>,

    /// Status line
    pub status: Status,

    /// Whether the command was echoed back
    pub echoed: bool,
}

impl Response {
    /// Decode one complete reply to `sent`
    ///
    /// # Errors
    ///
    /// Returns an error if the reply is not text, has no status line, or
    /// carries data after its status line.
    pub fn decode(raw: &[u8], sent: &Command) -> Result<Self> {
        let command = sent.encode();
        let text = std::str::from_utf8(raw).map_err(|_| Error::NotUtf8)?;
        let quotes_status = sent.quotes_status();

        let mut lines: Vec<String> = Vec::new();
        let mut status = None;

        for line in text.split(['\r', '\n']).map(str::trim) {
            if line.is_empty() {
                continue;
            }

            if status.is_some() {
                return Err(Error::MalformedReply {
                    command,
                    reason: format!("data {:?} after status line", line),
                    reply: text.to_string(),
                });
            }

            match Status::parse_line(line) {
                Some(Status::Error(_)) if quotes_status => lines.push(line.to_string()),
                Some(parsed) => status = Some(parsed),
                None => lines.push(line.to_string()),
            }
        }

        let status = status.ok_or_else(|| Error::MalformedReply {
            command: command.clone(),
            reason: "no status line".into(),
            reply: text.to_string(),
        })?;

        let echoed = lines
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case(&command));
        if echoed {
            lines.remove(0);
        }

        Ok(Self {
            command,
            lines,
            status,
            echoed,
        })
    }

    /// Turn an error status into [`Error::Device`]
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Done => Ok(self),
            Status::Error(code) => Err(Error::Device {
                command: self.command,
                code,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_done()
    }

    /// Data lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// All `(label, value)` tokens of the data lines
    ///
    /// Unlabelled tokens come back with an empty label.
    pub fn fields(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();

        for line in &self.lines {
            let mut tokens = line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .peekable();

            while let Some(token) = tokens.next() {
                match token.split_once(':') {
                    // "Atten: 12.50" splits the value off into the next token
                    Some((label, "")) => {
                        if let Some(value) = tokens.next() {
                            out.push((label, value));
                        }
                    }
                    Some((label, value)) => out.push((label, value)),
                    None => out.push(("", token)),
                }
            }
        }

        out
    }

    /// Value of the first token whose label starts with `prefix`
    ///
    /// Falls back to a lone unlabelled token.
    pub fn field(&self, prefix: &str) -> Option<&str> {
        let fields = self.fields();

        let labelled = fields
            .iter()
            .find(|(label, _)| has_prefix(label, prefix))
            .map(|(_, value)| *value);

        labelled.or_else(|| match fields.as_slice() {
            [("", value)] => Some(*value),
            _ => None,
        })
    }

    /// Attenuation reported in the reply (`Atten:<dB>`)
    pub fn attenuation(&self) -> Result<Attenuation> {
        let value = self.require(fields::ATTENUATION, "attenuation")?;
        value.parse().map_err(|_| self.malformed(format!("bad attenuation {:?}", value)))
    }

    /// Step position reported in the reply (`Pos:<steps>`)
    pub fn position(&self) -> Result<u32> {
        let value = self.require(fields::POSITION, "position")?;
        self.parse_steps(value)
    }

    /// Step position, if the reply reports one
    ///
    /// Motion commands may or may not print the final position depending on
    /// firmware.
    pub fn optional_position(&self) -> Result<Option<u32>> {
        let tokens = self.fields();
        let value = tokens
            .iter()
            .find(|(label, _)| has_prefix(label, fields::POSITION));

        match value {
            Some((_, value)) => self.parse_steps(value).map(Some),
            None => Ok(None),
        }
    }

    /// Attenuation and position (`D` command)
    pub fn readout(&self) -> Result<Readout> {
        if !self.fields().iter().any(|(label, _)| !label.is_empty()) {
            return Err(self.malformed("expected labelled attenuation and position".into()));
        }
        Ok(Readout::new(self.attenuation()?, self.position()?))
    }

    fn require(&self, prefix: &str, field: &'static str) -> Result<&str> {
        self.field(prefix).ok_or_else(|| Error::MissingField {
            command: self.command.clone(),
            field,
            reply: self.text(),
        })
    }

    fn parse_steps(&self, value: &str) -> Result<u32> {
        if let Ok(steps) = value.parse::<u32>() {
            return Ok(steps);
        }

        // Some firmware prints positions as "1234.0"
        match value.parse::<f64>() {
            Ok(steps) if steps.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&steps) => {
                Ok(steps as u32)
            }
            _ => Err(self.malformed(format!("bad step position {:?}", value))),
        }
    }

    fn malformed(&self, reason: String) -> Error {
        Error::MalformedReply {
            command: self.command.clone(),
            reason,
            reply: self.text(),
        }
    }
}

/// Case-insensitive ASCII prefix check
fn has_prefix(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
