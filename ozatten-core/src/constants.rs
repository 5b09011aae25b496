//! Protocol constants

/// Line terminator appended to every command
pub const TERMINATOR: &str = "\r\n";

/// Status line reported when a command completed
pub const STATUS_DONE: &str = "Done";

/// Prefix of the status line reported when a command failed
pub const STATUS_ERROR_PREFIX: &str = "Error";

/// Default connection timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5;

/// Default timeout for query and configuration commands (seconds)
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 5;

/// Default timeout for commands that move the motor (seconds)
///
/// Homing and restart run a full sweep and can take several seconds.
pub const DEFAULT_MOTION_TIMEOUT: u64 = 15;

/// Largest reply accepted before a status line must appear
pub const MAX_REPLY_SIZE: usize = 4096;

/// Serial line settings of the DD-series controllers (9600 8N1)
pub mod serial {
    pub const BAUD_RATE: u32 = 9600;
}

/// Reply field labels
pub mod fields {
    /// Attenuation value label (`Atten:12.50`)
    pub const ATTENUATION: &str = "atten";

    /// Step position label (`Pos:1234`)
    pub const POSITION: &str = "pos";
}
