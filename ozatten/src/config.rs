//! Controller configuration

use std::time::Duration;

use ozatten_core::constants;
use ozatten_core::DeviceModel;

/// Controller settings
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ozatten::{ControllerConfig, DeviceModel};
///
/// let config = ControllerConfig::new(DeviceModel::Dd600Mc)
///     .with_command_timeout(Duration::from_secs(2))
///     .with_echo(false);
///
/// assert_eq!(config.model, DeviceModel::Dd600Mc);
/// assert_eq!(config.echo, Some(false));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Attenuator model behind the link
    pub model: DeviceModel,

    /// Time allowed for the TCP connect
    pub connect_timeout: Duration,

    /// Time allowed for a full reply to a query or setting
    pub command_timeout: Duration,

    /// Time allowed for a full reply to a motor move, home or restart
    pub motion_timeout: Duration,

    /// Echo mode to set right after connecting (`None` leaves it alone)
    pub echo: Option<bool>,

    /// Discard pending input (terminal server banners, stale replies) on connect
    pub drain_on_connect: bool,
}

impl ControllerConfig {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set reply timeout for queries and settings
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set reply timeout for motor moves
    pub fn with_motion_timeout(mut self, timeout: Duration) -> Self {
        self.motion_timeout = timeout;
        self
    }

    /// Set echo mode applied on connect
    pub fn with_echo(mut self, enabled: bool) -> Self {
        self.echo = Some(enabled);
        self
    }

    pub fn with_drain_on_connect(mut self, drain: bool) -> Self {
        self.drain_on_connect = drain;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            model: DeviceModel::default(),
            connect_timeout: Duration::from_secs(constants::DEFAULT_CONNECT_TIMEOUT),
            command_timeout: Duration::from_secs(constants::DEFAULT_COMMAND_TIMEOUT),
            motion_timeout: Duration::from_secs(constants::DEFAULT_MOTION_TIMEOUT),
            echo: None,
            drain_on_connect: true,
        }
    }
}
