//! High-level controller interface

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use ozatten_core::{Command, DeviceModel, ReplyBuffer, Response, Session, Status};
use ozatten_transport::{TcpTransport, Transport};
use ozatten_types::{Attenuation, DeviceIdentity, Readout};

use crate::config::ControllerConfig;
use crate::error::{Error, Result};

/// OZ Optics DD-series attenuator controller
///
/// High-level interface for one attenuator behind a terminal server. One
/// command is in flight at a time: each call sends its command and waits
/// for the status line before returning.
///
/// Dropping a connected controller closes the socket.
///
/// # Examples
///
/// ```no_run
/// use ozatten::{Controller, ControllerConfig, DeviceModel};
///
/// #[tokio::main]
/// async fn main() -> ozatten::Result<()> {
///     let config = ControllerConfig::new(DeviceModel::Dd600Mc).with_echo(false);
///     let mut controller = Controller::from_config("192.168.1.50", 10001, config);
///
///     controller.connect().await?;
///     println!("Connected to {}", controller.identity().await?);
///
///     controller.set_attenuation(3.0).await?;
///     println!("Readout: {}", controller.readout().await?);
///
///     controller.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Controller {
    transport: Box<dyn Transport>,
    session: Session,
    config: ControllerConfig,
    /// A reply may still be on its way from an earlier command
    stale_input: bool,
}

impl Controller {
    /// Create a new controller for a DD-100-MC behind `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(host, port, ControllerConfig::default())
    }

    /// Create a new controller with explicit settings
    pub fn from_config(host: impl Into<String>, port: u16, config: ControllerConfig) -> Self {
        let transport = TcpTransport::new(host, port).with_connect_timeout(config.connect_timeout);
        Self::with_transport(Box::new(transport), config)
    }

    /// Create a new controller on a local serial port
    #[cfg(feature = "serial")]
    pub fn serial(path: impl Into<String>, config: ControllerConfig) -> Self {
        let transport = ozatten_transport::SerialTransport::new(path)
            .with_baud_rate(config.model.spec().baud_rate);
        Self::with_transport(Box::new(transport), config)
    }

    /// Create a new controller over any transport
    pub fn with_transport(transport: Box<dyn Transport>, config: ControllerConfig) -> Self {
        Self {
            transport,
            session: Session::new(),
            config,
            stale_input: false,
        }
    }

    /// Set device model
    pub fn with_model(mut self, model: DeviceModel) -> Self {
        self.config.model = model;
        self
    }

    /// Set reply timeout for queries and settings
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set reply timeout for motor moves
    pub fn with_motion_timeout(mut self, timeout: Duration) -> Self {
        self.config.motion_timeout = timeout;
        self
    }

    pub fn model(&self) -> DeviceModel {
        self.config.model
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Shared view of the session state
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected() && self.transport.is_connected()
    }

    pub fn remote_addr(&self) -> String {
        self.transport.remote_addr()
    }

    /// Last attenuation set or read on this connection
    pub fn cached_attenuation(&self) -> Option<Attenuation> {
        self.session.attenuation()
    }

    /// Last step position set or read on this connection
    pub fn cached_position(&self) -> Option<u32> {
        self.session.position()
    }

    /// Connect to the controller
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The host cannot be resolved or reached
    /// - The connection times out
    /// - The configured echo mode is rejected
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to {} ({})...", self.transport.remote_addr(), self.config.model);

        self.transport.connect().await?;

        if self.config.drain_on_connect {
            if let Err(e) = self.transport.drain().await {
                let _ = self.transport.disconnect().await;
                return Err(e.into());
            }
        }

        self.session.close();
        self.session.open()?;
        self.stale_input = false;

        if let Some(echo) = self.config.echo {
            if let Err(e) = self.set_echo(echo).await {
                warn!("Failed to set echo mode: {}", e);
                self.disconnect().await?;
                return Err(e);
            }
        }

        info!("Connected to {}", self.transport.remote_addr());
        Ok(())
    }

    /// Disconnect from the controller
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            self.session.close();
            return Ok(());
        }

        info!("Disconnecting from {}...", self.transport.remote_addr());

        self.transport.disconnect().await?;
        self.session.close();

        info!("Disconnected");
        Ok(())
    }

    /// Get device identity (`CD` configuration dump)
    pub async fn identity(&mut self) -> Result<DeviceIdentity> {
        debug!("Getting device identity...");

        let response = self.execute(&Command::Configuration).await?;
        let identity = DeviceIdentity::from_lines(&response.lines);

        if identity.is_empty() {
            return Err(ozatten_core::Error::MissingField {
                command: response.command,
                field: "configuration",
                reply: String::new(),
            }
            .into());
        }

        debug!("Device identity: {}", identity);
        Ok(identity)
    }

    /// Query current attenuation
    pub async fn attenuation(&mut self) -> Result<Attenuation> {
        let response = self.execute(&Command::GetAttenuation).await?;
        let value = response.attenuation()?;

        self.session.record_attenuation(value);
        debug!("Attenuation: {}", value);

        Ok(value)
    }

    /// Set attenuation in dB
    ///
    /// The value is rounded to 0.01 dB. Values outside the model's range
    /// are rejected before anything is sent.
    pub async fn set_attenuation(&mut self, db: f64) -> Result<Attenuation> {
        let value = self.config.model.validate_attenuation(db)?;

        debug!("Setting attenuation to {}...", value);

        let response = self.execute(&Command::SetAttenuation(value)).await?;

        self.session.record_attenuation(value);
        if let Some(position) = response.optional_position()? {
            self.session.record_position(position);
        }

        Ok(value)
    }

    /// Query attenuation and step position together
    pub async fn readout(&mut self) -> Result<Readout> {
        let response = self.execute(&Command::Display).await?;
        let readout = response.readout()?;

        self.session.record_attenuation(readout.attenuation);
        self.session.record_position(readout.position);
        debug!("Readout: {}", readout);

        Ok(readout)
    }

    /// Query step position
    pub async fn position(&mut self) -> Result<u32> {
        let response = self.execute(&Command::GetPosition).await?;
        let position = response.position()?;

        self.session.record_position(position);
        Ok(position)
    }

    /// Move to an absolute step position
    pub async fn set_position(&mut self, steps: u32) -> Result<u32> {
        let response = self.execute(&Command::SetPosition(steps)).await?;
        let position = response.optional_position()?.unwrap_or(steps);

        self.session.record_position(position);
        Ok(position)
    }

    /// Move by a signed number of steps (`S+<n>` / `S-<n>`)
    ///
    /// Returns the new position when the device reports it or the old one
    /// was known.
    pub async fn move_steps(&mut self, delta: i32) -> Result<Option<u32>> {
        let command = match delta {
            0 => {
                self.ensure_connected()?;
                return Ok(self.session.position());
            }
            d if d > 0 => Command::StepsForward(d.unsigned_abs()),
            d => Command::StepsBackward(d.unsigned_abs()),
        };

        self.relative_move(&command, i64::from(delta)).await
    }

    /// Move one step forward
    pub async fn step_forward(&mut self) -> Result<Option<u32>> {
        self.relative_move(&Command::StepForward, 1).await
    }

    /// Move one step backward
    pub async fn step_backward(&mut self) -> Result<Option<u32>> {
        self.relative_move(&Command::StepBackward, -1).await
    }

    /// Re-home the unit
    pub async fn home(&mut self) -> Result<()> {
        info!("Homing {}...", self.config.model);

        self.execute(&Command::Home).await?;

        self.session.invalidate();
        self.session.record_position(0);

        info!("Homed");
        Ok(())
    }

    /// Restart the unit into self-test
    ///
    /// Reapplies the configured echo mode once the unit is back.
    pub async fn reset(&mut self) -> Result<()> {
        warn!("Restarting {}...", self.config.model);

        let response = self.execute(&Command::Reset).await?;
        for line in &response.lines {
            debug!("Self-test: {}", line);
        }

        self.session.invalidate();
        self.session.set_echo(false);

        if let Some(echo) = self.config.echo {
            self.set_echo(echo).await?;
        }

        Ok(())
    }

    /// Turn RS-232 echo on or off
    pub async fn set_echo(&mut self, enabled: bool) -> Result<()> {
        self.execute(&Command::Echo(enabled)).await?;
        self.session.set_echo(enabled);

        debug!("Echo {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    /// Reply text of the previous command (`RES?`)
    pub async fn last_response(&mut self) -> Result<String> {
        let response = self.execute(&Command::LastResponse).await?;
        Ok(response.text())
    }

    /// Send a command verbatim and return the parsed reply
    ///
    /// For commands without a typed wrapper, such as `W<n>` or `L<n>`.
    pub async fn send_raw(&mut self, text: &str) -> Result<Response> {
        let command = Command::custom(text)?;
        self.execute(&command).await
    }

    // Helper methods

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    async fn relative_move(&mut self, command: &Command, delta: i64) -> Result<Option<u32>> {
        let response = self.execute(command).await?;

        match response.optional_position()? {
            Some(position) => self.session.record_position(position),
            None => self.session.shift_position(delta),
        }

        Ok(self.session.position())
    }

    /// Close the session after the link went away under a command
    async fn drop_link(&mut self, error: &Error) {
        warn!("Link to {} lost: {}", self.transport.remote_addr(), error);
        self.session.close();
        self.stale_input = false;
        let _ = self.transport.disconnect().await;
    }

    /// Run one command/reply cycle
    async fn execute(&mut self, command: &Command) -> Result<Response> {
        self.ensure_connected()?;

        if self.stale_input {
            self.stale_input = false;
            if let Err(e) = self.transport.drain().await {
                let e = Error::from(e);
                if e.requires_reconnect() {
                    self.drop_link(&e).await;
                } else {
                    self.stale_input = true;
                }
                return Err(e);
            }
        }

        let seq = self.session.next_sequence();
        let timeout = if command.is_motion() {
            self.config.motion_timeout
        } else {
            self.config.command_timeout
        };

        debug!("#{} -> {}", seq, command);

        let result = self.transact(command, timeout).await;

        if let Err(e) = &result {
            if e.requires_reconnect() {
                self.drop_link(e).await;
            } else if matches!(e, Error::Transport(_)) {
                // The reply may still arrive; drop it before the next command
                self.stale_input = true;
            }
        }

        let response = result?;

        debug!("#{} <- {:?} {:?}", seq, response.status, response.lines);

        if let Status::Error(code) = response.status {
            warn!("{} rejected: {}", command, code);
        }

        Ok(response.into_result()?)
    }

    async fn transact(&mut self, command: &Command, timeout: Duration) -> Result<Response> {
        let data = command.to_bytes(self.config.model);
        self.transport.send(&data).await?;

        let deadline = Instant::now() + timeout;
        let mut buffer = ReplyBuffer::for_command(command);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ozatten_transport::Error::ReadTimeout.into());
            }

            let chunk = self.transport.receive(remaining).await?;
            buffer.extend(&chunk);

            let reply = match buffer.next_reply() {
                Ok(reply) => reply,
                Err(e) => {
                    // The rest of the runaway reply is still on the line
                    self.stale_input = true;
                    return Err(e.into());
                }
            };

            if let Some(raw) = reply {
                if !buffer.is_empty() {
                    trace!("{} bytes after reply", buffer.len());
                    self.stale_input = true;
                }
                return Ok(Response::decode(&raw, command)?);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use ozatten_core::DeviceErrorCode;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// How the fake attenuator misbehaves
    #[derive(Debug, Default, Clone, Copy)]
    struct Behavior {
        /// Greet with a terminal-server banner
        banner: bool,
        /// Answer `A?` with a value that is not a number
        garbage: bool,
        /// Write replies one byte at a time
        split: bool,
        /// Never answer
        mute: bool,
        /// Answer the first `A?` with an endless line before the real reply
        runaway: bool,
    }

    /// In-process DD-100-MC answering on a loopback port
    struct FakeAttenuator {
        port: u16,
        received: Arc<Mutex<Vec<String>>>,
        handle: JoinHandle<()>,
    }

    #[derive(Default)]
    struct FakeState {
        centi_db: u32,
        position: u32,
        echo: bool,
        last: String,
        ran_away: bool,
    }

    impl FakeState {
        fn reply(&mut self, line: &str, behavior: Behavior) -> String {
            let body = match Command::try_from(line) {
                Ok(Command::SetAttenuation(value)) if value.centi_db() > 6000 => {
                    "Error-6\r\n".to_string()
                }
                Ok(Command::SetAttenuation(value)) => {
                    self.centi_db = value.centi_db();
                    self.position = value.centi_db() * 10;
                    format!("Pos:{}\r\nDone\r\n", self.position)
                }
                Ok(Command::GetAttenuation) if behavior.garbage => "Atten:#?!\r\nDone\r\n".into(),
                Ok(Command::GetAttenuation) if behavior.runaway && !self.ran_away => {
                    self.ran_away = true;
                    format!("{}\r\nAtten:42.00\r\nDone\r\n", "x".repeat(5000))
                }
                Ok(Command::GetAttenuation) => format!("Atten:{}\r\nDone\r\n", self.atten()),
                Ok(Command::Display) => {
                    format!("Atten:{} Pos:{}\r\nDone\r\n", self.atten(), self.position)
                }
                Ok(Command::GetPosition) => format!("Pos:{}\r\nDone\r\n", self.position),
                Ok(Command::SetPosition(steps)) => {
                    self.position = steps;
                    "Done\r\n".into()
                }
                Ok(Command::StepsForward(steps)) => {
                    self.position += steps;
                    "Done\r\n".into()
                }
                Ok(Command::StepsBackward(steps)) if steps > self.position => "Error-6\r\n".into(),
                Ok(Command::StepsBackward(steps)) => {
                    self.position -= steps;
                    format!("Pos:{}\r\nDone\r\n", self.position)
                }
                Ok(Command::StepForward) => {
                    self.position += 1;
                    "Done\r\n".into()
                }
                Ok(Command::StepBackward) => {
                    self.position = self.position.saturating_sub(1);
                    "Done\r\n".into()
                }
                Ok(Command::Home) => {
                    self.position = 0;
                    self.centi_db = 0;
                    "Done\r\n".into()
                }
                Ok(Command::Reset) => {
                    self.echo = false;
                    "Self test OK\r\nDone\r\n".into()
                }
                Ok(Command::Echo(enabled)) => {
                    self.echo = enabled;
                    "Done\r\n".into()
                }
                Ok(Command::Configuration) => {
                    "Model: DD-100-MC\r\nSerial Number: 4242\r\nFirmware Version: 1.07\r\nDone\r\n"
                        .into()
                }
                Ok(Command::LastResponse) => format!("{}\r\nDone\r\n", self.last),
                Ok(Command::Custom(_)) | Err(_) => "Error-2\r\n".into(),
            };

            if let Some(data) = body.lines().next().filter(|l| !l.starts_with("Done")) {
                self.last = data.to_string();
            }

            if self.echo {
                format!("{}\r\n{}", line, body)
            } else {
                body
            }
        }

        fn atten(&self) -> String {
            format!("{}.{:02}", self.centi_db / 100, self.centi_db % 100)
        }
    }

    async fn spawn_fake(behavior: Behavior) -> FakeAttenuator {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = socket.into_split();
            let mut reader = BufReader::new(reader);
            let mut state = FakeState::default();

            if behavior.banner {
                writer.write_all(b"Welcome to port 1\r\n").await.unwrap();
            }

            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }

                let command = line.trim().to_string();
                log.lock().unwrap().push(command.clone());

                if behavior.mute {
                    continue;
                }

                let reply = state.reply(&command, behavior);
                if behavior.split {
                    for byte in reply.as_bytes() {
                        if writer.write_all(&[*byte]).await.is_err() {
                            return;
                        }
                        let _ = writer.flush().await;
                    }
                } else if writer.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
            }
        });

        FakeAttenuator {
            port,
            received,
            handle,
        }
    }

    fn test_config() -> ControllerConfig {
        ControllerConfig::default()
            .with_command_timeout(Duration::from_secs(2))
            .with_motion_timeout(Duration::from_secs(2))
    }

    async fn connected(behavior: Behavior, config: ControllerConfig) -> (Controller, FakeAttenuator) {
        let fake = spawn_fake(behavior).await;
        let mut controller = Controller::from_config("127.0.0.1", fake.port, config);
        controller.connect().await.unwrap();
        (controller, fake)
    }

    async fn finish(mut controller: Controller, fake: FakeAttenuator) -> Vec<String> {
        controller.disconnect().await.unwrap();
        fake.handle.await.unwrap();
        let received = fake.received.lock().unwrap().clone();
        received
    }

    #[test]
    fn test_controller_create() {
        let controller = Controller::new("192.168.1.50", 10001).with_model(DeviceModel::Dd600Mc);
        assert!(!controller.is_connected());
        assert_eq!(controller.model(), DeviceModel::Dd600Mc);
        assert_eq!(controller.remote_addr(), "192.168.1.50:10001");
    }

    #[tokio::test]
    async fn test_set_then_query_attenuation() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        let set = controller.set_attenuation(12.5).await.unwrap();
        let read = controller.attenuation().await.unwrap();

        assert_eq!(set, read);
        assert!((read.db() - 12.5).abs() < 0.01);
        assert_eq!(controller.cached_attenuation(), Some(read));
        assert_eq!(controller.cached_position(), Some(12500));

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["A12.50", "A?"]);
    }

    #[tokio::test]
    async fn test_out_of_range_is_rejected_before_sending() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        for bad in [60.5, -1.0, f64::NAN] {
            let err = controller.set_attenuation(bad).await.unwrap_err();
            assert!(err.is_protocol_error(), "{}", err);
            assert!(matches!(&err, Error::Protocol(inner) if inner.is_rejected_argument()));
        }

        // Still usable afterwards
        controller.attenuation().await.unwrap();

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["A?"]);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let behavior = Behavior {
            garbage: true,
            ..Behavior::default()
        };
        let (mut controller, fake) = connected(behavior, test_config()).await;

        let err = controller.attenuation().await.unwrap_err();
        assert!(err.is_protocol_error());
        assert!(matches!(
            err,
            Error::Protocol(ozatten_core::Error::MalformedReply { .. })
        ));
        assert_eq!(controller.cached_attenuation(), None);

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_connect_refused_fails_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = test_config().with_connect_timeout(Duration::from_secs(2));
        let mut controller = Controller::from_config("127.0.0.1", port, config);

        let started = std::time::Instant::now();
        let err = controller.connect().await.unwrap_err();

        assert!(err.is_connection_error());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut controller = Controller::new("127.0.0.1", 1);

        assert!(matches!(controller.attenuation().await, Err(Error::NotConnected)));
        assert!(matches!(controller.move_steps(0).await, Err(Error::NotConnected)));
        assert!(matches!(controller.home().await, Err(Error::NotConnected)));

        // Disconnecting an idle controller is a no-op
        controller.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_echo_is_stripped() {
        let (mut controller, fake) = connected(Behavior::default(), test_config().with_echo(true)).await;

        assert!(controller.session().echo());
        controller.set_attenuation(7.25).await.unwrap();
        let readout = controller.readout().await.unwrap();
        assert_eq!(readout, Readout::new(Attenuation::from_centi_db(725), 7250));

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["E1", "A7.25", "D"]);
    }

    #[tokio::test]
    async fn test_banner_is_drained_on_connect() {
        let behavior = Behavior {
            banner: true,
            ..Behavior::default()
        };
        let (mut controller, fake) = connected(behavior, test_config()).await;

        let identity = controller.identity().await.unwrap();
        assert_eq!(identity.model(), Some("DD-100-MC"));
        assert_eq!(identity.serial_number(), Some("4242"));
        assert_eq!(identity.firmware_version(), Some("1.07"));

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_split_replies_are_reassembled() {
        let behavior = Behavior {
            split: true,
            ..Behavior::default()
        };
        let (mut controller, fake) = connected(behavior, test_config()).await;

        controller.set_attenuation(33.33).await.unwrap();
        let readout = controller.readout().await.unwrap();
        assert_eq!(readout.attenuation.centi_db(), 3333);
        assert_eq!(readout.position, 33330);

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_device_error_status() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        let err = controller.move_steps(-5).await.unwrap_err();
        assert_eq!(err.device_code(), Some(DeviceErrorCode::Overflow));

        // The quoted error status is data, not a failure of RES? itself
        assert_eq!(controller.last_response().await.unwrap(), "Error-6");

        let err = controller.send_raw("W1550").await.unwrap_err();
        assert_eq!(err.device_code(), Some(DeviceErrorCode::BadCommand));

        // Link survives device errors
        assert!(controller.is_connected());

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_step_position_tracking() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        assert_eq!(controller.set_position(100).await.unwrap(), 100);
        assert_eq!(controller.move_steps(10).await.unwrap(), Some(110));
        assert_eq!(controller.move_steps(-20).await.unwrap(), Some(90));
        assert_eq!(controller.step_forward().await.unwrap(), Some(91));
        assert_eq!(controller.step_backward().await.unwrap(), Some(90));
        assert_eq!(controller.move_steps(0).await.unwrap(), Some(90));
        assert_eq!(controller.position().await.unwrap(), 90);

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["S100", "S+10", "S-20", "F", "B", "S?"]);
    }

    #[tokio::test]
    async fn test_home_and_reset() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        controller.set_attenuation(20.0).await.unwrap();
        controller.home().await.unwrap();
        assert_eq!(controller.cached_attenuation(), None);
        assert_eq!(controller.cached_position(), Some(0));

        controller.reset().await.unwrap();
        assert_eq!(controller.cached_position(), None);
        assert_eq!(controller.attenuation().await.unwrap(), Attenuation::ZERO);

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_last_response_and_raw() {
        let (mut controller, fake) = connected(Behavior::default(), test_config()).await;

        controller.set_attenuation(1.5).await.unwrap();
        assert_eq!(controller.last_response().await.unwrap(), "Pos:1500");

        let response = controller.send_raw(" S? ").await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.position().unwrap(), 1500);

        let err = controller.send_raw("A1\r\nH").await.unwrap_err();
        assert!(err.is_protocol_error());

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["A1.50", "RES?", "S?"]);
    }

    #[tokio::test]
    async fn test_reply_timeout_is_connection_error() {
        let behavior = Behavior {
            mute: true,
            ..Behavior::default()
        };
        let config = test_config().with_command_timeout(Duration::from_millis(100));
        let (mut controller, fake) = connected(behavior, config).await;

        let err = controller.attenuation().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(matches!(
            err,
            Error::Transport(ozatten_transport::Error::ReadTimeout)
        ));
        // A timeout leaves the link up
        assert!(controller.is_connected());

        finish(controller, fake).await;
    }

    #[tokio::test]
    async fn test_closed_link_requires_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let config = test_config().with_drain_on_connect(false);
        let mut controller = Controller::from_config("127.0.0.1", port, config);
        controller.connect().await.unwrap();
        server.await.unwrap();

        let err = controller.attenuation().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!controller.is_connected());
        assert!(matches!(controller.position().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_oversized_reply_is_not_read_by_next_command() {
        let behavior = Behavior {
            runaway: true,
            ..Behavior::default()
        };
        let (mut controller, fake) = connected(behavior, test_config()).await;

        controller.set_attenuation(1.0).await.unwrap();

        let err = controller.attenuation().await.unwrap_err();
        assert!(err.is_protocol_error());
        assert!(matches!(
            err,
            Error::Protocol(ozatten_core::Error::ReplyTooLarge { .. })
        ));
        assert!(controller.is_connected());

        // The tail of the oversized reply must not answer this query
        let read = controller.attenuation().await.unwrap();
        assert_eq!(read, Attenuation::from_centi_db(100));

        let received = finish(controller, fake).await;
        assert_eq!(received, vec!["A1.00", "A?", "A?"]);
    }

    #[tokio::test]
    async fn test_hangup_after_timeout_requires_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            // Outlast the reply timeout, then hang up without answering
            tokio::time::sleep(Duration::from_millis(300)).await;
        });

        let config = test_config()
            .with_drain_on_connect(false)
            .with_command_timeout(Duration::from_millis(100));
        let mut controller = Controller::from_config("127.0.0.1", port, config);
        controller.connect().await.unwrap();

        let err = controller.attenuation().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(ozatten_transport::Error::ReadTimeout)
        ));
        assert!(controller.is_connected());

        server.await.unwrap();

        let err = controller.attenuation().await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!controller.is_connected());
        assert!(matches!(controller.position().await, Err(Error::NotConnected)));
    }
}
