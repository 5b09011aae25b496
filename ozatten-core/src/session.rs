//! Session state for one controller link
//!
//! A session tracks:
//! - Link state (connected or not)
//! - Echo mode
//! - Last known attenuation and step position
//! - Command counter (for log correlation)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ozatten_types::Attenuation;

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected
    Disconnected,

    /// Connected and ready for commands
    Connected,
}

/// Session manager
///
/// Thread-safe and can be cloned cheaply (Arc internally), so a clone can
/// be handed out as a read-only status view.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    state: parking_lot::RwLock<SessionState>,

    /// Echo mode as last set through this session
    echo: AtomicBool,

    /// Commands sent since the session opened
    sequence: AtomicU64,

    attenuation: parking_lot::RwLock<Option<Attenuation>>,
    position: parking_lot::RwLock<Option<u32>>,
}

impl Session {
    /// Create a new disconnected session
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: parking_lot::RwLock::new(SessionState::Disconnected),
                echo: AtomicBool::new(false),
                sequence: AtomicU64::new(0),
                attenuation: parking_lot::RwLock::new(None),
                position: parking_lot::RwLock::new(None),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self.state(), SessionState::Connected)
    }

    /// Mark the link as open
    pub fn open(&self) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != SessionState::Disconnected {
            return Err(Error::InvalidSessionState(format!(
                "Cannot open from state: {:?}",
                *state
            )));
        }

        self.inner.sequence.store(0, Ordering::Release);
        *state = SessionState::Connected;

        Ok(())
    }

    /// Close session and forget cached readings
    pub fn close(&self) {
        *self.inner.state.write() = SessionState::Disconnected;
        *self.inner.attenuation.write() = None;
        *self.inner.position.write() = None;
        self.inner.echo.store(false, Ordering::Release);
    }

    /// Get next command sequence number (starts at 1)
    pub fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Echo mode as last set
    pub fn echo(&self) -> bool {
        self.inner.echo.load(Ordering::Acquire)
    }

    pub fn set_echo(&self, enabled: bool) {
        self.inner.echo.store(enabled, Ordering::Release);
    }

    /// Last known attenuation
    pub fn attenuation(&self) -> Option<Attenuation> {
        *self.inner.attenuation.read()
    }

    pub fn record_attenuation(&self, value: Attenuation) {
        *self.inner.attenuation.write() = Some(value);
    }

    /// Last known step position
    pub fn position(&self) -> Option<u32> {
        *self.inner.position.read()
    }

    pub fn record_position(&self, steps: u32) {
        *self.inner.position.write() = Some(steps);
    }

    /// Shift the cached position after a relative move
    ///
    /// Does nothing while the position is unknown. Saturates at the ends of
    /// the step range, where the device itself answers with an overflow.
    pub fn shift_position(&self, delta: i64) {
        let mut position = self.inner.position.write();
        if let Some(steps) = *position {
            let shifted = (i64::from(steps) + delta).clamp(0, i64::from(u32::MAX));
            *position = Some(shifted as u32);
        }
    }

    /// Forget cached readings (after a home or restart)
    pub fn invalidate(&self) {
        *self.inner.attenuation.write() = None;
        *self.inner.position.write() = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
