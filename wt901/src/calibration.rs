//! Accelerometer calibration handshake
//!
//! The device is unlocked, told to start its accelerometer self-calibration,
//! and then left alone for the calibration to finish. Nothing is read back;
//! progress is purely timing based:
//!
//! ```text
//! Idle --unlock--> Unlocked --100 ms--> --start--> Calibrating --5500 ms--> Ready
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::link::Link;

/// Unlock the configuration registers
pub const UNLOCK: [u8; 5] = [0xFF, 0xAA, 0x69, 0x88, 0x5B];

/// Start accelerometer calibration
pub const START_CALIBRATION: [u8; 5] = [0xFF, 0xAA, 0x01, 0x01, 0x00];

/// Firmware turnaround after the unlock command
pub const UNLOCK_SETTLE_TIME: Duration = Duration::from_millis(100);

/// Duration of the accelerometer self-calibration
pub const CALIBRATION_TIME: Duration = Duration::from_millis(5500);

/// Progress of the calibration handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    Unlocked,
    Calibrating,
    Ready,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationState::Idle => "idle",
            CalibrationState::Unlocked => "unlocked",
            CalibrationState::Calibrating => "calibrating",
            CalibrationState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Errors raised while sequencing the handshake.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// A command could not be written; the sequencer stays in `state`.
    #[error("Link write failed in calibration state {state}: {source}")]
    LinkWrite {
        state: CalibrationState,
        #[source]
        source: std::io::Error,
    },
}

/// Drives the calibration handshake one step at a time.
///
/// The sequencer performs the writes itself but leaves waiting to the
/// caller: every [`step`](Self::step) returns the delay that must elapse
/// before the next one. This lets a blocking caller sleep and an async
/// caller await a timer.
#[derive(Debug, Default)]
pub struct CalibrationSequencer {
    state: CalibrationState,
}

impl CalibrationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CalibrationState::Ready
    }

    /// Perform the next step of the handshake.
    ///
    /// Returns `Ok(Some(delay))` when a command was sent and `delay` must
    /// elapse before stepping again, and `Ok(None)` once `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::LinkWrite`] if the command could not be
    /// written. The state is left unchanged.
    pub fn step<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
    ) -> Result<Option<Duration>, CalibrationError> {
        let (command, next, wait) = match self.state {
            CalibrationState::Idle => (
                Some(&UNLOCK),
                CalibrationState::Unlocked,
                Some(UNLOCK_SETTLE_TIME),
            ),
            CalibrationState::Unlocked => (
                Some(&START_CALIBRATION),
                CalibrationState::Calibrating,
                Some(CALIBRATION_TIME),
            ),
            CalibrationState::Calibrating => (None, CalibrationState::Ready, None),
            CalibrationState::Ready => return Ok(None),
        };

        if let Some(command) = command {
            debug!("Calibration send in state {}: {:02X?}", self.state, command);
            link.write_frame(command)
                .map_err(|source| CalibrationError::LinkWrite {
                    state: self.state,
                    source,
                })?;
        }

        self.state = next;
        if self.state == CalibrationState::Ready {
            info!("Accelerometer calibration finished");
        }

        Ok(wait)
    }

    /// Run the whole handshake, calling `sleep` for each mandated delay.
    pub fn run_blocking<L, S>(&mut self, link: &mut L, mut sleep: S) -> Result<(), CalibrationError>
    where
        L: Link + ?Sized,
        S: FnMut(Duration),
    {
        while !self.is_ready() {
            if let Some(wait) = self.step(link)? {
                sleep(wait);
            }
        }
        Ok(())
    }
}
