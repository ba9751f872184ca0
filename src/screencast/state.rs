//! Recording state shared with the control surface

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[cfg(unix)]
use nix::{sys::signal, unistd::Pid};

/// Where the recorder is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RecordingState {
    /// No sender
    #[default]
    Idle = 0,
    /// A sender is active and its frames are being received
    Bound = 1,
    /// Frames are being written to an encoder session
    Recording = 2,
    /// The encoder session is being shut down
    Stopping = 3,
}

impl RecordingState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordingState::Bound,
            2 => RecordingState::Recording,
            3 => RecordingState::Stopping,
            _ => RecordingState::Idle,
        }
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Bound => "bound",
            RecordingState::Recording => "recording",
            RecordingState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Copy of the engine's state readable from other threads
///
/// Only the engine writes it.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn get(&self) -> RecordingState {
        RecordingState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: RecordingState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Check if a process is alive
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // Signal 0 checks if process exists without sending a signal
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}
