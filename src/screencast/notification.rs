//! Human-readable events for whatever UI sits on top of the engine

use std::fmt;
use std::path::PathBuf;

/// Something the user should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    SourceFound { name: String, width: u32, height: u32 },
    SourceLost { name: String },
    RecordingStarted { path: PathBuf },
    RecordingSaved { path: PathBuf },
    /// The sender was resized or renamed mid-recording
    SourceChanged { path: PathBuf },
    /// The sender closed mid-recording
    SourceClosed { path: PathBuf },
    EncoderExited { reason: String },
    EncoderNotFound { path: PathBuf },
    StartFailed { reason: String },
    NoSource,
    AlreadyRecording,
    StopTimedOut { path: PathBuf },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::SourceFound {
                name,
                width,
                height,
            } => write!(f, "Sender [{}] {}x{}", name, width, height),
            Notification::SourceLost { name } => write!(f, "Sender [{}] closed", name),
            Notification::RecordingStarted { path } => {
                write!(f, "Recording to {}", path.display())
            }
            Notification::RecordingSaved { path } => write!(f, "Saved [{}]", path.display()),
            Notification::SourceChanged { path } => write!(
                f,
                "Sender changed, recording stopped [{}]",
                path.display()
            ),
            Notification::SourceClosed { path } => {
                write!(f, "Sender closed, recording stopped [{}]", path.display())
            }
            Notification::EncoderExited { reason } => {
                write!(f, "Recording ended unexpectedly: {}", reason)
            }
            Notification::EncoderNotFound { path } => write!(
                f,
                "FFmpeg not found ({}). Refer to the documentation",
                path.display()
            ),
            Notification::StartFailed { reason } => {
                write!(f, "Could not start recording: {}", reason)
            }
            Notification::NoSource => f.write_str("Start a sender before recording"),
            Notification::AlreadyRecording => f.write_str("Already recording"),
            Notification::StopTimedOut { path } => write!(
                f,
                "FFmpeg did not finish in time, {} may be incomplete",
                path.display()
            ),
        }
    }
}
