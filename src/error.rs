use std::path::PathBuf;
use thiserror::Error;

/// Failures of the encoder subprocess and its pipe
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Encoder executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("An encoder session is already active")]
    AlreadyActive,

    #[error("No encoder session is active")]
    NotActive,

    #[error("Failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Encoder pipe closed (process exited)")]
    BrokenPipe,

    #[error("Frame size mismatch: session expects {expected} bytes, got {actual}")]
    GeometryMismatch { expected: usize, actual: usize },

    #[error("Encoder pipe error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recording configuration rejected before any process is spawned
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Frame rate must be greater than zero")]
    ZeroFrameRate,

    #[error("Output path is empty")]
    EmptyOutputPath,

    #[error("Output directory does not exist: {}", .0.display())]
    MissingOutputDir(PathBuf),

    #[error("CRF {0} is out of range (0-51)")]
    CrfOutOfRange(u8),

    #[error("Unknown x264 preset: {0}")]
    UnknownPreset(String),

    #[error("Pass-through arguments are empty")]
    EmptyPassthrough,
}

/// Why a start request did not produce a recording
#[derive(Error, Debug)]
pub enum StartError {
    #[error("No sender is active")]
    NoSource,

    #[error("Already recording")]
    AlreadyRecording,

    #[error("Invalid recording configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}
