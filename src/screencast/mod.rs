//! Screen recording through an FFmpeg subprocess
//!
//! This module consolidates:
//! - Encoder discovery and output paths (encoder.rs)
//! - FFmpeg argument construction (command.rs)
//! - The encoder subprocess and its stdin pipe (process.rs)
//! - Frame pacing (pacer.rs)
//! - Recording state and user-facing notifications (state.rs, notification.rs)
//! - The recording loop tying them together (recorder.rs)

pub mod command;
pub mod encoder;
pub mod notification;
pub mod pacer;
pub mod process;
pub mod recorder;
pub mod state;

pub use encoder::resolve_output_dir;
pub use process::EncoderProcess;
pub use recorder::{
    EngineHandle, EngineOptions, RecordingEngine, setup_signal_handler, shutdown_flag,
};
