//! Frame capture from a shared-texture sender
//!
//! This module consolidates:
//! - The receiver interface implemented by capture backends (receiver.rs)
//! - Sender change detection and frame buffering (monitor.rs)
//! - A synthetic sender for demos and tests (test_pattern.rs)

pub mod monitor;
pub mod receiver;
pub mod test_pattern;

pub use monitor::{SourceEvent, SourceMonitor};
pub use receiver::{FrameReceiver, SourceInfo};
pub use test_pattern::TestPatternSource;
