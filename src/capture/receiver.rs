//! Interface to the shared-texture capture backend

use crate::buffer::{Geometry, PixelFormat, RowOrder};

/// Result of one receive attempt from a sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveStatus {
    pub width: u32,
    pub height: u32,
    /// The sender appeared, was renamed or was resized since the last call.
    /// When set, the destination buffer was not filled.
    pub changed: bool,
}

/// A capture backend that receives frames from one named sender
///
/// Implementations wrap the platform texture-sharing API. They are polled from
/// the recording loop and never block for long.
pub trait FrameReceiver {
    /// Copy the sender's current frame into `dest`
    ///
    /// Returns `None` when no sender exists. When the returned status has
    /// `changed == false`, `dest` holds a complete frame of the reported size.
    fn poll_frame(&mut self, dest: &mut [u8]) -> Option<ReceiveStatus>;

    fn is_source_present(&self) -> bool;

    fn current_source_name(&self) -> Option<String>;

    /// Layout of the bytes written by `poll_frame`
    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb8
    }

    /// Row order of the bytes written by `poll_frame`
    fn row_order(&self) -> RowOrder {
        RowOrder::TopDown
    }
}

/// Identity and geometry of the active sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub geometry: Geometry,
    pub row_order: RowOrder,
}

impl SourceInfo {
    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }
}
