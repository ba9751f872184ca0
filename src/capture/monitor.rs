//! Sender change detection on top of a [`FrameReceiver`]

use crate::buffer::{Geometry, PixelBuffer};

use super::receiver::{FrameReceiver, SourceInfo};

/// Normalized outcome of one poll
#[derive(Debug)]
pub enum SourceEvent {
    /// No sender exists and none was active
    NoSource,
    /// Same sender and geometry as the last poll; [`SourceMonitor::frame`]
    /// holds a fresh frame
    Unchanged,
    /// A sender appeared, was renamed or was resized. The old buffer is gone;
    /// the caller allocates a new one with [`SourceMonitor::allocate_buffer`]
    /// once it has released anything bound to the old geometry. Until then
    /// every poll reports `Changed` again.
    Changed(SourceInfo),
    /// The previously active sender disappeared
    Lost(String),
}

/// Owns the receiver, the current sender identity and the frame buffer
pub struct SourceMonitor<R> {
    receiver: R,
    source: Option<SourceInfo>,
    buffer: Option<PixelBuffer>,
}

impl<R: FrameReceiver> SourceMonitor<R> {
    pub fn new(receiver: R) -> Self {
        Self {
            receiver,
            source: None,
            buffer: None,
        }
    }

    /// Poll the receiver once and report what changed
    pub fn poll(&mut self) -> SourceEvent {
        let status = if self.receiver.is_source_present() {
            match &mut self.buffer {
                Some(buffer) => self.receiver.poll_frame(buffer.as_bytes_mut()),
                None => self.receiver.poll_frame(&mut []),
            }
        } else {
            None
        };

        let status = match status {
            Some(status) if status.width > 0 && status.height > 0 => status,
            _ => return self.clear(),
        };

        let name = self.receiver.current_source_name().unwrap_or_default();
        let geometry = Geometry::new(status.width, status.height, self.receiver.pixel_format());
        let row_order = self.receiver.row_order();

        let unchanged = !status.changed
            && self.buffer.is_some()
            && self.source.as_ref().is_some_and(|current| {
                current.name == name
                    && current.geometry == geometry
                    && current.row_order == row_order
            });

        if unchanged {
            return SourceEvent::Unchanged;
        }

        let info = SourceInfo {
            name,
            geometry,
            row_order,
        };
        log::info!(
            "Sender [{}] {}x{} ({:?}, {:?})",
            info.name,
            geometry.width,
            geometry.height,
            geometry.format,
            row_order
        );

        self.buffer = None;
        self.source = Some(info.clone());
        SourceEvent::Changed(info)
    }

    /// Allocate a frame buffer for the current sender's geometry
    ///
    /// Always a fresh allocation, never a resize in place, so nothing sized
    /// for the old geometry can alias the new buffer.
    pub fn allocate_buffer(&mut self) -> Option<&PixelBuffer> {
        let geometry = self.source.as_ref()?.geometry;
        self.buffer = Some(PixelBuffer::new(geometry));
        self.buffer.as_ref()
    }

    fn clear(&mut self) -> SourceEvent {
        self.buffer = None;
        match self.source.take() {
            Some(lost) => {
                log::info!("Sender [{}] closed", lost.name);
                SourceEvent::Lost(lost.name)
            }
            None => SourceEvent::NoSource,
        }
    }

    /// The active sender, if any
    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn frame(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    #[cfg(test)]
    pub fn receiver_mut(&mut self) -> &mut R {
        &mut self.receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PixelFormat, RowOrder};
    use crate::capture::TestPatternSource;

    fn sender(width: u32, height: u32) -> SourceMonitor<TestPatternSource> {
        SourceMonitor::new(TestPatternSource::new("TestSender", width, height, PixelFormat::Rgb8))
    }

    #[test]
    fn test_appear_then_unchanged() {
        let mut monitor = sender(640, 480);

        match monitor.poll() {
            SourceEvent::Changed(info) => {
                assert_eq!(info.name, "TestSender");
                assert_eq!((info.width(), info.height()), (640, 480));
            }
            other => panic!("expected Changed, got {:?}", other),
        }
        monitor.allocate_buffer();

        assert!(matches!(monitor.poll(), SourceEvent::Unchanged));
        assert_eq!(monitor.frame().map(|f| f.as_bytes().len()), Some(640 * 480 * 3));
    }

    #[test]
    fn test_no_sender_is_no_source() {
        let mut source = TestPatternSource::new("TestSender", 64, 64, PixelFormat::Rgb8);
        source.close();
        let mut monitor = SourceMonitor::new(source);
        assert!(matches!(monitor.poll(), SourceEvent::NoSource));
        assert!(matches!(monitor.poll(), SourceEvent::NoSource));
        assert!(monitor.frame().is_none());
    }

    #[test]
    fn test_lost_reported_once() {
        let mut monitor = sender(64, 64);
        monitor.poll();
        monitor.allocate_buffer();
        monitor.receiver_mut().close();

        match monitor.poll() {
            SourceEvent::Lost(name) => assert_eq!(name, "TestSender"),
            other => panic!("expected Lost, got {:?}", other),
        }
        assert!(matches!(monitor.poll(), SourceEvent::NoSource));
        assert!(!monitor.is_active());
        assert!(monitor.frame().is_none());
    }

    #[test]
    fn test_resize_reallocates_buffer() {
        let mut monitor = sender(640, 480);
        monitor.poll();
        monitor.allocate_buffer();
        assert!(matches!(monitor.poll(), SourceEvent::Unchanged));
        monitor.receiver_mut().resize(800, 600);

        match monitor.poll() {
            SourceEvent::Changed(info) => assert_eq!((info.width(), info.height()), (800, 600)),
            other => panic!("expected Changed, got {:?}", other),
        }
        // The old-geometry buffer is released before a new one exists
        assert!(monitor.frame().is_none());

        let frame = monitor.allocate_buffer().unwrap();
        assert_eq!(frame.as_bytes().len(), 800 * 600 * 3);
        assert!(matches!(monitor.poll(), SourceEvent::Unchanged));
    }

    #[test]
    fn test_unallocated_change_repeats() {
        let mut monitor = sender(32, 32);
        assert!(matches!(monitor.poll(), SourceEvent::Changed(_)));
        assert!(matches!(monitor.poll(), SourceEvent::Changed(_)));
        assert!(monitor.is_active());
    }

    #[test]
    fn test_zero_size_treated_as_no_source() {
        let mut monitor = sender(0, 480);
        assert!(matches!(monitor.poll(), SourceEvent::NoSource));
        assert!(matches!(monitor.poll(), SourceEvent::NoSource));
        assert!(!monitor.is_active());
    }

    #[test]
    fn test_rename_without_change_flag_is_detected() {
        let mut monitor = sender(32, 32);
        monitor.poll();
        monitor.allocate_buffer();
        monitor.poll();
        monitor.receiver_mut().rename_silently("Other");

        match monitor.poll() {
            SourceEvent::Changed(info) => assert_eq!(info.name, "Other"),
            other => panic!("expected Changed, got {:?}", other),
        }
    }

    #[test]
    fn test_row_order_is_reported() {
        let source = TestPatternSource::new("Flipped", 8, 8, PixelFormat::Bgra8)
            .with_row_order(RowOrder::BottomUp);
        let mut monitor = SourceMonitor::new(source);
        match monitor.poll() {
            SourceEvent::Changed(info) => {
                assert_eq!(info.row_order, RowOrder::BottomUp);
                assert_eq!(info.geometry.format, PixelFormat::Bgra8);
            }
            other => panic!("expected Changed, got {:?}", other),
        }
    }
}
