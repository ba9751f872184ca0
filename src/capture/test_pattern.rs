//! Synthetic sender producing a moving gradient
//!
//! Stands in for a real texture-sharing sender when running the recorder
//! without one, and drives the monitor and engine in tests.

use crate::buffer::{PixelFormat, RowOrder};

use super::receiver::{FrameReceiver, ReceiveStatus};

pub struct TestPatternSource {
    name: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    row_order: RowOrder,
    present: bool,
    /// Next poll reports `changed`
    pending_change: bool,
    tick: u32,
    /// Close after producing this many frames
    frame_limit: Option<u32>,
}

impl TestPatternSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            row_order: RowOrder::TopDown,
            present: true,
            pending_change: true,
            tick: 0,
            frame_limit: None,
        }
    }

    /// Close the sender once `frames` frames have been produced
    pub fn with_frame_limit(mut self, frames: u32) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    #[cfg(test)]
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pending_change = true;
    }

    #[cfg(test)]
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.pending_change = true;
    }

    /// Change the name without raising the change flag, as some senders do
    #[cfg(test)]
    pub fn rename_silently(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[cfg(test)]
    pub fn close(&mut self) {
        self.present = false;
    }

    #[cfg(test)]
    pub fn reopen(&mut self) {
        self.present = true;
        self.pending_change = true;
    }

    /// Number of frames produced so far
    #[cfg(test)]
    pub fn frames_produced(&self) -> u32 {
        self.tick
    }

    fn fill(&self, dest: &mut [u8]) {
        let bpp = self.format.bytes_per_pixel();
        let row_len = self.width as usize * bpp;
        let t = self.tick;
        if row_len == 0 {
            return;
        }

        for (y, row) in dest.chunks_exact_mut(row_len).enumerate() {
            // Keep the image upright on screen whatever the memory layout
            let image_y = match self.row_order {
                RowOrder::TopDown => y,
                RowOrder::BottomUp => self.height as usize - 1 - y,
            };
            for (x, pixel) in row.chunks_exact_mut(bpp).enumerate() {
                let r = (x as u32).wrapping_add(t) as u8;
                let g = (image_y as u32).wrapping_add(t) as u8;
                let b = t.wrapping_mul(2) as u8;
                match self.format {
                    PixelFormat::Rgb8 => pixel.copy_from_slice(&[r, g, b]),
                    PixelFormat::Bgr8 => pixel.copy_from_slice(&[b, g, r]),
                    PixelFormat::Rgba8 => pixel.copy_from_slice(&[r, g, b, 255]),
                    PixelFormat::Bgra8 => pixel.copy_from_slice(&[b, g, r, 255]),
                }
            }
        }
    }
}

impl FrameReceiver for TestPatternSource {
    fn poll_frame(&mut self, dest: &mut [u8]) -> Option<ReceiveStatus> {
        if self.frame_limit.is_some_and(|limit| self.tick >= limit) {
            self.present = false;
        }
        if !self.present {
            return None;
        }

        let expected = self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        if self.pending_change || dest.len() != expected {
            self.pending_change = false;
            return Some(ReceiveStatus {
                width: self.width,
                height: self.height,
                changed: true,
            });
        }

        self.fill(dest);
        self.tick = self.tick.wrapping_add(1);
        Some(ReceiveStatus {
            width: self.width,
            height: self.height,
            changed: false,
        })
    }

    fn is_source_present(&self) -> bool {
        self.present && self.frame_limit.is_none_or(|limit| self.tick < limit)
    }

    fn current_source_name(&self) -> Option<String> {
        self.present.then(|| self.name.clone())
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn row_order(&self) -> RowOrder {
        self.row_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_reports_change() {
        let mut source = TestPatternSource::new("Pattern", 4, 2, PixelFormat::Rgb8);
        let status = source.poll_frame(&mut []).unwrap();
        assert!(status.changed);
        assert_eq!((status.width, status.height), (4, 2));
    }

    #[test]
    fn test_fills_frame_of_right_size() {
        let mut source = TestPatternSource::new("Pattern", 4, 2, PixelFormat::Rgba8);
        source.poll_frame(&mut []);

        let mut frame = vec![0u8; 4 * 2 * 4];
        let status = source.poll_frame(&mut frame).unwrap();
        assert!(!status.changed);
        assert_eq!(source.frames_produced(), 1);
        // Alpha is opaque in every pixel
        assert!(frame.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_bottom_up_rows_are_mirrored() {
        let mut top_down = TestPatternSource::new("A", 2, 3, PixelFormat::Rgb8);
        let mut bottom_up =
            TestPatternSource::new("B", 2, 3, PixelFormat::Rgb8).with_row_order(RowOrder::BottomUp);
        top_down.poll_frame(&mut []);
        bottom_up.poll_frame(&mut []);

        let mut a = vec![0u8; 18];
        let mut b = vec![0u8; 18];
        top_down.poll_frame(&mut a);
        bottom_up.poll_frame(&mut b);

        let rows_a: Vec<_> = a.chunks_exact(6).collect();
        let rows_b: Vec<_> = b.chunks_exact(6).rev().collect();
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn test_frame_limit_closes_sender() {
        let mut source = TestPatternSource::new("Pattern", 2, 2, PixelFormat::Rgb8).with_frame_limit(2);
        source.poll_frame(&mut []);

        let mut frame = vec![0u8; 12];
        assert!(source.poll_frame(&mut frame).is_some());
        assert!(source.poll_frame(&mut frame).is_some());
        assert!(!source.is_source_present());
        assert!(source.poll_frame(&mut frame).is_none());
    }

    #[test]
    fn test_closed_source_is_absent() {
        let mut source = TestPatternSource::new("Pattern", 4, 2, PixelFormat::Rgb8);
        source.close();
        assert!(source.poll_frame(&mut []).is_none());
        assert!(source.current_source_name().is_none());

        source.reopen();
        assert!(source.poll_frame(&mut []).unwrap().changed);
    }
}
