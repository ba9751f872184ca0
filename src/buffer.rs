//! Owned pixel storage for received frames

use serde::{Deserialize, Serialize};

/// Byte layout of a received pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// FFmpeg `-pix_fmt` name for raw input in this layout
    pub fn ffmpeg_pix_fmt(self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "rgb24",
            PixelFormat::Bgr8 => "bgr24",
            PixelFormat::Rgba8 => "rgba",
            PixelFormat::Bgra8 => "bgra",
        }
    }
}

/// Vertical order of rows in a received buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowOrder {
    #[default]
    TopDown,
    /// First row in memory is the bottom of the image (Windows DIB layout)
    BottomUp,
}

/// Frame dimensions plus pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Geometry {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// Number of bytes in one frame of this geometry
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// `WxH`, as FFmpeg expects for `-s`
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {:?}", self.width, self.height, self.format)
    }
}

/// A frame-sized byte buffer bound to one geometry
#[derive(Debug)]
pub struct PixelBuffer {
    data: Vec<u8>,
    geometry: Geometry,
}

impl PixelBuffer {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            data: vec![0; geometry.frame_len()],
            geometry,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
