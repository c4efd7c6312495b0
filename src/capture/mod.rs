//! Capture sources
//!
//! A [`FrameSource`] yields fixed-geometry pixel buffers on demand. The relay
//! pulls from it once per iteration; `None` means "no frame this time" and is
//! never fatal. Only opening a source can fail hard.

pub mod camera;
pub mod synthetic;

pub use camera::CameraSource;
pub use synthetic::{synthetic_video_frame, SyntheticSource};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel order of a packed 8-bit, 3-channel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    Rgb24,
    Bgr24,
}

impl PixelLayout {
    pub const fn bytes_per_pixel(self) -> usize {
        3
    }
}

/// Frame dimensions and channel layout agreed at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            layout,
        }
    }

    pub fn rgb(width: u32, height: u32) -> Self {
        Self::new(width, height, PixelLayout::Rgb24)
    }

    /// Number of bytes in one packed frame of this geometry
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.bytes_per_pixel()
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {:?}", self.width, self.height, self.layout)
    }
}

/// One captured, decoded frame
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub geometry: FrameGeometry,
}

impl RawFrame {
    /// Wrap a packed pixel buffer, checking that its size matches the geometry.
    pub fn new(data: Vec<u8>, geometry: FrameGeometry) -> Result<Self, CaptureError> {
        if data.len() != geometry.frame_len() {
            return Err(CaptureError::Frame(format!(
                "buffer of {} bytes does not match {} ({} bytes)",
                data.len(),
                geometry,
                geometry.frame_len()
            )));
        }
        Ok(Self { data, geometry })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open capture source: {0}")]
    Open(String),
    #[error("invalid frame: {0}")]
    Frame(String),
}

/// Something the relay can pull frames from
pub trait FrameSource {
    /// Geometry every frame from this source is expected to have
    fn geometry(&self) -> FrameGeometry;

    /// Acquire the next frame. `None` covers both transient failures and an
    /// exhausted source; the caller skips the iteration either way.
    fn next_frame(&mut self) -> Option<RawFrame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn geometry(&self) -> FrameGeometry {
        (**self).geometry()
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        (**self).next_frame()
    }
}
