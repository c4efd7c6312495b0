//! Synthetic test-pattern source
//!
//! Produces a moving RGB gradient so the encoder sees temporal change. Used by
//! `--source synthetic` and by tests that need real pixels without hardware.

use super::{FrameGeometry, FrameSource, PixelLayout, RawFrame};
use std::time::{Duration, Instant};

/// Build one gradient frame that shifts with `frame_number`
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> RawFrame {
    let geometry = FrameGeometry::new(width, height, PixelLayout::Rgb24);
    let mut data = vec![0u8; geometry.frame_len()];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = rgb_offset(x, y, width);
            data[idx] = base.wrapping_add(x as u8);
            data[idx + 1] = base.wrapping_add(y as u8);
            data[idx + 2] = base.wrapping_add(x.wrapping_add(y) as u8);
        }
    }

    RawFrame { data, geometry }
}

/// Byte offset of pixel (x, y) in a packed RGB24 buffer
fn rgb_offset(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 3
}

/// Frame source pacing synthetic frames at a fixed rate
pub struct SyntheticSource {
    geometry: FrameGeometry,
    interval: Duration,
    next_due: Option<Instant>,
    produced: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            geometry: FrameGeometry::rgb(width, height),
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: None,
            produced: 0,
            limit: None,
        }
    }

    /// Stop producing after `frames` frames; later pulls return `None`.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Disable pacing, producing frames as fast as they are pulled.
    pub fn unpaced(mut self) -> Self {
        self.interval = Duration::ZERO;
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl FrameSource for SyntheticSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }

        if !self.interval.is_zero() {
            let now = Instant::now();
            let due = self.next_due.unwrap_or(now);
            if due > now {
                std::thread::sleep(due - now);
            }
            // Re-anchor after a stall (pause) instead of bursting to catch up.
            self.next_due = Some(due.max(now) + self.interval);
        }

        let frame =
            synthetic_video_frame(self.produced, self.geometry.width, self.geometry.height);
        self.produced += 1;
        Some(frame)
    }
}
