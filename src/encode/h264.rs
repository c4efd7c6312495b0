//! H.264 encode pipeline using openh264
//!
//! The encoder lives on a dedicated `crabcast-encode` thread fed through a
//! bounded channel. Encoded access units are handed to the registered
//! [`UnitHandler`] from that thread, one at a time and in push order.

use super::yuv::packed_to_i420;
use super::{EncodeError, EncodePipeline, EncodedUnit, UnitHandler};
use crate::capture::{FrameGeometry, RawFrame};
use crate::timing::MediaTimestamp;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;
use std::thread::JoinHandle;
use std::time::Duration;

/// H.264 encoder for one fixed frame geometry
pub struct H264Encoder {
    encoder: Encoder,
    geometry: FrameGeometry,
    keyframe_interval: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Create an encoder forcing an intra frame every `keyframe_interval`
    /// frames (0 leaves keyframe placement to openh264).
    pub fn new(geometry: FrameGeometry, keyframe_interval: u32) -> Result<Self, EncodeError> {
        if geometry.width == 0
            || geometry.height == 0
            || geometry.width % 2 != 0
            || geometry.height % 2 != 0
        {
            return Err(EncodeError::Setup(format!(
                "unsupported geometry {} (dimensions must be even and non-zero)",
                geometry
            )));
        }

        let encoder = Encoder::new()
            .map_err(|e| EncodeError::Setup(format!("Failed to create H.264 encoder: {}", e)))?;

        Ok(Self {
            encoder,
            geometry,
            keyframe_interval,
            frame_count: 0,
        })
    }

    /// Encode one frame. Returns `None` when the encoder chose to skip it.
    pub fn encode(&mut self, frame: &RawFrame) -> Result<Option<EncodedFrame>, EncodeError> {
        if frame.geometry != self.geometry {
            return Err(EncodeError::InvalidFrame(format!(
                "expected {}, got {}",
                self.geometry, frame.geometry
            )));
        }
        if frame.data.len() != self.geometry.frame_len() {
            return Err(EncodeError::InvalidFrame(format!(
                "expected {} bytes, got {}",
                self.geometry.frame_len(),
                frame.data.len()
            )));
        }

        if self.keyframe_interval > 0
            && self.frame_count > 0
            && self.frame_count % u64::from(self.keyframe_interval) == 0
        {
            self.encoder.force_intra_frame();
        }

        let yuv = packed_to_i420(
            &frame.data,
            self.geometry.width,
            self.geometry.height,
            self.geometry.layout,
        );
        let yuv_buffer = YUVBuffer::from_vec(
            yuv,
            self.geometry.width as usize,
            self.geometry.height as usize,
        );

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| EncodeError::InvalidFrame(format!("H.264 encoding failed: {}", e)))?;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        self.frame_count += 1;

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(EncodedFrame { data, is_keyframe }))
    }

    /// Number of frames submitted to the encoder
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Result of encoding a single frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded H.264 data in Annex B format (with start codes)
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

struct EncodeJob {
    frame: RawFrame,
    timestamp: MediaTimestamp,
    duration: Duration,
}

/// openh264 running on its own thread behind a bounded input channel
pub struct H264Pipeline {
    input: Option<Sender<EncodeJob>>,
    worker: Option<JoinHandle<u64>>,
}

impl H264Pipeline {
    /// Build the encoder and start the worker thread.
    ///
    /// Returns only once the encoder exists, so construction failures surface
    /// here rather than on the first push. `capacity` bounds the number of
    /// frames waiting for the encoder; `push` blocks when it is full.
    pub fn spawn(
        geometry: FrameGeometry,
        keyframe_interval: u32,
        capacity: usize,
        handler: UnitHandler,
    ) -> Result<Self, EncodeError> {
        let (input, jobs) = crossbeam_channel::bounded::<EncodeJob>(capacity.max(1));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), EncodeError>>(1);

        let worker = std::thread::Builder::new()
            .name("crabcast-encode".to_string())
            .spawn(move || {
                // openh264 state stays on this thread for its whole life.
                let encoder = match H264Encoder::new(geometry, keyframe_interval) {
                    Ok(encoder) => {
                        let _ = ready_tx.send(Ok(()));
                        encoder
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return 0;
                    }
                };
                encode_loop(encoder, jobs, handler)
            })
            .map_err(|e| EncodeError::Setup(format!("failed to spawn encoder thread: {}", e)))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(EncodeError::Setup(
                "encoder thread exited during setup".to_string(),
            ))
        });
        if let Err(e) = ready {
            let _ = worker.join();
            return Err(e);
        }

        log::info!(
            "H.264 pipeline ready for {} (keyframe interval {})",
            geometry,
            keyframe_interval
        );

        Ok(Self {
            input: Some(input),
            worker: Some(worker),
        })
    }
}

fn encode_loop(mut encoder: H264Encoder, jobs: Receiver<EncodeJob>, mut handler: UnitHandler) -> u64 {
    let mut emitted = 0u64;

    // Ends once every sender is gone, which is the end-of-stream signal.
    for job in jobs.iter() {
        match encoder.encode(&job.frame) {
            Ok(Some(encoded)) => {
                handler(EncodedUnit {
                    data: Bytes::from(encoded.data),
                    timestamp: job.timestamp,
                    duration: job.duration,
                    keyframe: encoded.is_keyframe,
                });
                emitted += 1;
            }
            Ok(None) => log::trace!("Encoder skipped frame at {}", job.timestamp),
            Err(e) => log::warn!("Dropping frame at {}: {}", job.timestamp, e),
        }
    }

    log::debug!(
        "Encoder drained: {} frames in, {} units out",
        encoder.frame_count(),
        emitted
    );
    emitted
}

impl EncodePipeline for H264Pipeline {
    fn push(
        &mut self,
        frame: RawFrame,
        timestamp: MediaTimestamp,
        duration: Duration,
    ) -> Result<(), EncodeError> {
        let input = self.input.as_ref().ok_or(EncodeError::Closed)?;
        input
            .send(EncodeJob {
                frame,
                timestamp,
                duration,
            })
            .map_err(|_| EncodeError::Closed)
    }

    fn end_of_stream(&mut self) -> Result<(), EncodeError> {
        drop(self.input.take());

        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(emitted) => log::info!("H.264 pipeline flushed ({} units emitted)", emitted),
                Err(_) => {
                    log::error!("Encoder thread panicked");
                    return Err(EncodeError::Closed);
                }
            }
        }
        Ok(())
    }
}

impl Drop for H264Pipeline {
    fn drop(&mut self) {
        let _ = self.end_of_stream();
    }
}
