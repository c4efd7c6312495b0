//! Encode stage
//!
//! The relay pushes timestamped raw frames in; encoded units come out through
//! a handler registered once when the pipeline is built. The handler runs on
//! whatever thread the pipeline chooses, but never concurrently with itself.

pub mod h264;
pub mod yuv;

pub use h264::{H264Encoder, H264Pipeline};

use crate::capture::RawFrame;
use crate::timing::MediaTimestamp;
use bytes::Bytes;
use std::time::Duration;

/// One compressed, transport-ready media sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Annex-B access unit
    pub data: Bytes,
    pub timestamp: MediaTimestamp,
    pub duration: Duration,
    pub keyframe: bool,
}

/// Receives encoded units from a pipeline
pub type UnitHandler = Box<dyn FnMut(EncodedUnit) + Send + 'static>;

/// Input side of an encode pipeline
pub trait EncodePipeline {
    /// Queue a frame for encoding, tagged with its nominal presentation time.
    fn push(
        &mut self,
        frame: RawFrame,
        timestamp: MediaTimestamp,
        duration: Duration,
    ) -> Result<(), EncodeError>;

    /// Signal that no more frames follow, drain buffered output through the
    /// handler and release pipeline resources. Calling it twice is a no-op.
    fn end_of_stream(&mut self) -> Result<(), EncodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to build encode pipeline: {0}")]
    Setup(String),
    #[error("encode pipeline is closed")]
    Closed,
    #[error("frame rejected by encoder: {0}")]
    InvalidFrame(String),
}
