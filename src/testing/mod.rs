//! Test doubles for the streaming pipeline
//!
//! In-memory stand-ins for the transport, the encode pipeline and the capture
//! device, so the relay, the coordinator and the HTTP surface can be driven
//! without a camera, an encoder or a network.

pub mod loopback;
pub mod scripted;

pub use loopback::{LoopbackSink, LoopbackTransport};
pub use scripted::{
    blank_frame, PipelineLog, PushRecord, RecordingPipeline, ScriptedSource, Step,
};
