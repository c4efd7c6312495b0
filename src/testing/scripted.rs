//! Scripted capture source and recording encode pipeline

use crate::capture::{FrameGeometry, FrameSource, RawFrame};
use crate::control::{ControlCommand, ControlState};
use crate::encode::{EncodeError, EncodePipeline, EncodedUnit, UnitHandler};
use crate::timing::MediaTimestamp;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Zero-filled frame of the given geometry
pub fn blank_frame(geometry: FrameGeometry) -> RawFrame {
    RawFrame {
        data: vec![0u8; geometry.frame_len()],
        geometry,
    }
}

/// One scripted acquisition event
#[derive(Debug, Clone)]
pub enum Step {
    /// Blank frame in the source geometry
    Frame,
    /// Blank frame with a different geometry
    FrameOf(FrameGeometry),
    /// Acquisition yields nothing
    Miss,
    /// Sleep before the next step, simulating acquisition latency
    Delay(Duration),
    /// Apply a control command, then continue with the next step
    Command(ControlCommand),
}

/// Frame source replaying a fixed script
///
/// Once the script is exhausted the source stops the session
/// (`running = false`) so the relay winds down by itself.
pub struct ScriptedSource {
    geometry: FrameGeometry,
    control: Arc<ControlState>,
    steps: VecDeque<Step>,
    pulls: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub fn new(
        geometry: FrameGeometry,
        control: Arc<ControlState>,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        Self {
            geometry,
            control,
            steps: steps.into_iter().collect(),
            pulls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of `next_frame` calls, readable after the source moved
    pub fn pull_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.pulls)
    }
}

impl FrameSource for ScriptedSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        self.pulls.fetch_add(1, Ordering::SeqCst);

        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Frame => return Some(blank_frame(self.geometry)),
                Step::FrameOf(geometry) => return Some(blank_frame(geometry)),
                Step::Miss => return None,
                Step::Delay(delay) => std::thread::sleep(delay),
                Step::Command(command) => self.control.apply(command),
            }
        }

        self.control.set_running(false);
        None
    }
}

/// One frame accepted by a [`RecordingPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushRecord {
    pub timestamp: MediaTimestamp,
    pub duration: Duration,
    pub geometry: FrameGeometry,
}

#[derive(Debug, Default)]
struct LogInner {
    pushes: Vec<PushRecord>,
    end_of_stream_calls: usize,
}

/// Shared view of what a [`RecordingPipeline`] received
#[derive(Debug, Clone, Default)]
pub struct PipelineLog {
    inner: Arc<Mutex<LogInner>>,
}

impl PipelineLog {
    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().pushes.clone()
    }

    pub fn timestamps(&self) -> Vec<MediaTimestamp> {
        self.lock().pushes.iter().map(|p| p.timestamp).collect()
    }

    pub fn end_of_stream_calls(&self) -> usize {
        self.lock().end_of_stream_calls
    }
}

/// Pipeline recording pushes instead of encoding
///
/// With a handler attached, every push is echoed back as an encoded unit
/// carrying the same timestamp, on the caller's thread.
pub struct RecordingPipeline {
    log: PipelineLog,
    handler: Option<UnitHandler>,
    close_after: Option<usize>,
    ended: bool,
}

impl RecordingPipeline {
    pub fn new() -> (Self, PipelineLog) {
        let log = PipelineLog::default();
        let pipeline = Self {
            log: log.clone(),
            handler: None,
            close_after: None,
            ended: false,
        };
        (pipeline, log)
    }

    pub fn with_handler(mut self, handler: UnitHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Report [`EncodeError::Closed`] once `pushes` frames were accepted
    pub fn closing_after(mut self, pushes: usize) -> Self {
        self.close_after = Some(pushes);
        self
    }
}

impl EncodePipeline for RecordingPipeline {
    fn push(
        &mut self,
        frame: RawFrame,
        timestamp: MediaTimestamp,
        duration: Duration,
    ) -> Result<(), EncodeError> {
        if self.ended {
            return Err(EncodeError::Closed);
        }

        let index = {
            let mut log = self.log.lock();
            if self.close_after.is_some_and(|limit| log.pushes.len() >= limit) {
                return Err(EncodeError::Closed);
            }
            log.pushes.push(PushRecord {
                timestamp,
                duration,
                geometry: frame.geometry,
            });
            log.pushes.len() - 1
        };

        if let Some(handler) = self.handler.as_mut() {
            handler(EncodedUnit {
                data: Bytes::from(frame.data),
                timestamp,
                duration,
                keyframe: index == 0,
            });
        }
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<(), EncodeError> {
        self.ended = true;
        self.log.lock().end_of_stream_calls += 1;
        Ok(())
    }
}
