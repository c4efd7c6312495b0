//! Capture to encode to transport relay
//!
//! [`CaptureEncodeRelay`] runs on the calling thread and pulls frames from a
//! [`FrameSource`], stamping each with a nominal timestamp before pushing it
//! into an [`EncodePipeline`]. Encoded output comes back on the pipeline's own
//! thread through a [`UnitForwarder`], which hands it to the media sink.
//!
//! The loop honours the shared [`ControlState`] once per iteration: a cleared
//! `running` flag ends it; a set `paused` flag idles it without pulling frames
//! or advancing the clock.

use crate::capture::{FrameGeometry, FrameSource};
use crate::control::ControlState;
use crate::encode::{EncodeError, EncodePipeline, EncodedUnit, UnitHandler};
use crate::timing::{MediaTimestamp, NominalClock};
use crate::transport::{Delivery, MediaSink};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PAUSE_POLL: Duration = Duration::from_millis(50);
pub const DEFAULT_MISS_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("frame geometry changed mid-session: expected {expected}, got {actual}")]
    GeometryMismatch {
        expected: FrameGeometry,
        actual: FrameGeometry,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Live counters shared by the relay, the forwarder and status reporting
#[derive(Debug, Default)]
pub struct RelayCounters {
    captured: AtomicU64,
    missed: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl RelayCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    fn record_missed(&self) {
        self.missed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_delivery(&self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.delivered.fetch_add(1, Ordering::Relaxed),
            Delivery::Dropped => self.dropped.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CountersSnapshot {
    pub captured: u64,
    pub missed: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Hands encoded units to the media sink, dropping them while it is closed
pub struct UnitForwarder {
    sink: Arc<dyn MediaSink>,
    counters: Arc<RelayCounters>,
}

impl UnitForwarder {
    pub fn new(sink: Arc<dyn MediaSink>, counters: Arc<RelayCounters>) -> Self {
        Self { sink, counters }
    }

    pub fn forward(&self, unit: EncodedUnit) -> Delivery {
        let timestamp = unit.timestamp;
        let delivery = self.sink.send(unit);
        if delivery == Delivery::Dropped {
            log::trace!("Dropped unit at {} (sink not open)", timestamp);
        }
        self.counters.record_delivery(delivery);
        delivery
    }

    /// Wrap into the callback form an encode pipeline expects
    pub fn into_handler(self) -> UnitHandler {
        Box::new(move |unit| {
            self.forward(unit);
        })
    }
}

/// Summary of a finished relay run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    /// Frames pushed into the pipeline
    pub frames: u64,
    /// Acquisition attempts that produced no frame
    pub misses: u64,
    /// Timestamp the next frame would have carried
    pub next_timestamp: MediaTimestamp,
    pub elapsed: Duration,
}

/// Pull/stamp/push loop for one session
pub struct CaptureEncodeRelay<S, P> {
    source: S,
    pipeline: P,
    control: Arc<ControlState>,
    clock: NominalClock,
    geometry: FrameGeometry,
    counters: Arc<RelayCounters>,
    pause_poll: Duration,
    miss_backoff: Duration,
}

impl<S: FrameSource, P: EncodePipeline> CaptureEncodeRelay<S, P> {
    /// The geometry is fixed from the source at construction.
    pub fn new(source: S, pipeline: P, control: Arc<ControlState>, fps: u32) -> Self {
        let geometry = source.geometry();
        Self {
            source,
            pipeline,
            control,
            clock: NominalClock::new(fps),
            geometry,
            counters: RelayCounters::new(),
            pause_poll: DEFAULT_PAUSE_POLL,
            miss_backoff: DEFAULT_MISS_BACKOFF,
        }
    }

    pub fn with_counters(mut self, counters: Arc<RelayCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_pause_poll(mut self, pause_poll: Duration) -> Self {
        self.pause_poll = pause_poll;
        self
    }

    pub fn with_miss_backoff(mut self, miss_backoff: Duration) -> Self {
        self.miss_backoff = miss_backoff;
        self
    }

    pub fn counters(&self) -> Arc<RelayCounters> {
        Arc::clone(&self.counters)
    }

    /// Run until `running` is cleared or the pipeline fails.
    ///
    /// End-of-stream is always signalled before returning, so everything
    /// already pushed is drained through the unit handler.
    pub fn run(mut self) -> Result<RelayReport, RelayError> {
        let started = Instant::now();
        log::info!(
            "Relay started: {} at {:?} per frame",
            self.geometry,
            self.clock.frame_duration()
        );

        let mut frames = 0u64;
        let mut misses = 0u64;
        let outcome = self.pump(&mut frames, &mut misses);

        let drained = self.pipeline.end_of_stream();
        let report = RelayReport {
            frames,
            misses,
            next_timestamp: self.clock.peek(),
            elapsed: started.elapsed(),
        };

        match (outcome, drained) {
            (Err(e), _) => {
                log::error!("Relay stopped after {} frames: {}", frames, e);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                log::error!("End-of-stream failed: {}", e);
                Err(e.into())
            }
            (Ok(()), Ok(())) => {
                log::info!(
                    "Relay stopped: {} frames, {} misses, stream time {}",
                    report.frames,
                    report.misses,
                    report.next_timestamp
                );
                Ok(report)
            }
        }
    }

    fn pump(&mut self, frames: &mut u64, misses: &mut u64) -> Result<(), RelayError> {
        while self.control.is_running() {
            if self.control.is_paused() {
                std::thread::sleep(self.pause_poll);
                continue;
            }

            let Some(frame) = self.source.next_frame() else {
                *misses += 1;
                self.counters.record_missed();
                std::thread::sleep(self.miss_backoff);
                continue;
            };

            if frame.geometry != self.geometry {
                return Err(RelayError::GeometryMismatch {
                    expected: self.geometry,
                    actual: frame.geometry,
                });
            }
            self.counters.record_captured();

            let timestamp = self.clock.peek();
            self.pipeline
                .push(frame, timestamp, self.clock.frame_duration())?;
            self.clock.advance();
            *frames += 1;
        }
        Ok(())
    }
}
