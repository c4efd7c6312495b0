//! One streaming session, wired end to end
//!
//! [`Streamer`] owns the shared pieces (control flags, signaling coordinator,
//! transport, relay counters) and assembles the capture, encode and relay
//! stages around them.

use crate::capture::{CameraSource, FrameSource, SyntheticSource};
use crate::config::StreamerConfig;
use crate::control::ControlState;
use crate::encode::{EncodePipeline, H264Pipeline, UnitHandler};
use crate::errors::StreamError;
use crate::relay::{CaptureEncodeRelay, RelayCounters, RelayReport, UnitForwarder};
use crate::server::{AppState, SessionInfo};
use crate::signaling::SignalingCoordinator;
use crate::transport::Transport;
use std::sync::Arc;

pub struct Streamer {
    config: StreamerConfig,
    session: SessionInfo,
    control: Arc<ControlState>,
    transport: Arc<dyn Transport>,
    coordinator: Arc<SignalingCoordinator>,
    counters: Arc<RelayCounters>,
}

impl Streamer {
    /// Validate `config` and bind the session to `transport`.
    pub fn new(config: StreamerConfig, transport: Arc<dyn Transport>) -> Result<Self, StreamError> {
        config.validate()?;

        let session = SessionInfo::new();
        log::info!(
            "Session {} created at {}",
            session.id,
            session.started_at.to_rfc3339()
        );

        Ok(Self {
            coordinator: SignalingCoordinator::new(Arc::clone(&transport)),
            config,
            session,
            control: Arc::new(ControlState::new()),
            transport,
            counters: RelayCounters::new(),
        })
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    pub fn session(&self) -> SessionInfo {
        self.session
    }

    pub fn control(&self) -> Arc<ControlState> {
        Arc::clone(&self.control)
    }

    pub fn coordinator(&self) -> Arc<SignalingCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn counters(&self) -> Arc<RelayCounters> {
        Arc::clone(&self.counters)
    }

    /// Kick off candidate gathering; the offer is published asynchronously.
    pub fn start_negotiation(&self) -> Result<(), StreamError> {
        self.coordinator.start()?;
        Ok(())
    }

    /// Handler state for the signaling server
    pub fn app_state(&self) -> AppState {
        AppState {
            coordinator: self.coordinator(),
            control: self.control(),
            counters: self.counters(),
            session: self.session,
            static_dir: self.config.server.static_dir.clone(),
            offer_timeout: self.config.server.offer_timeout(),
        }
    }

    /// Open the configured capture source
    pub fn open_source(&self) -> Result<Box<dyn FrameSource>, StreamError> {
        let capture = &self.config.capture;
        if capture.is_synthetic() {
            log::info!(
                "Using synthetic source {}x{} @ {} fps",
                capture.width,
                capture.height,
                capture.fps
            );
            return Ok(Box::new(SyntheticSource::new(
                capture.width,
                capture.height,
                capture.fps,
            )));
        }

        let camera = CameraSource::open(&capture.source, capture.width, capture.height, capture.fps)?;
        Ok(Box::new(camera))
    }

    /// Callback delivering encoded units to the transport's media sink
    pub fn unit_handler(&self) -> UnitHandler {
        UnitForwarder::new(self.transport.open_media_sink(), self.counters()).into_handler()
    }

    /// Stream from `source` through openh264 until stopped.
    ///
    /// Blocks the calling thread.
    pub fn run<S: FrameSource>(&self, source: S) -> Result<RelayReport, StreamError> {
        let pipeline = H264Pipeline::spawn(
            source.geometry(),
            self.config.encoder.keyframe_interval,
            self.config.encoder.input_capacity,
            self.unit_handler(),
        )?;
        self.run_with(source, pipeline)
    }

    /// Stream from `source` into an already-built pipeline.
    pub fn run_with<S: FrameSource, P: EncodePipeline>(
        &self,
        source: S,
        pipeline: P,
    ) -> Result<RelayReport, StreamError> {
        let relay = CaptureEncodeRelay::new(
            source,
            pipeline,
            self.control(),
            self.config.capture.fps,
        )
        .with_counters(self.counters())
        .with_pause_poll(self.config.relay.pause_poll())
        .with_miss_backoff(self.config.relay.miss_backoff());

        Ok(relay.run()?)
    }

    /// Stop the relay loop and close the transport.
    pub fn shutdown(&self) -> Result<(), StreamError> {
        self.control.set_running(false);
        self.transport.close()?;
        log::info!("Session {} shut down", self.session.id);
        Ok(())
    }
}
