//! crabcast: live camera to browser streaming over WebRTC
//!
//! Frames are pulled from a local camera, stamped with nominal timestamps,
//! encoded to H.264 with openh264 and sent over a single WebRTC video track.
//! A small HTTP server handles the offer/answer exchange and lets the viewer
//! start, pause and stop the stream.
//!
//! # Pipeline
//! ```text
//! FrameSource -> CaptureEncodeRelay -> H264Pipeline -> UnitForwarder -> MediaSink
//!                      ^                                                   |
//!                 ControlState <- /control        /offer, /answer -> SignalingCoordinator
//! ```
//!
//! # Usage
//! ```rust,ignore
//! use crabcast::{Streamer, StreamerConfig, WebRtcTransport};
//! use std::sync::Arc;
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let config = StreamerConfig::load_from_file("crabcast.toml")?;
//! let transport = runtime.block_on(WebRtcTransport::new(&config.transport, runtime.handle().clone()))?;
//! let streamer = Streamer::new(config, Arc::new(transport))?;
//! streamer.start_negotiation()?;
//! let source = streamer.open_source()?;
//! streamer.run(source)?;
//! ```
pub mod capture;
pub mod config;
pub mod control;
pub mod encode;
pub mod errors;
pub mod relay;
pub mod server;
pub mod signaling;
pub mod streamer;
pub mod testing;
pub mod timing;
pub mod transport;

// Re-exports for convenience
pub use capture::{FrameGeometry, FrameSource, PixelLayout, RawFrame};
pub use config::StreamerConfig;
pub use control::{ControlCommand, ControlState};
pub use encode::{EncodePipeline, EncodedUnit, H264Pipeline};
pub use errors::StreamError;
pub use relay::{CaptureEncodeRelay, RelayCounters, RelayReport};
pub use signaling::{SignalingCoordinator, SignalingState};
pub use streamer::Streamer;
pub use timing::MediaTimestamp;
pub use transport::{MediaSink, SessionDescription, Transport, WebRtcTransport};

/// Initialize logging; defaults to `crabcast=info` when `RUST_LOG` is unset
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("crabcast=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        assert_eq!(NAME, "crabcast");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
