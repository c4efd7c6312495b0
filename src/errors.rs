use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::encode::EncodeError;
use crate::relay::RelayError;
use crate::signaling::SignalingError;
use crate::transport::TransportError;

/// Any failure that ends a streaming session
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("encoder error: {0}")]
    Encode(#[from] EncodeError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("signaling error: {0}")]
    Signaling(#[from] SignalingError),
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl StreamError {
    /// Errors raised before any frame was streamed
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(
            self,
            StreamError::Config(_)
                | StreamError::Capture(CaptureError::Open(_))
                | StreamError::Encode(EncodeError::Setup(_))
                | StreamError::Transport(_)
                | StreamError::Signaling(SignalingError::TransportRejected(_))
                | StreamError::Server(_)
        )
    }
}
