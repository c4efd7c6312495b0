//! Real-time transport façade
//!
//! The core only needs a handful of operations from the transport library:
//! start candidate gathering, learn when it finished, read the local
//! description, apply the remote answer and push encoded units into a media
//! sink. [`Transport`] captures exactly that surface.

pub mod peer;

pub use peer::WebRtcTransport;

use crate::encode::EncodedUnit;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session description exchanged during negotiation
///
/// Serialized as `{"type": <kind>, "sdp": <description>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "sdp")]
    pub description: String,
}

impl SessionDescription {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

/// Invoked once when candidate gathering has completed
pub type GatheringCallback = Box<dyn FnOnce() + Send + 'static>;

/// Operations the core consumes from the transport library
pub trait Transport: Send + Sync {
    /// Register the callback fired when gathering completes. Must be called
    /// before [`Transport::begin_gathering`].
    fn on_gathering_complete(&self, callback: GatheringCallback);

    /// Start candidate gathering. Errors here are fatal for the session.
    fn begin_gathering(&self) -> Result<(), TransportError>;

    /// Local description, available once gathering has completed
    fn local_description(&self) -> Option<SessionDescription>;

    fn apply_remote_answer(&self, answer: &SessionDescription) -> Result<(), TransportError>;

    fn open_media_sink(&self) -> Arc<dyn MediaSink>;

    fn is_media_sink_open(&self) -> bool;

    fn close(&self) -> Result<(), TransportError>;
}

/// Outcome of handing a unit to a media sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Dropped,
}

/// Transport endpoint receiving encoded units
///
/// `send` never blocks waiting for the sink to open and never fails: a unit
/// that cannot be delivered is dropped.
pub trait MediaSink: Send + Sync {
    fn is_open(&self) -> bool;

    fn send(&self, unit: EncodedUnit) -> Delivery;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error(transparent)]
    Rtc(#[from] webrtc::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_wire_format() {
        let desc = SessionDescription::new("offer", "v=0\r\n");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json, serde_json::json!({"type": "offer", "sdp": "v=0\r\n"}));

        let back: SessionDescription = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }

    #[test]
    fn test_description_requires_both_fields() {
        assert!(serde_json::from_str::<SessionDescription>(r#"{"type":"answer"}"#).is_err());
        assert!(serde_json::from_str::<SessionDescription>(r#"{"sdp":"v=0"}"#).is_err());
        assert!(serde_json::from_str::<SessionDescription>("{}").is_err());
    }
}
