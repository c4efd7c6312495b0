//! Offer/answer negotiation
//!
//! [`SignalingCoordinator`] owns the single negotiation of a session: it kicks
//! off candidate gathering, publishes the offer once gathering completes and
//! hands the viewer's answer back to the transport.

pub mod coordinator;

pub use coordinator::SignalingCoordinator;

use crate::transport::SessionDescription;
use serde::Serialize;
use std::fmt;

/// Offer produced locally after gathering completed
pub type NegotiationOffer = SessionDescription;

/// Answer received from the viewer
pub type NegotiationAnswer = SessionDescription;

/// Negotiation progress
///
/// Moves forward `Idle -> Gathering -> OfferReady -> ApplyingAnswer ->
/// AnswerApplied`. A rejected answer falls back to `OfferReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    Idle,
    Gathering,
    OfferReady,
    ApplyingAnswer,
    AnswerApplied,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Gathering => "gathering",
            Self::OfferReady => "offer-ready",
            Self::ApplyingAnswer => "applying-answer",
            Self::AnswerApplied => "answer-applied",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("malformed answer: {0}")]
    MalformedAnswer(String),
    #[error("answer rejected: {0}")]
    TransportRejected(String),
    #[error("negotiation already started")]
    AlreadyStarted,
}

/// Decode a viewer answer from a request body.
///
/// The body must be a JSON object with string `type` and `sdp` members.
pub fn parse_answer(body: &[u8]) -> Result<NegotiationAnswer, SignalingError> {
    serde_json::from_slice(body).map_err(|e| SignalingError::MalformedAnswer(e.to_string()))
}
