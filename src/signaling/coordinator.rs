//! Negotiation state machine shared by the HTTP handlers and transport callbacks

use super::{NegotiationAnswer, NegotiationOffer, SignalingError, SignalingState};
use crate::transport::Transport;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

#[derive(Debug)]
struct Negotiation {
    state: SignalingState,
    offer: Option<NegotiationOffer>,
}

/// Coordinates the single offer/answer exchange of a session
///
/// The offer slot is written exactly once, by the gathering-complete callback,
/// and read any number of times. Readers that arrive early block on a
/// condition variable until it is published or their timeout expires.
pub struct SignalingCoordinator {
    transport: Arc<dyn Transport>,
    negotiation: Mutex<Negotiation>,
    offer_published: Condvar,
}

impl SignalingCoordinator {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            negotiation: Mutex::new(Negotiation {
                state: SignalingState::Idle,
                offer: None,
            }),
            offer_published: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Negotiation> {
        self.negotiation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin candidate gathering.
    ///
    /// A transport that refuses to start gathering is fatal for the session;
    /// the coordinator returns to `Idle`.
    pub fn start(self: &Arc<Self>) -> Result<(), SignalingError> {
        {
            let mut negotiation = self.lock();
            if negotiation.state != SignalingState::Idle {
                return Err(SignalingError::AlreadyStarted);
            }
            negotiation.state = SignalingState::Gathering;
        }

        // Weak: the transport holds the callback and the coordinator holds the
        // transport.
        let coordinator: Weak<Self> = Arc::downgrade(self);
        self.transport.on_gathering_complete(Box::new(move || {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.gathering_complete();
            }
        }));

        log::info!("Negotiation started, gathering candidates");
        if let Err(e) = self.transport.begin_gathering() {
            log::error!("Transport failed to begin gathering: {}", e);
            self.lock().state = SignalingState::Idle;
            return Err(SignalingError::TransportRejected(e.to_string()));
        }
        Ok(())
    }

    /// Publish the offer. Invoked by the transport once gathering finished.
    pub fn gathering_complete(&self) {
        let description = self.transport.local_description();

        let mut negotiation = self.lock();
        if negotiation.state != SignalingState::Gathering {
            log::warn!(
                "Ignoring gathering completion in state {}",
                negotiation.state
            );
            return;
        }

        match description {
            Some(offer) => {
                log::info!(
                    "Offer ready ({} type, {} bytes of description)",
                    offer.kind,
                    offer.description.len()
                );
                negotiation.offer = Some(offer);
                negotiation.state = SignalingState::OfferReady;
                self.offer_published.notify_all();
            }
            None => log::error!("Gathering completed but transport has no local description"),
        }
    }

    /// Wait up to `timeout` for the offer.
    ///
    /// Returns a copy of the stored offer; repeated calls yield the same
    /// value. `None` means the offer was not ready in time.
    pub fn await_offer(&self, timeout: Duration) -> Option<NegotiationOffer> {
        let guard = self.lock();
        let (guard, result) = self
            .offer_published
            .wait_timeout_while(guard, timeout, |n| n.offer.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() && guard.offer.is_none() {
            log::debug!("Offer not ready after {:?}", timeout);
        }
        guard.offer.clone()
    }

    /// Apply the viewer's answer.
    ///
    /// Only one answer is accepted per session, and only after the offer has
    /// been published.
    pub fn submit_answer(&self, answer: NegotiationAnswer) -> Result<(), SignalingError> {
        if answer.description.is_empty() {
            return Err(SignalingError::MalformedAnswer(
                "empty session description".to_string(),
            ));
        }

        {
            let mut negotiation = self.lock();
            match negotiation.state {
                SignalingState::OfferReady => {}
                SignalingState::ApplyingAnswer | SignalingState::AnswerApplied => {
                    return Err(SignalingError::TransportRejected(
                        "an answer was already submitted".to_string(),
                    ))
                }
                state => {
                    return Err(SignalingError::TransportRejected(format!(
                        "no offer has been published (state {})",
                        state
                    )))
                }
            }
            negotiation.state = SignalingState::ApplyingAnswer;
        }

        // The lock is released while the transport blocks on the answer;
        // `ApplyingAnswer` keeps a concurrent second answer out.
        let applied = self.transport.apply_remote_answer(&answer);

        let mut negotiation = self.lock();
        match applied {
            Ok(()) => {
                negotiation.state = SignalingState::AnswerApplied;
                log::info!("Answer applied ({} type)", answer.kind);
                Ok(())
            }
            Err(e) => {
                log::warn!("Transport rejected answer: {}", e);
                negotiation.state = SignalingState::OfferReady;
                Err(SignalingError::TransportRejected(e.to_string()))
            }
        }
    }

    pub fn state(&self) -> SignalingState {
        self.lock().state
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackTransport;
    use crate::transport::SessionDescription;
    use std::time::Instant;

    #[test]
    fn test_start_publishes_offer() {
        let transport = Arc::new(LoopbackTransport::new());
        let coordinator = SignalingCoordinator::new(transport.clone());
        assert_eq!(coordinator.state(), SignalingState::Idle);

        coordinator.start().unwrap();
        assert_eq!(coordinator.state(), SignalingState::OfferReady);

        let offer = coordinator.await_offer(Duration::from_millis(10)).unwrap();
        assert_eq!(offer, transport.offer());
    }

    #[test]
    fn test_start_twice_fails() {
        let coordinator = SignalingCoordinator::new(Arc::new(LoopbackTransport::new()));
        coordinator.start().unwrap();
        assert!(matches!(
            coordinator.start(),
            Err(SignalingError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_gathering_failure_is_reported() {
        let transport = Arc::new(LoopbackTransport::new().failing_gathering());
        let coordinator = SignalingCoordinator::new(transport);
        assert!(matches!(
            coordinator.start(),
            Err(SignalingError::TransportRejected(_))
        ));
        assert_eq!(coordinator.state(), SignalingState::Idle);
    }

    #[test]
    fn test_await_offer_times_out() {
        let coordinator = SignalingCoordinator::new(Arc::new(LoopbackTransport::new().never_gathers()));
        coordinator.start().unwrap();

        let started = Instant::now();
        assert!(coordinator.await_offer(Duration::from_millis(100)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(coordinator.state(), SignalingState::Gathering);
    }

    #[test]
    fn test_answer_before_offer_is_rejected() {
        let transport = Arc::new(LoopbackTransport::new().never_gathers());
        let coordinator = SignalingCoordinator::new(transport.clone());
        coordinator.start().unwrap();

        let result = coordinator.submit_answer(SessionDescription::new("answer", "v=0"));
        assert!(matches!(result, Err(SignalingError::TransportRejected(_))));
        assert!(transport.applied_answers().is_empty());
    }

    #[test]
    fn test_empty_answer_is_malformed() {
        let coordinator = SignalingCoordinator::new(Arc::new(LoopbackTransport::new()));
        coordinator.start().unwrap();
        let result = coordinator.submit_answer(SessionDescription::new("answer", ""));
        assert!(matches!(result, Err(SignalingError::MalformedAnswer(_))));
        assert_eq!(coordinator.state(), SignalingState::OfferReady);
    }

    #[test]
    fn test_only_one_answer_applied() {
        let transport = Arc::new(LoopbackTransport::new());
        let coordinator = SignalingCoordinator::new(transport.clone());
        coordinator.start().unwrap();

        coordinator
            .submit_answer(SessionDescription::new("answer", "a=first"))
            .unwrap();
        assert_eq!(coordinator.state(), SignalingState::AnswerApplied);

        let second = coordinator.submit_answer(SessionDescription::new("answer", "a=second"));
        assert!(matches!(second, Err(SignalingError::TransportRejected(_))));
        assert_eq!(transport.applied_answers().len(), 1);
    }

    #[test]
    fn test_transport_rejection_keeps_offer_ready() {
        let transport = Arc::new(LoopbackTransport::new().rejecting_answers());
        let coordinator = SignalingCoordinator::new(transport);
        coordinator.start().unwrap();

        let result = coordinator.submit_answer(SessionDescription::new("answer", "a=0"));
        assert!(matches!(result, Err(SignalingError::TransportRejected(_))));
        assert_eq!(coordinator.state(), SignalingState::OfferReady);
    }

    #[test]
    fn test_coordinator_drop_disarms_callback() {
        let transport = Arc::new(LoopbackTransport::new().never_gathers());
        let coordinator = SignalingCoordinator::new(transport.clone());
        coordinator.start().unwrap();
        drop(coordinator);

        // Firing after the coordinator is gone must be harmless.
        transport.complete_gathering();
    }
}
