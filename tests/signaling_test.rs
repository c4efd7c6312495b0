//! Negotiation behaviour of the signaling coordinator against a loopback
//! transport.

use crabcast::signaling::{parse_answer, SignalingCoordinator, SignalingError, SignalingState};
use crabcast::testing::LoopbackTransport;
use crabcast::transport::SessionDescription;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_offer_retrieval_is_idempotent() {
    let coordinator = SignalingCoordinator::new(Arc::new(LoopbackTransport::new()));
    coordinator.start().unwrap();

    let first = coordinator.await_offer(Duration::from_millis(50)).unwrap();
    let second = coordinator.await_offer(Duration::from_millis(50)).unwrap();
    assert_eq!(first, second);
    assert_eq!(coordinator.state(), SignalingState::OfferReady);
}

#[test]
fn test_concurrent_waiters_all_receive_offer() {
    let transport = Arc::new(LoopbackTransport::new().gathering_after(Duration::from_millis(150)));
    let coordinator = SignalingCoordinator::new(transport.clone());

    let waiters = 8;
    let barrier = Arc::new(Barrier::new(waiters + 1));
    let handles: Vec<_> = (0..waiters)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coordinator.await_offer(Duration::from_secs(5))
            })
        })
        .collect();

    barrier.wait();
    coordinator.start().unwrap();

    for handle in handles {
        let offer = handle.join().unwrap().expect("waiter timed out");
        assert_eq!(offer, transport.offer());
    }
}

#[test]
fn test_waiter_wakes_when_gathering_completes() {
    let transport = Arc::new(LoopbackTransport::new().never_gathers());
    let coordinator = SignalingCoordinator::new(transport.clone());
    coordinator.start().unwrap();

    let waiter = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || {
            let started = Instant::now();
            let offer = coordinator.await_offer(Duration::from_secs(5));
            (offer, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    transport.complete_gathering();

    let (offer, waited) = waiter.join().unwrap();
    assert!(offer.is_some());
    assert!(waited < Duration::from_secs(2), "waiter slept {:?}", waited);
}

#[test]
fn test_offer_timeout_is_bounded() {
    let coordinator =
        SignalingCoordinator::new(Arc::new(LoopbackTransport::new().never_gathers()));
    coordinator.start().unwrap();

    let timeout = Duration::from_secs(5);
    let started = Instant::now();
    let offer = coordinator.await_offer(timeout);
    let elapsed = started.elapsed();

    assert!(offer.is_none());
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(
        elapsed < timeout + Duration::from_secs(1),
        "overshot: {:?}",
        elapsed
    );
}

#[test]
fn test_negotiation_scenario() {
    let transport = Arc::new(LoopbackTransport::new());
    let coordinator = SignalingCoordinator::new(transport.clone());
    coordinator.start().unwrap();

    let offer = coordinator.await_offer(Duration::from_secs(1)).unwrap();
    assert_eq!(offer.kind, "video");
    assert!(offer.description.starts_with("v=0"));

    let answer = parse_answer(br#"{"type":"video","sdp":"a=0\r\n"}"#).unwrap();
    coordinator.submit_answer(answer).unwrap();
    assert_eq!(coordinator.state(), SignalingState::AnswerApplied);
    assert_eq!(
        transport.applied_answers(),
        vec![SessionDescription::new("video", "a=0\r\n")]
    );

    assert!(matches!(
        parse_answer(b"{}"),
        Err(SignalingError::MalformedAnswer(_))
    ));
}

#[test]
fn test_concurrent_answers_apply_once() {
    let transport = Arc::new(LoopbackTransport::new());
    let coordinator = SignalingCoordinator::new(transport.clone());
    coordinator.start().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                coordinator.submit_answer(SessionDescription::new("answer", format!("a={}", n)))
            })
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(Result::is_ok)
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(transport.applied_answers().len(), 1);
}

#[test]
fn test_state_readable_while_answer_applies() {
    let transport = Arc::new(LoopbackTransport::new().slow_answers(Duration::from_millis(400)));
    let coordinator = SignalingCoordinator::new(transport.clone());
    coordinator.start().unwrap();

    let submitter = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || coordinator.submit_answer(SessionDescription::new("answer", "a=0")))
    };

    let deadline = Instant::now() + Duration::from_secs(2);
    while coordinator.state() != SignalingState::ApplyingAnswer {
        assert!(Instant::now() < deadline, "answer never started applying");
        thread::sleep(Duration::from_millis(5));
    }

    let started = Instant::now();
    assert_eq!(coordinator.state(), SignalingState::ApplyingAnswer);
    assert!(coordinator.await_offer(Duration::from_millis(10)).is_some());
    assert!(started.elapsed() < Duration::from_millis(200));

    let second = coordinator.submit_answer(SessionDescription::new("answer", "a=1"));
    assert!(matches!(second, Err(SignalingError::TransportRejected(_))));

    submitter.join().unwrap().unwrap();
    assert_eq!(coordinator.state(), SignalingState::AnswerApplied);
    assert_eq!(transport.applied_answers().len(), 1);
}

#[test]
fn test_custom_offer_is_published_once() {
    let offer = SessionDescription::new("offer", "v=0\r\ns=custom\r\n");
    let transport = Arc::new(LoopbackTransport::new().with_offer(offer.clone()));
    let coordinator = SignalingCoordinator::new(transport.clone());
    coordinator.start().unwrap();
    assert!(coordinator.start().is_err());

    assert_eq!(coordinator.await_offer(Duration::from_millis(50)), Some(offer));
    assert_eq!(transport.gathering_started(), 1);
}
