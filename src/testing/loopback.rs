//! In-process transport double

use crate::encode::EncodedUnit;
use crate::transport::{
    Delivery, GatheringCallback, MediaSink, SessionDescription, Transport, TransportError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const LOOPBACK_SDP: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=rtpmap:96 H264/90000\r\n";

#[derive(Debug, Clone, Copy)]
enum GatheringMode {
    /// Completes inside `begin_gathering`
    Immediate,
    /// Completes on a helper thread after a delay
    After(Duration),
    /// Completes only when `complete_gathering` is called
    Manual,
}

#[derive(Default)]
struct GatheringSlots {
    published: Mutex<Option<SessionDescription>>,
    callback: Mutex<Option<GatheringCallback>>,
}

impl GatheringSlots {
    fn complete(&self, offer: SessionDescription) {
        *self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(offer);
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Transport that negotiates with itself
///
/// Publishes a canned offer, records applied answers and exposes a
/// [`LoopbackSink`] whose open flag is set by the test.
pub struct LoopbackTransport {
    offer: SessionDescription,
    mode: GatheringMode,
    fail_gathering: bool,
    reject_answers: bool,
    answer_delay: Duration,
    slots: Arc<GatheringSlots>,
    answers: Mutex<Vec<SessionDescription>>,
    sink: Arc<LoopbackSink>,
    gathering_started: AtomicUsize,
    closed: AtomicBool,
}

impl LoopbackTransport {
    /// Offer `{"type": "video", "sdp": "v=0..."}`, published as soon as
    /// gathering begins
    pub fn new() -> Self {
        Self {
            offer: SessionDescription::new("video", LOOPBACK_SDP),
            mode: GatheringMode::Immediate,
            fail_gathering: false,
            reject_answers: false,
            answer_delay: Duration::ZERO,
            slots: Arc::new(GatheringSlots::default()),
            answers: Mutex::new(Vec::new()),
            sink: Arc::new(LoopbackSink::new()),
            gathering_started: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_offer(mut self, offer: SessionDescription) -> Self {
        self.offer = offer;
        self
    }

    pub fn gathering_after(mut self, delay: Duration) -> Self {
        self.mode = GatheringMode::After(delay);
        self
    }

    /// Leave gathering pending until [`LoopbackTransport::complete_gathering`]
    pub fn never_gathers(mut self) -> Self {
        self.mode = GatheringMode::Manual;
        self
    }

    pub fn failing_gathering(mut self) -> Self {
        self.fail_gathering = true;
        self
    }

    pub fn rejecting_answers(mut self) -> Self {
        self.reject_answers = true;
        self
    }

    /// Block inside `apply_remote_answer` for `delay`, like a transport
    /// waiting on its network stack
    pub fn slow_answers(mut self, delay: Duration) -> Self {
        self.answer_delay = delay;
        self
    }

    /// Finish gathering now, firing the registered callback
    pub fn complete_gathering(&self) {
        self.slots.complete(self.offer.clone());
    }

    pub fn offer(&self) -> SessionDescription {
        self.offer.clone()
    }

    pub fn applied_answers(&self) -> Vec<SessionDescription> {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sink(&self) -> Arc<LoopbackSink> {
        Arc::clone(&self.sink)
    }

    pub fn gathering_started(&self) -> usize {
        self.gathering_started.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn on_gathering_complete(&self, callback: GatheringCallback) {
        *self
            .slots
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn begin_gathering(&self) -> Result<(), TransportError> {
        if self.fail_gathering {
            return Err(TransportError::Setup("loopback gathering disabled".to_string()));
        }
        self.gathering_started.fetch_add(1, Ordering::SeqCst);

        match self.mode {
            GatheringMode::Immediate => self.complete_gathering(),
            GatheringMode::After(delay) => {
                let slots = Arc::clone(&self.slots);
                let offer = self.offer.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    slots.complete(offer);
                });
            }
            GatheringMode::Manual => {}
        }
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.slots
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_remote_answer(&self, answer: &SessionDescription) -> Result<(), TransportError> {
        if !self.answer_delay.is_zero() {
            std::thread::sleep(self.answer_delay);
        }
        if self.reject_answers {
            return Err(TransportError::Negotiation(
                "loopback rejects all answers".to_string(),
            ));
        }
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(answer.clone());
        Ok(())
    }

    fn open_media_sink(&self) -> Arc<dyn MediaSink> {
        self.sink.clone()
    }

    fn is_media_sink_open(&self) -> bool {
        self.sink.is_open()
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.sink.set_open(false);
        Ok(())
    }
}

/// Sink recording every unit it accepts
pub struct LoopbackSink {
    open: AtomicBool,
    received: Mutex<Vec<EncodedUnit>>,
}

impl LoopbackSink {
    /// Starts closed
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<EncodedUnit> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for LoopbackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSink for LoopbackSink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, unit: EncodedUnit) -> Delivery {
        if !self.is_open() {
            return Delivery::Dropped;
        }
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unit);
        Delivery::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::MediaTimestamp;
    use bytes::Bytes;

    fn unit() -> EncodedUnit {
        EncodedUnit {
            data: Bytes::from_static(b"unit"),
            timestamp: MediaTimestamp::ZERO,
            duration: Duration::from_millis(33),
            keyframe: false,
        }
    }

    #[test]
    fn test_sink_drops_while_closed() {
        let sink = LoopbackSink::new();
        assert_eq!(sink.send(unit()), Delivery::Dropped);
        sink.set_open(true);
        assert_eq!(sink.send(unit()), Delivery::Sent);
        assert_eq!(sink.received().len(), 1);
    }

    #[test]
    fn test_delayed_gathering_fires_callback() {
        let transport = LoopbackTransport::new().gathering_after(Duration::from_millis(20));
        let (tx, rx) = std::sync::mpsc::channel();
        transport.on_gathering_complete(Box::new(move || tx.send(()).unwrap()));
        transport.begin_gathering().unwrap();

        assert!(transport.local_description().is_none());
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(transport.local_description(), Some(transport.offer()));
    }

    #[test]
    fn test_close_closes_sink() {
        let transport = LoopbackTransport::new();
        transport.sink().set_open(true);
        assert!(transport.is_media_sink_open());
        transport.close().unwrap();
        assert!(!transport.is_media_sink_open());
        assert!(transport.is_closed());
    }
}
