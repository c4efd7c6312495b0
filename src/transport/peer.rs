//! webrtc-rs backed transport
//!
//! One send-only-in-practice H.264 track on a single peer connection. All
//! async webrtc-rs calls are driven on the Tokio runtime handle the transport
//! was built with; the synchronous trait methods must therefore be called
//! from outside an async context (plain threads or `spawn_blocking`).

use super::{
    Delivery, GatheringCallback, MediaSink, SessionDescription, Transport, TransportError,
};
use crate::config::TransportConfig;
use crate::encode::EncodedUnit;
use crate::timing::MediaTimestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Payload type advertised for H.264
pub const H264_PAYLOAD_TYPE: u8 = 96;

const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

fn h264_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_owned(),
        rtcp_feedback: vec![],
    }
}

type DescriptionSlot = Arc<Mutex<Option<SessionDescription>>>;
type CallbackSlot = Arc<Mutex<Option<GatheringCallback>>>;

/// Peer connection with a single H.264 video track
pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    runtime: Handle,
    connected: Arc<AtomicBool>,
    local_description: DescriptionSlot,
    on_gathered: CallbackSlot,
}

impl WebRtcTransport {
    /// Build the peer connection and attach the video track.
    ///
    /// `runtime` must be a multi-threaded runtime; the synchronous trait
    /// methods block on it.
    pub async fn new(config: &TransportConfig, runtime: Handle) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: h264_capability(),
                payload_type: H264_PAYLOAD_TYPE,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let track = Arc::new(TrackLocalStaticSample::new(
            h264_capability(),
            "video".to_owned(),
            "crabcast-video".to_owned(),
        ));
        let rtp_sender = peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Interceptors (NACK, reports) only run while RTCP is being read.
        runtime.spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while rtp_sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        let connected = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&connected);
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                log::info!("Peer connection state: {}", state);
                match state {
                    RTCPeerConnectionState::Connected => flag.store(true, Ordering::Release),
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => flag.store(false, Ordering::Release),
                    _ => {}
                }
                Box::pin(async {})
            },
        ));

        peer_connection.on_ice_gathering_state_change(Box::new(
            move |state: RTCIceGathererState| {
                log::info!("ICE gathering state: {}", state);
                Box::pin(async {})
            },
        ));

        Ok(Self {
            peer_connection,
            track,
            runtime,
            connected,
            local_description: Arc::new(Mutex::new(None)),
            on_gathered: Arc::new(Mutex::new(None)),
        })
    }
}

impl Transport for WebRtcTransport {
    fn on_gathering_complete(&self, callback: GatheringCallback) {
        *self
            .on_gathered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn begin_gathering(&self) -> Result<(), TransportError> {
        let pc = Arc::clone(&self.peer_connection);

        // Offer creation errors are reported synchronously; only the wait for
        // gathering to finish runs in the background.
        let mut gather_complete = self.runtime.block_on(async {
            let offer = pc.create_offer(None).await?;
            let gather_complete = pc.gathering_complete_promise().await;
            pc.set_local_description(offer).await?;
            Ok::<_, TransportError>(gather_complete)
        })?;

        log::info!("Candidate gathering started");

        let local = Arc::clone(&self.local_description);
        let on_gathered = Arc::clone(&self.on_gathered);
        self.runtime.spawn(async move {
            let _ = gather_complete.recv().await;

            let Some(description) = pc.local_description().await else {
                log::error!("Gathering completed without a local description");
                return;
            };
            *local.lock().unwrap_or_else(PoisonError::into_inner) = Some(SessionDescription {
                kind: description.sdp_type.to_string(),
                description: description.sdp,
            });

            let callback = on_gathered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match callback {
                Some(callback) => callback(),
                None => log::warn!("Gathering completed with no listener registered"),
            }
        });

        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local_description
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_remote_answer(&self, answer: &SessionDescription) -> Result<(), TransportError> {
        // Answers only arrive while our offer is pending, so any label other
        // than a provisional answer is read as a final answer.
        let description = match answer.kind.as_str() {
            "pranswer" => RTCSessionDescription::pranswer(answer.description.clone())?,
            "offer" | "rollback" => {
                return Err(TransportError::Negotiation(format!(
                    "'{}' description cannot answer a local offer",
                    answer.kind
                )))
            }
            _ => RTCSessionDescription::answer(answer.description.clone())?,
        };

        self.runtime
            .block_on(self.peer_connection.set_remote_description(description))?;
        log::info!("Remote answer applied");
        Ok(())
    }

    fn open_media_sink(&self) -> Arc<dyn MediaSink> {
        Arc::new(TrackSink {
            track: Arc::clone(&self.track),
            runtime: self.runtime.clone(),
            connected: Arc::clone(&self.connected),
            last_sent: Mutex::new(None),
        })
    }

    fn is_media_sink_open(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::Release);
        self.runtime.block_on(self.peer_connection.close())?;
        log::info!("Peer connection closed");
        Ok(())
    }
}

/// Media sink writing samples to the video track
struct TrackSink {
    track: Arc<TrackLocalStaticSample>,
    runtime: Handle,
    connected: Arc<AtomicBool>,
    /// Timestamp of the last unit written to the track
    last_sent: Mutex<Option<MediaTimestamp>>,
}

/// RTP duration of a sample.
///
/// Spans the gap since the previous written unit so frames the encoder
/// skipped keep their place on the wire timeline.
fn sample_duration(last_sent: Option<MediaTimestamp>, unit: &EncodedUnit) -> Duration {
    match last_sent {
        Some(last) if unit.timestamp > last => {
            Duration::from_nanos(unit.timestamp.as_nanos() - last.as_nanos())
        }
        _ => unit.duration,
    }
}

impl MediaSink for TrackSink {
    fn is_open(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, unit: EncodedUnit) -> Delivery {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_open() {
            *last_sent = None;
            return Delivery::Dropped;
        }

        let duration = sample_duration(*last_sent, &unit);
        let sample = Sample {
            data: unit.data,
            duration,
            ..Default::default()
        };

        match self.runtime.block_on(self.track.write_sample(&sample)) {
            Ok(()) => {
                *last_sent = Some(unit.timestamp);
                Delivery::Sent
            }
            Err(e) => {
                log::warn!("Failed to write sample at {}: {}", unit.timestamp, e);
                Delivery::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_h264_capability() {
        let capability = h264_capability();
        assert_eq!(capability.mime_type, MIME_TYPE_H264);
        assert_eq!(capability.clock_rate, 90000);
        assert!(capability.sdp_fmtp_line.contains("packetization-mode=1"));
    }

    #[test]
    fn test_sink_closed_until_connected() {
        let rt = runtime();
        let transport = rt
            .block_on(WebRtcTransport::new(
                &TransportConfig::default(),
                rt.handle().clone(),
            ))
            .unwrap();

        assert!(!transport.is_media_sink_open());
        let sink = transport.open_media_sink();
        let unit = EncodedUnit {
            data: bytes::Bytes::from_static(&[0, 0, 0, 1, 0x65]),
            timestamp: crate::timing::MediaTimestamp::ZERO,
            duration: Duration::from_millis(33),
            keyframe: true,
        };
        assert_eq!(sink.send(unit), Delivery::Dropped);
        transport.close().unwrap();
    }

    fn unit_at(millis: u64) -> EncodedUnit {
        EncodedUnit {
            data: bytes::Bytes::from_static(&[0, 0, 0, 1, 0x41]),
            timestamp: MediaTimestamp::from_nanos(millis * 1_000_000),
            duration: Duration::from_millis(33),
            keyframe: false,
        }
    }

    #[test]
    fn test_sample_duration_spans_skipped_frames() {
        assert_eq!(sample_duration(None, &unit_at(0)), Duration::from_millis(33));
        // Two frames skipped by the encoder between 33 ms and 132 ms.
        assert_eq!(
            sample_duration(Some(MediaTimestamp::from_nanos(33_000_000)), &unit_at(132)),
            Duration::from_millis(99)
        );
        assert_eq!(
            sample_duration(Some(MediaTimestamp::from_nanos(66_000_000)), &unit_at(66)),
            Duration::from_millis(33)
        );
    }

    #[test]
    fn test_any_answer_label_reaches_the_peer_connection() {
        let rt = runtime();
        let transport = rt
            .block_on(WebRtcTransport::new(
                &TransportConfig::default(),
                rt.handle().clone(),
            ))
            .unwrap();

        // With no local offer the peer connection itself refuses the answer;
        // the label is never the reason.
        for kind in ["video", "answer", ""] {
            let result = transport.apply_remote_answer(&SessionDescription::new(kind, "v=0"));
            assert!(
                !matches!(result, Err(TransportError::Negotiation(_))),
                "'{}' rejected by label: {:?}",
                kind,
                result
            );
        }

        for kind in ["offer", "rollback"] {
            let result = transport.apply_remote_answer(&SessionDescription::new(kind, "v=0"));
            assert!(matches!(result, Err(TransportError::Negotiation(_))));
        }
        transport.close().unwrap();
    }

    #[test]
    #[ignore = "Requires local network interfaces for ICE gathering"]
    fn test_gathering_produces_h264_offer() {
        let rt = runtime();
        let transport = rt
            .block_on(WebRtcTransport::new(
                &TransportConfig::default(),
                rt.handle().clone(),
            ))
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        transport.on_gathering_complete(Box::new(move || {
            let _ = tx.send(());
        }));
        transport.begin_gathering().unwrap();
        rx.recv_timeout(Duration::from_secs(10)).unwrap();

        let offer = transport.local_description().unwrap();
        assert_eq!(offer.kind, "offer");
        assert!(offer.description.starts_with("v=0"));
        assert!(offer.description.contains("m=video"));
        assert!(offer.description.contains("H264/90000"));
    }
}
