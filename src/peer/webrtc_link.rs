//! [`PeerLink`] over the `webrtc` crate.
//!
//! Local tracks are bound as `TrackLocalStaticSample`s (Opus for audio, VP8
//! for video) so they negotiate a sender; encoded media is not written here.
//! Remote track end is not detected here; remote tracks leave the composite
//! when the link closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::aggregator::{RemoteStream, RemoteTrack};
use crate::log::LogSink;
use crate::media::{MediaKind, MediaTrack};
use crate::peer::{
    ConnectionState, IceCandidate, NegotiationError, PeerLink, PeerLinkConfig, PeerLinkEvent,
    PeerLinkEventHandler, PeerLinkFactory, SdpType, SenderId, SessionDescription,
    SignalingState,
};
use crate::sink_debug;

fn backend(e: webrtc::Error) -> NegotiationError {
    NegotiationError::Backend(e.to_string())
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
    let parsed = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    parsed.map_err(|e| NegotiationError::Malformed(e.to_string()))
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription, NegotiationError> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(NegotiationError::Backend(format!(
            "unsupported description type {other}"
        ))),
    }
}

fn signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
            SignalingState::HaveLocalOffer
        }
        RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
            SignalingState::HaveRemoteOffer
        }
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => ConnectionState::New,
    }
}

fn sample_track(track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
    let capability = match track.kind() {
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
    };
    Arc::new(TrackLocalStaticSample::new(
        capability,
        track.id().to_owned(),
        "rustycall".to_owned(),
    ))
}

/// One `RTCPeerConnection`.
pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    has_remote: AtomicBool,
    next_sender: Mutex<u64>,
    senders: Mutex<HashMap<SenderId, Arc<RTCRtpSender>>>,
    logger: Arc<dyn LogSink>,
}

impl WebRtcLink {
    fn wire_events(pc: &RTCPeerConnection, events: &PeerLinkEventHandler) {
        let on_candidate = Arc::clone(events);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(init) = candidate.and_then(|c| c.to_json().ok()) {
                on_candidate(PeerLinkEvent::IceCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                }));
            }
            Box::pin(async {})
        }));

        let on_state = Arc::clone(events);
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            on_state(PeerLinkEvent::ConnectionState(connection_state(s)));
            Box::pin(async {})
        }));

        let on_signaling = Arc::clone(events);
        pc.on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
            on_signaling(PeerLinkEvent::SignalingState(signaling_state(s)));
            Box::pin(async {})
        }));

        let on_track = Arc::clone(events);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Video => MediaKind::Video,
                    _ => MediaKind::Audio,
                };
                on_track(PeerLinkEvent::Track {
                    track: RemoteTrack::new(track.id(), kind),
                    stream: RemoteStream::new(track.stream_id()),
                });
                Box::pin(async {})
            },
        ));
    }

    fn sender(&self, id: SenderId) -> Result<Arc<RTCRtpSender>, NegotiationError> {
        self.senders
            .lock()
            .get(&id)
            .cloned()
            .ok_or(NegotiationError::UnknownSender(id.0))
    }

    fn bind_samples(track: &MediaTrack) -> Arc<dyn TrackLocal + Send + Sync> {
        sample_track(track)
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        from_rtc(self.pc.create_offer(None).await.map_err(backend)?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        from_rtc(self.pc.create_answer(None).await.map_err(backend)?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.pc
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(backend)
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.pc
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(|e| NegotiationError::Rejected(e.to_string()))?;
        self.has_remote.store(true, Ordering::Release);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc.add_ice_candidate(init).await.map_err(backend)
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, NegotiationError> {
        let local = Self::bind_samples(track);
        let sender = self.pc.add_track(local).await.map_err(backend)?;
        let id = {
            let mut next = self.next_sender.lock();
            *next += 1;
            SenderId(*next)
        };
        self.senders.lock().insert(id, sender);
        Ok(id)
    }

    async fn replace_track(
        &self,
        sender: SenderId,
        track: Option<&MediaTrack>,
    ) -> Result<(), NegotiationError> {
        let rtp_sender = self.sender(sender)?;
        let local = track.map(Self::bind_samples);
        rtp_sender.replace_track(local).await.map_err(backend)
    }

    async fn remove_track(&self, sender: SenderId) -> Result<(), NegotiationError> {
        let rtp_sender = self.sender(sender)?;
        self.pc.remove_track(&rtp_sender).await.map_err(backend)?;
        self.senders.lock().remove(&sender);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        signaling_state(self.pc.signaling_state())
    }

    fn has_remote_description(&self) -> bool {
        self.has_remote.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            sink_debug!(self.logger, "[webrtc] close: {}", e);
        }
        self.senders.lock().clear();
    }
}

/// Builds [`WebRtcLink`]s from one shared `webrtc` API instance.
pub struct WebRtcLinkFactory {
    api: API,
    logger: Arc<dyn LogSink>,
}

impl WebRtcLinkFactory {
    /// Registers the default codecs and interceptors.
    ///
    /// # Errors
    /// `Backend` if the media engine cannot be set up.
    pub fn new(logger: Arc<dyn LogSink>) -> Result<Self, NegotiationError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(backend)?;
        let registry =
            register_default_interceptors(Registry::new(), &mut media_engine).map_err(backend)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        Ok(Self { api, logger })
    }
}

#[async_trait]
impl PeerLinkFactory for WebRtcLinkFactory {
    async fn create(
        &self,
        config: &PeerLinkConfig,
        events: PeerLinkEventHandler,
    ) -> Result<Arc<dyn PeerLink>, NegotiationError> {
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(backend)?,
        );
        WebRtcLink::wire_events(&pc, &events);
        Ok(Arc::new(WebRtcLink {
            pc,
            has_remote: AtomicBool::new(false),
            next_sender: Mutex::new(0),
            senders: Mutex::new(HashMap::new()),
            logger: Arc::clone(&self.logger),
        }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;

    #[tokio::test]
    async fn closed_link_drops_its_senders() {
        let factory = WebRtcLinkFactory::new(Arc::new(NoopLogSink)).unwrap();
        let link = factory
            .create(&PeerLinkConfig::default(), Arc::new(|_| {}))
            .await
            .unwrap();
        let track = MediaTrack::new(MediaKind::Audio, "mic", None);
        let sender = link.add_track(&track).await.unwrap();

        link.close().await;
        link.close().await;

        assert_eq!(link.signaling_state(), SignalingState::Closed);
        assert_eq!(
            link.remove_track(sender).await,
            Err(NegotiationError::UnknownSender(sender.0))
        );
    }
}
