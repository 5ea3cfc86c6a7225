use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::aggregator::{RemoteStream, RemoteTrack};
use crate::media::{MediaKind, MediaTrack};
use crate::peer::{
    ConnectionState, IceCandidate, NegotiationError, PeerLink, PeerLinkConfig, PeerLinkEvent,
    PeerLinkEventHandler, PeerLinkFactory, SdpType, SenderId, SessionDescription,
    SignalingState,
};

#[derive(Debug, Clone)]
struct Sender {
    kind: MediaKind,
    track_id: String,
}

struct LinkState {
    signaling: SignalingState,
    has_local: bool,
    has_remote: bool,
    version: u64,
    next_sender: u64,
    senders: BTreeMap<SenderId, Sender>,
    applied: Vec<IceCandidate>,
    remote_tracks: HashMap<MediaKind, RemoteTrack>,
    candidate_sent: bool,
    connected: bool,
    fail_replace: bool,
}

/// In-memory peer link with real offer/answer state rules.
///
/// Descriptions it creates list one `m=` line per sender kind. Applying a
/// remote description made by another `SimPeerLink` raises `Track` and
/// `TrackEnded` events for the kinds the other side added or dropped, so two
/// sim links wired through signaling behave like a connected pair.
/// Descriptions whose sdp starts with `bad` are rejected as malformed,
/// candidates starting with `bad` are refused.
pub struct SimPeerLink {
    id: String,
    events: PeerLinkEventHandler,
    state: Mutex<LinkState>,
}

impl SimPeerLink {
    pub fn new(events: PeerLinkEventHandler) -> Self {
        Self {
            id: format!("sim{:08x}", rand::random::<u32>()),
            events,
            state: Mutex::new(LinkState {
                signaling: SignalingState::Stable,
                has_local: false,
                has_remote: false,
                version: 0,
                next_sender: 1,
                senders: BTreeMap::new(),
                applied: Vec::new(),
                remote_tracks: HashMap::new(),
                candidate_sent: false,
                connected: false,
                fail_replace: false,
            }),
        }
    }

    /// A link whose events go nowhere.
    #[must_use]
    pub fn detached() -> Arc<Self> {
        Arc::new(Self::new(Arc::new(|_| {})))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().applied.clone()
    }

    #[must_use]
    pub fn sender_count(&self, kind: MediaKind) -> usize {
        self.state
            .lock()
            .senders
            .values()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Id of the track currently sent on the `kind` sender.
    #[must_use]
    pub fn sent_track(&self, kind: MediaKind) -> Option<String> {
        self.state
            .lock()
            .senders
            .values()
            .find(|s| s.kind == kind)
            .map(|s| s.track_id.clone())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().signaling == SignalingState::Closed
    }

    pub fn fail_replace_track(&self, fail: bool) {
        self.state.lock().fail_replace = fail;
    }

    /// Raises a `Track` event as if the remote side sent a track on `stream_id`.
    pub fn emit_remote_track(&self, stream_id: &str, kind: MediaKind) -> RemoteTrack {
        let track = RemoteTrack::new(format!("{stream_id}-{}", rand::random::<u32>()), kind);
        (self.events)(PeerLinkEvent::Track {
            track: track.clone(),
            stream: RemoteStream::new(stream_id),
        });
        track
    }

    pub fn end_remote_track(&self, track_id: &str) {
        (self.events)(PeerLinkEvent::TrackEnded {
            track_id: track_id.to_owned(),
        });
    }

    pub fn emit_local_candidate(&self, candidate: IceCandidate) {
        (self.events)(PeerLinkEvent::IceCandidate(candidate));
    }

    pub fn emit_connection_state(&self, state: ConnectionState) {
        (self.events)(PeerLinkEvent::ConnectionState(state));
    }

    /// Moves the link to `state` on its own, the way a backend settles an
    /// offer/answer round outside the caller's view, and raises the event.
    pub fn settle_signaling(&self, state: SignalingState) {
        self.state.lock().signaling = state;
        (self.events)(PeerLinkEvent::SignalingState(state));
    }

    fn describe(&self, st: &mut LinkState, sdp_type: SdpType) -> SessionDescription {
        st.version += 1;
        let mut sdp = format!("v=0\r\no=sim {} {}\r\ns=-\r\n", self.id, st.version);
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if st.senders.values().any(|s| s.kind == kind) {
                sdp.push_str(&format!("m={kind}\r\n"));
            }
        }
        SessionDescription { sdp_type, sdp }
    }

    fn open(&self) -> Result<parking_lot::MutexGuard<'_, LinkState>, NegotiationError> {
        let st = self.state.lock();
        if st.signaling == SignalingState::Closed {
            return Err(NegotiationError::Closed);
        }
        Ok(st)
    }

    /// Raises `events` after the state lock is released.
    fn raise(&self, events: Vec<PeerLinkEvent>) {
        for event in events {
            (self.events)(event);
        }
    }

    fn after_description(&self, st: &mut LinkState, events: &mut Vec<PeerLinkEvent>) {
        if st.has_local && st.has_remote && !st.connected && st.signaling.is_stable() {
            st.connected = true;
            events.push(PeerLinkEvent::ConnectionState(ConnectionState::Connecting));
            events.push(PeerLinkEvent::ConnectionState(ConnectionState::Connected));
        }
    }

    /// Diffs the remote side's media lines against the tracks already raised.
    fn sync_remote_tracks(st: &mut LinkState, sdp: &str, events: &mut Vec<PeerLinkEvent>) {
        let Some(origin) = sdp
            .lines()
            .find_map(|l| l.strip_prefix("o=sim "))
            .and_then(|rest| rest.split_whitespace().next())
        else {
            return;
        };
        let offered: Vec<MediaKind> = [MediaKind::Audio, MediaKind::Video]
            .into_iter()
            .filter(|k| sdp.lines().any(|l| l == format!("m={k}")))
            .collect();

        for kind in &offered {
            if st.remote_tracks.contains_key(kind) {
                continue;
            }
            let track = RemoteTrack::new(format!("{origin}-{kind}"), *kind);
            st.remote_tracks.insert(*kind, track.clone());
            events.push(PeerLinkEvent::Track {
                track,
                stream: RemoteStream::new(format!("stream-{origin}")),
            });
        }
        let gone: Vec<MediaKind> = st
            .remote_tracks
            .keys()
            .filter(|k| !offered.contains(k))
            .copied()
            .collect();
        for kind in gone {
            if let Some(track) = st.remote_tracks.remove(&kind) {
                events.push(PeerLinkEvent::TrackEnded {
                    track_id: track.id().to_owned(),
                });
            }
        }
    }
}

#[async_trait]
impl PeerLink for SimPeerLink {
    async fn create_offer(&self) -> Result<SessionDescription, NegotiationError> {
        let mut st = self.open()?;
        if !st.signaling.is_stable() {
            return Err(NegotiationError::InvalidState {
                op: "create offer",
                state: st.signaling,
            });
        }
        Ok(self.describe(&mut st, SdpType::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let mut st = self.open()?;
        if st.signaling != SignalingState::HaveRemoteOffer {
            return Err(NegotiationError::InvalidState {
                op: "create answer",
                state: st.signaling,
            });
        }
        Ok(self.describe(&mut st, SdpType::Answer))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        let mut events = Vec::new();
        {
            let mut st = self.open()?;
            let next = match (desc.sdp_type, st.signaling) {
                (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveLocalOffer,
                (SdpType::Answer, SignalingState::HaveRemoteOffer) => SignalingState::Stable,
                (_, state) => {
                    return Err(NegotiationError::InvalidState {
                        op: "set local description",
                        state,
                    });
                }
            };
            st.signaling = next;
            st.has_local = true;
            events.push(PeerLinkEvent::SignalingState(next));
            if !st.candidate_sent {
                st.candidate_sent = true;
                events.push(PeerLinkEvent::IceCandidate(
                    IceCandidate::new(format!(
                        "candidate:1 1 udp 2130706431 127.0.0.1 {} typ host",
                        40000 + st.version
                    ))
                    .with_mid("0", 0),
                ));
            }
            self.after_description(&mut st, &mut events);
        }
        self.raise(events);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if desc.sdp.starts_with("bad") {
            return Err(NegotiationError::Malformed(desc.sdp));
        }
        let mut events = Vec::new();
        {
            let mut st = self.open()?;
            let next = match (desc.sdp_type, st.signaling) {
                (SdpType::Offer, SignalingState::Stable) => SignalingState::HaveRemoteOffer,
                (SdpType::Answer, SignalingState::HaveLocalOffer) => SignalingState::Stable,
                (_, state) => {
                    return Err(NegotiationError::InvalidState {
                        op: "set remote description",
                        state,
                    });
                }
            };
            st.signaling = next;
            st.has_remote = true;
            events.push(PeerLinkEvent::SignalingState(next));
            Self::sync_remote_tracks(&mut st, &desc.sdp, &mut events);
            self.after_description(&mut st, &mut events);
        }
        self.raise(events);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), NegotiationError> {
        let mut st = self.open()?;
        if !st.has_remote {
            return Err(NegotiationError::InvalidState {
                op: "add ice candidate",
                state: st.signaling,
            });
        }
        if candidate.candidate.starts_with("bad") {
            return Err(NegotiationError::Rejected(candidate.candidate));
        }
        st.applied.push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<SenderId, NegotiationError> {
        let mut st = self.open()?;
        if st.senders.values().any(|s| s.kind == track.kind()) {
            return Err(NegotiationError::Binding(format!(
                "{} sender already exists",
                track.kind()
            )));
        }
        let id = SenderId(st.next_sender);
        st.next_sender += 1;
        st.senders.insert(
            id,
            Sender {
                kind: track.kind(),
                track_id: track.id().to_owned(),
            },
        );
        Ok(id)
    }

    async fn replace_track(
        &self,
        sender: SenderId,
        track: Option<&MediaTrack>,
    ) -> Result<(), NegotiationError> {
        let mut st = self.open()?;
        if st.fail_replace {
            return Err(NegotiationError::Backend("replace_track refused".into()));
        }
        let slot = st
            .senders
            .get_mut(&sender)
            .ok_or(NegotiationError::UnknownSender(sender.0))?;
        match track {
            Some(t) if t.kind() != slot.kind => Err(NegotiationError::Binding(format!(
                "{} track on a {} sender",
                t.kind(),
                slot.kind
            ))),
            Some(t) => {
                slot.track_id = t.id().to_owned();
                Ok(())
            }
            None => {
                slot.track_id.clear();
                Ok(())
            }
        }
    }

    async fn remove_track(&self, sender: SenderId) -> Result<(), NegotiationError> {
        let mut st = self.open()?;
        st.senders
            .remove(&sender)
            .map(|_| ())
            .ok_or(NegotiationError::UnknownSender(sender.0))
    }

    fn signaling_state(&self) -> SignalingState {
        self.state.lock().signaling
    }

    fn has_remote_description(&self) -> bool {
        self.state.lock().has_remote
    }

    async fn close(&self) {
        let was_open = {
            let mut st = self.state.lock();
            let was_open = st.signaling != SignalingState::Closed;
            st.signaling = SignalingState::Closed;
            st.senders.clear();
            was_open
        };
        if was_open {
            self.raise(vec![
                PeerLinkEvent::SignalingState(SignalingState::Closed),
                PeerLinkEvent::ConnectionState(ConnectionState::Closed),
            ]);
        }
    }
}

/// Factory handing out [`SimPeerLink`]s and keeping them for inspection.
#[derive(Default)]
pub struct SimPeerLinkFactory {
    created: Mutex<Vec<Arc<SimPeerLink>>>,
    configs: Mutex<Vec<PeerLinkConfig>>,
    fail: Mutex<bool>,
}

impl SimPeerLinkFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    #[must_use]
    pub fn created(&self) -> Vec<Arc<SimPeerLink>> {
        self.created.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Arc<SimPeerLink>> {
        self.created.lock().last().cloned()
    }

    #[must_use]
    pub fn last_config(&self) -> Option<PeerLinkConfig> {
        self.configs.lock().last().cloned()
    }
}

#[async_trait]
impl PeerLinkFactory for SimPeerLinkFactory {
    async fn create(
        &self,
        config: &PeerLinkConfig,
        events: PeerLinkEventHandler,
    ) -> Result<Arc<dyn PeerLink>, NegotiationError> {
        if *self.fail.lock() {
            return Err(NegotiationError::Backend("link creation refused".into()));
        }
        let link = Arc::new(SimPeerLink::new(events));
        self.created.lock().push(Arc::clone(&link));
        self.configs.lock().push(config.clone());
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    fn recording() -> (Arc<SimPeerLink>, Arc<Mutex<Vec<PeerLinkEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let link = Arc::new(SimPeerLink::new(Arc::new(move |e| sink.lock().push(e))));
        (link, seen)
    }

    #[tokio::test]
    async fn answer_before_offer_is_refused() {
        let link = SimPeerLink::detached();
        let err = link.create_answer().await.unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidState { .. }));
        let err = link
            .set_remote_description(SessionDescription::answer("v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn offer_media_lines_become_remote_tracks() {
        let caller = SimPeerLink::detached();
        caller
            .add_track(&MediaTrack::new(MediaKind::Audio, "mic", None))
            .await
            .unwrap();
        caller
            .add_track(&MediaTrack::new(MediaKind::Video, "cam", None))
            .await
            .unwrap();
        let offer = caller.create_offer().await.unwrap();

        let (callee, seen) = recording();
        callee.set_remote_description(offer).await.unwrap();
        let kinds: Vec<MediaKind> = seen
            .lock()
            .iter()
            .filter_map(|e| match e {
                PeerLinkEvent::Track { track, .. } => Some(track.kind()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![MediaKind::Audio, MediaKind::Video]);
    }

    #[tokio::test]
    async fn closed_link_refuses_everything() {
        let (link, seen) = recording();
        link.close().await;
        link.close().await;
        assert!(link.is_closed());
        assert_eq!(link.create_offer().await.unwrap_err(), NegotiationError::Closed);
        let closed_events = seen
            .lock()
            .iter()
            .filter(|e| matches!(e, PeerLinkEvent::ConnectionState(ConnectionState::Closed)))
            .count();
        assert_eq!(closed_events, 1);
    }
}
