use std::collections::HashMap;
use std::sync::Arc;

use crate::log::LogSink;
use crate::media::{LocalMedia, MediaKind, MediaTrack};
use crate::peer::{NegotiationError, PeerLink, SenderId, SessionDescription};
use crate::renegotiation::TrackRole;
use crate::{sink_debug, sink_info};

/// What happened to the sender slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingChange {
    /// Same-kind sender existed; its track was swapped.
    ReplacedInPlace,
    /// A new sender was added.
    SenderAdded,
    /// The fallback role took the sender back.
    Restored,
    /// The sender was removed from the link.
    SenderRemoved,
    /// The role was owned but not bound to any sender.
    Unbound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOutcome {
    pub change: BindingChange,
    /// Renegotiation offer, already set locally, to send as `call_offer`.
    pub offer: Option<SessionDescription>,
}

impl ControllerOutcome {
    fn quiet(change: BindingChange) -> Self {
        Self {
            change,
            offer: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SenderSlot {
    id: SenderId,
    role: TrackRole,
}

/// Owns the session's local tracks and decides how each change reaches the link.
///
/// At most one sender exists per media kind. A change of same-kind track is a
/// silent `replace_track`; anything that adds or removes a sender needs a new
/// offer, which is only created from the stable state. Otherwise it is
/// deferred until the current round completes.
pub struct RenegotiationController {
    owned: HashMap<TrackRole, MediaTrack>,
    senders: HashMap<MediaKind, SenderSlot>,
    deferred_offer: bool,
    logger: Arc<dyn LogSink>,
}

impl RenegotiationController {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            owned: HashMap::new(),
            senders: HashMap::new(),
            deferred_offer: false,
            logger,
        }
    }

    /// Takes ownership of freshly captured media without touching any link.
    pub fn adopt(&mut self, media: &LocalMedia) {
        self.owned.insert(TrackRole::Microphone, media.microphone.clone());
        if let Some(camera) = &media.camera {
            self.owned.insert(TrackRole::Camera, camera.clone());
        }
    }

    /// Adds a sender for every adopted microphone/camera track. No offer is made;
    /// the initial offer/answer is driven by the session.
    ///
    /// # Errors
    /// Propagates the link's `add_track` failure.
    pub async fn bind_initial(&mut self, link: &dyn PeerLink) -> Result<(), NegotiationError> {
        for role in [TrackRole::Microphone, TrackRole::Camera] {
            let Some(track) = self.owned.get(&role) else {
                continue;
            };
            if self.senders.contains_key(&role.kind()) {
                continue;
            }
            let id = link.add_track(track).await?;
            self.senders.insert(role.kind(), SenderSlot { id, role });
        }
        Ok(())
    }

    #[must_use]
    pub fn track(&self, role: TrackRole) -> Option<&MediaTrack> {
        self.owned.get(&role)
    }

    #[must_use]
    pub fn bound_role(&self, kind: MediaKind) -> Option<TrackRole> {
        self.senders.get(&kind).map(|slot| slot.role)
    }

    #[must_use]
    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    #[must_use]
    pub fn has_deferred_offer(&self) -> bool {
        self.deferred_offer
    }

    /// Puts `track` on the wire under `role`.
    ///
    /// On error the controller is unchanged and the caller still owns `track`.
    ///
    /// # Errors
    /// `Binding` if the role already has a track; link failures otherwise.
    pub async fn install(
        &mut self,
        link: &dyn PeerLink,
        role: TrackRole,
        track: MediaTrack,
    ) -> Result<ControllerOutcome, NegotiationError> {
        if self.owned.contains_key(&role) {
            return Err(NegotiationError::Binding(format!("{role:?} already has a track")));
        }
        let kind = role.kind();
        if let Some(slot) = self.senders.get_mut(&kind) {
            link.replace_track(slot.id, Some(&track)).await?;
            sink_debug!(
                self.logger,
                "[reneg] {:?} replaced {:?} on the {} sender",
                role,
                slot.role,
                kind
            );
            slot.role = role;
            self.owned.insert(role, track);
            return Ok(ControllerOutcome::quiet(BindingChange::ReplacedInPlace));
        }

        let id = link.add_track(&track).await?;
        self.senders.insert(kind, SenderSlot { id, role });
        self.owned.insert(role, track);
        sink_info!(self.logger, "[reneg] added {} sender for {:?}", kind, role);
        let offer = self.negotiate(link).await?;
        Ok(ControllerOutcome {
            change: BindingChange::SenderAdded,
            offer,
        })
    }

    /// Takes `role` off the wire and returns its track for the caller to stop.
    ///
    /// The fallback role (camera for screen video, microphone for screen
    /// audio) takes the sender back when it is owned; otherwise the sender is
    /// removed and the link renegotiated.
    ///
    /// # Errors
    /// `Binding` if the role owns no track; link failures otherwise.
    pub async fn uninstall(
        &mut self,
        link: &dyn PeerLink,
        role: TrackRole,
    ) -> Result<(MediaTrack, ControllerOutcome), NegotiationError> {
        let Some(track) = self.owned.remove(&role) else {
            return Err(NegotiationError::Binding(format!("{role:?} has no track")));
        };
        let kind = role.kind();
        let Some(slot) = self.senders.get(&kind).copied().filter(|s| s.role == role) else {
            return Ok((track, ControllerOutcome::quiet(BindingChange::Unbound)));
        };

        let fallback = role
            .fallback()
            .and_then(|r| self.owned.get(&r).map(|t| (r, t.clone())));
        if let Some((fallback_role, fallback_track)) = fallback {
            if let Err(e) = link.replace_track(slot.id, Some(&fallback_track)).await {
                self.owned.insert(role, track);
                return Err(e);
            }
            if let Some(s) = self.senders.get_mut(&kind) {
                s.role = fallback_role;
            }
            sink_debug!(self.logger, "[reneg] {:?} restored on the {} sender", fallback_role, kind);
            return Ok((track, ControllerOutcome::quiet(BindingChange::Restored)));
        }

        if let Err(e) = link.remove_track(slot.id).await {
            self.owned.insert(role, track);
            return Err(e);
        }
        self.senders.remove(&kind);
        sink_info!(self.logger, "[reneg] removed {} sender of {:?}", kind, role);
        let offer = self.negotiate(link).await?;
        Ok((
            track,
            ControllerOutcome {
                change: BindingChange::SenderRemoved,
                offer,
            },
        ))
    }

    /// Swaps the track of an owned role in place and returns the previous
    /// track. The caller stops it only after this succeeds.
    ///
    /// # Errors
    /// `Binding` if the role owns no track; the link's `replace_track` failure
    /// otherwise, in which case nothing changed.
    pub async fn replace_in_place(
        &mut self,
        link: &dyn PeerLink,
        role: TrackRole,
        track: MediaTrack,
    ) -> Result<MediaTrack, NegotiationError> {
        if !self.owned.contains_key(&role) {
            return Err(NegotiationError::Binding(format!("{role:?} has no track")));
        }
        if let Some(slot) = self.senders.get(&role.kind()).filter(|s| s.role == role) {
            link.replace_track(slot.id, Some(&track)).await?;
        }
        self.owned
            .insert(role, track)
            .ok_or_else(|| NegotiationError::Binding(format!("{role:?} has no track")))
    }

    /// Creates and sets a new local offer if the link is stable; otherwise
    /// remembers to do it once the current round completes.
    ///
    /// # Errors
    /// Link failures from `create_offer` / `set_local_description`.
    pub async fn negotiate(
        &mut self,
        link: &dyn PeerLink,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        let state = link.signaling_state();
        if !state.is_stable() {
            sink_debug!(self.logger, "[reneg] offer deferred, signaling state {:?}", state);
            self.deferred_offer = true;
            return Ok(None);
        }
        self.deferred_offer = false;
        let offer = link.create_offer().await?;
        link.set_local_description(offer.clone()).await?;
        Ok(Some(offer))
    }

    /// Applies a mid-call offer and returns the answer to send, plus a
    /// deferred offer of our own if one became possible.
    ///
    /// # Errors
    /// `InvalidState` when an offer of ours is outstanding; link failures otherwise.
    pub async fn on_remote_offer(
        &mut self,
        link: &dyn PeerLink,
        offer: SessionDescription,
    ) -> Result<(SessionDescription, Option<SessionDescription>), NegotiationError> {
        let state = link.signaling_state();
        if !state.is_stable() {
            return Err(NegotiationError::InvalidState {
                op: "apply remote offer",
                state,
            });
        }
        link.set_remote_description(offer).await?;
        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;
        let follow_up = self.resume_deferred(link).await?;
        Ok((answer, follow_up))
    }

    /// Applies the answer to our offer, then resumes a deferred offer.
    ///
    /// # Errors
    /// Link failures.
    pub async fn on_remote_answer(
        &mut self,
        link: &dyn PeerLink,
        answer: SessionDescription,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        link.set_remote_description(answer).await?;
        self.resume_deferred(link).await
    }

    /// # Errors
    /// Link failures while creating the deferred offer.
    pub async fn resume_deferred(
        &mut self,
        link: &dyn PeerLink,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        if self.deferred_offer && link.signaling_state().is_stable() {
            return self.negotiate(link).await;
        }
        Ok(None)
    }

    /// Gives up every owned track and forgets all senders.
    pub fn take_all_tracks(&mut self) -> Vec<MediaTrack> {
        self.senders.clear();
        self.deferred_offer = false;
        self.owned.drain().map(|(_, t)| t).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::peer::SignalingState;
    use crate::sim::SimPeerLink;

    fn media(video: bool) -> LocalMedia {
        LocalMedia {
            microphone: MediaTrack::new(MediaKind::Audio, "mic", Some("mic-1".into())),
            camera: video.then(|| MediaTrack::new(MediaKind::Video, "cam", Some("cam-1".into()))),
        }
    }

    async fn stable_pair(video: bool) -> (RenegotiationController, Arc<SimPeerLink>) {
        let link = SimPeerLink::detached();
        let mut ctl = RenegotiationController::new(Arc::new(NoopLogSink));
        ctl.adopt(&media(video));
        ctl.bind_initial(&*link).await.unwrap();
        // Complete one offer/answer round so the link is stable with a remote description.
        let offer = link.create_offer().await.unwrap();
        link.set_local_description(offer).await.unwrap();
        link.set_remote_description(SessionDescription::answer("v=0 answer"))
            .await
            .unwrap();
        (ctl, link)
    }

    #[tokio::test]
    async fn screen_on_audio_call_adds_sender_and_offers() {
        let (mut ctl, link) = stable_pair(false).await;
        let screen = MediaTrack::new(MediaKind::Video, "screen", None);

        let out = ctl.install(&*link, TrackRole::ScreenVideo, screen).await.unwrap();
        assert_eq!(out.change, BindingChange::SenderAdded);
        assert!(out.offer.as_ref().is_some_and(SessionDescription::is_offer));
        assert_eq!(link.sender_count(MediaKind::Video), 1);
        assert_eq!(link.signaling_state(), SignalingState::HaveLocalOffer);
    }

    #[tokio::test]
    async fn screen_on_video_call_replaces_camera_without_offer() {
        let (mut ctl, link) = stable_pair(true).await;
        let screen = MediaTrack::new(MediaKind::Video, "screen", None);

        let out = ctl.install(&*link, TrackRole::ScreenVideo, screen.clone()).await.unwrap();
        assert_eq!(out, ControllerOutcome::quiet(BindingChange::ReplacedInPlace));
        assert_eq!(ctl.bound_role(MediaKind::Video), Some(TrackRole::ScreenVideo));

        let (removed, out) = ctl.uninstall(&*link, TrackRole::ScreenVideo).await.unwrap();
        assert!(removed.same_track(&screen));
        assert_eq!(out.change, BindingChange::Restored);
        assert!(out.offer.is_none());
        assert_eq!(ctl.bound_role(MediaKind::Video), Some(TrackRole::Camera));
        assert_eq!(link.sender_count(MediaKind::Video), 1);
    }

    #[tokio::test]
    async fn offer_is_deferred_until_stable() {
        let (mut ctl, link) = stable_pair(false).await;
        // Outstanding offer of ours.
        let first = ctl
            .install(&*link, TrackRole::ScreenVideo, MediaTrack::new(MediaKind::Video, "s", None))
            .await
            .unwrap();
        assert!(first.offer.is_some());

        let (_, out) = ctl.uninstall(&*link, TrackRole::ScreenVideo).await.unwrap();
        assert_eq!(out.change, BindingChange::SenderRemoved);
        assert!(out.offer.is_none());
        assert!(ctl.has_deferred_offer());

        let resumed = ctl
            .on_remote_answer(&*link, SessionDescription::answer("v=0 a2"))
            .await
            .unwrap();
        assert!(resumed.is_some());
        assert!(!ctl.has_deferred_offer());
    }

    #[tokio::test]
    async fn remote_offer_is_answered() {
        let (mut ctl, link) = stable_pair(false).await;
        let (answer, follow_up) = ctl
            .on_remote_offer(&*link, SessionDescription::offer("v=0 reoffer"))
            .await
            .unwrap();
        assert!(!answer.is_offer());
        assert!(follow_up.is_none());
        assert_eq!(link.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn remote_offer_while_offering_is_rejected() {
        let (mut ctl, link) = stable_pair(false).await;
        let offer = link.create_offer().await.unwrap();
        link.set_local_description(offer).await.unwrap();
        let err = ctl
            .on_remote_offer(&*link, SessionDescription::offer("v=0 glare"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn replace_in_place_keeps_one_sender() {
        let (mut ctl, link) = stable_pair(false).await;
        let new_mic = MediaTrack::new(MediaKind::Audio, "usb", Some("mic-2".into()));
        let old = ctl
            .replace_in_place(&*link, TrackRole::Microphone, new_mic.clone())
            .await
            .unwrap();
        assert_eq!(old.device_id(), Some("mic-1"));
        assert!(ctl.track(TrackRole::Microphone).unwrap().same_track(&new_mic));
        assert_eq!(link.sender_count(MediaKind::Audio), 1);
    }

    #[tokio::test]
    async fn failed_replace_leaves_binding_untouched() {
        let (mut ctl, link) = stable_pair(false).await;
        link.fail_replace_track(true);
        let new_mic = MediaTrack::new(MediaKind::Audio, "usb", Some("mic-2".into()));
        assert!(ctl
            .replace_in_place(&*link, TrackRole::Microphone, new_mic)
            .await
            .is_err());
        assert_eq!(
            ctl.track(TrackRole::Microphone).unwrap().device_id(),
            Some("mic-1")
        );
    }

    #[tokio::test]
    async fn take_all_returns_every_owned_track_once() {
        let (mut ctl, link) = stable_pair(true).await;
        ctl.install(&*link, TrackRole::ScreenVideo, MediaTrack::new(MediaKind::Video, "s", None))
            .await
            .unwrap();
        assert_eq!(ctl.take_all_tracks().len(), 3);
        assert!(ctl.take_all_tracks().is_empty());
        assert_eq!(ctl.sender_count(), 0);
    }
}
