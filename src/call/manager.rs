use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::aggregator::CompositeStream;
use crate::call::context::{CallContext, CallServices};
use crate::call::handle::SessionHandle;
use crate::call::session;
use crate::call::session_input::LocalCommand;
use crate::call::{CallConfig, CallError, CallEvent, CallState, Direction};
use crate::media::{
    DeviceError, DeviceInfo, DeviceKind, DeviceRole, DeviceSelection, GainTarget, MediaKind,
    MediaPipeline, SharedDeviceSelection,
};
use crate::peer::{IceCandidate, SessionDescription};
use crate::signaling::{CallSignal, InboundMsg, PeerId};
use crate::{sink_debug, sink_info, sink_warn};

/// Owns every call session and routes user actions and inbound signaling to them.
///
/// At most one live session exists per peer. Candidates that arrive before a
/// peer's `call_request` are held (bounded) and handed to the session once it
/// exists.
pub struct CallManager {
    ctx: Arc<CallContext>,
    sessions: Mutex<HashMap<PeerId, SessionHandle>>,
    early_candidates: Mutex<HashMap<PeerId, VecDeque<IceCandidate>>>,
}

impl CallManager {
    /// Builds a manager and the receiver of its [`CallEvent`]s.
    pub fn new(
        services: CallServices,
        config: CallConfig,
        selection: DeviceSelection,
    ) -> (Self, mpsc::UnboundedReceiver<CallEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pipeline = MediaPipeline::new(
            services.devices,
            SharedDeviceSelection::new(selection),
            config.media.clone(),
            Arc::clone(&services.logger),
        );
        let ctx = CallContext {
            transport: services.transport,
            links: services.links,
            pipeline: Arc::new(pipeline),
            directory: services.directory,
            config,
            events: events_tx,
            logger: services.logger,
        };
        let manager = Self {
            ctx: Arc::new(ctx),
            sessions: Mutex::new(HashMap::new()),
            early_candidates: Mutex::new(HashMap::new()),
        };
        (manager, events_rx)
    }

    fn live_session(&self, peer: &PeerId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(peer)
            .filter(|h| h.is_live())
            .cloned()
    }

    fn require_session(&self, peer: &PeerId) -> Result<SessionHandle, CallError> {
        self.live_session(peer)
            .ok_or_else(|| CallError::NoSession(peer.clone()))
    }

    fn live_sessions(&self) -> Vec<(PeerId, SessionHandle)> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, h)| h.is_live())
            .map(|(p, h)| (p.clone(), h.clone()))
            .collect()
    }

    /// Places a call: captures media, creates the link and sends `call_request`.
    ///
    /// # Errors
    /// `AlreadyInProgress` if a live session with `peer` exists (it is left
    /// untouched); otherwise whatever ended the setup.
    pub async fn start_call(
        &self,
        peer: impl Into<PeerId>,
        media_kind: MediaKind,
    ) -> Result<(), CallError> {
        let peer = peer.into();
        let handle = {
            let mut sessions = self.sessions.lock();
            if sessions.get(&peer).is_some_and(SessionHandle::is_live) {
                sink_warn!(self.ctx.logger, "[calls] call already in progress with {}", peer);
                return Err(CallError::AlreadyInProgress(peer));
            }
            self.early_candidates.lock().remove(&peer);
            let handle = session::spawn(
                peer.clone(),
                Direction::Outgoing,
                media_kind,
                Arc::clone(&self.ctx),
            );
            sessions.insert(peer.clone(), handle.clone());
            handle
        };
        sink_info!(self.ctx.logger, "[calls] calling {} ({})", peer, media_kind);
        handle.request(|reply| LocalCommand::Start { reply }).await
    }

    /// # Errors
    /// `NoSession` without a live call with `peer`, `InvalidState` unless it
    /// is ringing, or whatever ended the setup.
    pub async fn accept_call(&self, peer: impl Into<PeerId>) -> Result<(), CallError> {
        let handle = self.require_session(&peer.into())?;
        handle.request(|reply| LocalCommand::Accept { reply }).await
    }

    /// # Errors
    /// `NoSession`, or `InvalidState` unless the call is ringing.
    pub async fn reject_call(&self, peer: impl Into<PeerId>) -> Result<(), CallError> {
        let handle = self.require_session(&peer.into())?;
        handle.request(|reply| LocalCommand::Reject { reply }).await
    }

    /// Hangs up. Safe at any point of the call; returns false when there was
    /// nothing left to hang up.
    pub fn end_call(&self, peer: impl Into<PeerId>) -> bool {
        let peer = peer.into();
        self.early_candidates.lock().remove(&peer);
        let Some(handle) = self.live_session(&peer) else {
            return false;
        };
        let first = handle.hangup();
        if first {
            sink_info!(self.ctx.logger, "[calls] hanging up {}", peer);
        }
        first
    }

    /// Returns true when the microphone is now muted.
    ///
    /// # Errors
    /// `NoSession`, or `InvalidState` when no microphone is captured yet.
    pub async fn toggle_mute(&self, peer: impl Into<PeerId>) -> Result<bool, CallError> {
        let handle = self.require_session(&peer.into())?;
        handle.request(|reply| LocalCommand::ToggleMute { reply }).await
    }

    /// Returns true when the camera is now enabled.
    ///
    /// # Errors
    /// `NoSession`, or `InvalidState` on calls without a camera.
    pub async fn toggle_camera(&self, peer: impl Into<PeerId>) -> Result<bool, CallError> {
        let handle = self.require_session(&peer.into())?;
        handle.request(|reply| LocalCommand::ToggleCamera { reply }).await
    }

    /// Returns true when the screen is now being shared.
    ///
    /// # Errors
    /// Capture failures leave the call running; negotiation or transport
    /// failures end it.
    pub async fn toggle_screen_share(&self, peer: impl Into<PeerId>) -> Result<bool, CallError> {
        let handle = self.require_session(&peer.into())?;
        handle
            .request(|reply| LocalCommand::ToggleScreenShare { reply })
            .await
    }

    /// Moves every running call to another device and remembers the choice.
    ///
    /// Speaker changes re-attach the remote audio. A microphone or camera
    /// change is applied to each call in turn; the first failure is returned,
    /// that call keeps its old device and the selection is not updated.
    ///
    /// # Errors
    /// `Device(NotFound)` for an unknown device id; switch failures otherwise.
    pub async fn switch_device(&self, role: DeviceRole, device_id: &str) -> Result<(), CallError> {
        let wanted = match role {
            DeviceRole::Microphone => DeviceKind::AudioInput,
            DeviceRole::Camera => DeviceKind::VideoInput,
            DeviceRole::Speaker => DeviceKind::AudioOutput,
        };
        let known = self
            .enumerate_devices()
            .await?
            .iter()
            .any(|d| d.device_id == device_id && d.kind == wanted);
        if !known {
            return Err(DeviceError::NotFound(device_id.to_owned()).into());
        }

        let selection = self.ctx.pipeline.selection();
        let kind = match role {
            DeviceRole::Speaker => {
                selection.set_device(role, device_id);
                self.broadcast(|| LocalCommand::ReattachOutput);
                sink_info!(self.ctx.logger, "[calls] output device set to {}", device_id);
                return Ok(());
            }
            DeviceRole::Microphone => MediaKind::Audio,
            DeviceRole::Camera => MediaKind::Video,
        };

        for (peer, handle) in self.live_sessions() {
            let in_call = matches!(
                handle.state(),
                CallState::Dialing | CallState::Connecting | CallState::Active
            );
            if !in_call {
                continue;
            }
            let result = handle
                .request(|reply| LocalCommand::SwitchDevice {
                    kind,
                    device_id: device_id.to_owned(),
                    reply,
                })
                .await;
            if let Err(e) = result {
                sink_warn!(self.ctx.logger, "[calls] {:?} switch failed on {}: {}", role, peer, e);
                return Err(e);
            }
        }
        selection.set_device(role, device_id);
        sink_info!(self.ctx.logger, "[calls] {:?} set to {}", role, device_id);
        Ok(())
    }

    /// Sets microphone gain or speaker volume (clamped to 0.0..=1.0) and
    /// applies it to running calls. Returns the stored value.
    pub fn set_gain(&self, target: GainTarget, level: f32) -> f32 {
        let applied = self.ctx.pipeline.set_gain(target, level);
        match target {
            GainTarget::Input => self.broadcast(|| LocalCommand::ApplyInputGain),
            GainTarget::Output => self.broadcast(|| LocalCommand::ReattachOutput),
        }
        sink_debug!(self.ctx.logger, "[calls] {:?} gain {}", target, applied);
        applied
    }

    fn broadcast(&self, make: impl Fn() -> LocalCommand) {
        for (peer, handle) in self.live_sessions() {
            if let Err(e) = handle.command(make()) {
                sink_debug!(self.ctx.logger, "[calls] {} unreachable: {}", peer, e);
            }
        }
    }

    /// # Errors
    /// Whatever the device backend reports.
    pub async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        self.ctx.pipeline.devices().enumerate_devices().await
    }

    /// State of the most recent session with `peer`, live or not.
    #[must_use]
    pub fn state(&self, peer: &PeerId) -> Option<CallState> {
        self.sessions.lock().get(peer).map(SessionHandle::state)
    }

    /// Whether the most recent session with `peer` was placed or received.
    #[must_use]
    pub fn direction(&self, peer: &PeerId) -> Option<Direction> {
        self.sessions.lock().get(peer).map(|h| h.direction)
    }

    #[must_use]
    pub fn watch_state(&self, peer: &PeerId) -> Option<watch::Receiver<CallState>> {
        self.sessions.lock().get(peer).map(SessionHandle::watch_state)
    }

    #[must_use]
    pub fn remote_stream(&self, peer: &PeerId) -> Option<Arc<CompositeStream>> {
        self.sessions.lock().get(peer).map(SessionHandle::remote_stream)
    }

    #[must_use]
    pub fn selection(&self) -> DeviceSelection {
        self.ctx.pipeline.selection().snapshot()
    }

    /// Dispatches one message from the signaling channel.
    pub fn handle_inbound(&self, msg: InboundMsg) {
        let InboundMsg { from, signal } = msg;
        match signal {
            CallSignal::Request { media_kind, offer } => {
                self.on_call_request(from, media_kind, offer);
            }
            CallSignal::IceCandidate { candidate } => self.on_candidate(from, candidate),
            signal @ (CallSignal::Accept
            | CallSignal::Reject
            | CallSignal::Offer { .. }
            | CallSignal::Answer { .. }
            | CallSignal::End) => match self.live_session(&from) {
                Some(handle) => {
                    if let Err(e) = handle.signal(signal) {
                        sink_debug!(self.ctx.logger, "[calls] {} unreachable: {}", from, e);
                    }
                }
                None => sink_debug!(
                    self.ctx.logger,
                    "[calls] no call with {}, dropping {}",
                    from,
                    signal.kind()
                ),
            },
        }
    }

    fn on_call_request(
        &self,
        from: PeerId,
        media_kind: MediaKind,
        offer: SessionDescription,
    ) {
        let mut sessions = self.sessions.lock();
        if sessions.get(&from).is_some_and(SessionHandle::is_live) {
            sink_warn!(
                self.ctx.logger,
                "[calls] call_request from {} while a call is live, dropped",
                from
            );
            return;
        }
        let handle = session::spawn(
            from.clone(),
            Direction::Incoming,
            media_kind,
            Arc::clone(&self.ctx),
        );
        let early = self.early_candidates.lock().remove(&from).unwrap_or_default();
        let _ = handle.signal(CallSignal::Request { media_kind, offer });
        for candidate in early {
            let _ = handle.signal(CallSignal::IceCandidate { candidate });
        }
        sessions.insert(from, handle);
    }

    fn on_candidate(&self, from: PeerId, candidate: IceCandidate) {
        let latest = self.sessions.lock().get(&from).cloned();
        match latest {
            Some(handle) if handle.is_live() => {
                if let Err(e) = handle.signal(CallSignal::IceCandidate { candidate }) {
                    sink_debug!(self.ctx.logger, "[calls] {} unreachable: {}", from, e);
                }
                return;
            }
            // leftovers of a finished call, never handed to the next one
            Some(_) => {
                self.early_candidates.lock().remove(&from);
                sink_debug!(
                    self.ctx.logger,
                    "[calls] call with {} is over, dropping candidate",
                    from
                );
                return;
            }
            None => {}
        }
        let config = &self.ctx.config;
        let mut early = self.early_candidates.lock();
        if !early.contains_key(&from) && early.len() >= config.early_candidate_peers {
            sink_warn!(
                self.ctx.logger,
                "[calls] early candidates held for {} peers, dropping one from {}",
                early.len(),
                from
            );
            return;
        }
        let queue = early.entry(from.clone()).or_default();
        if queue.len() >= config.early_candidate_limit {
            sink_warn!(
                self.ctx.logger,
                "[calls] early candidate buffer for {} full, dropping",
                from
            );
            return;
        }
        queue.push_back(candidate);
    }

    /// Feeds inbound messages until the channel closes.
    pub async fn run(&self, mut inbound: mpsc::UnboundedReceiver<InboundMsg>) {
        while let Some(msg) = inbound.recv().await {
            self.handle_inbound(msg);
        }
        sink_debug!(self.ctx.logger, "[calls] inbound channel closed");
    }

    /// Hangs up every live call and waits until each has torn down.
    pub async fn shutdown(&self) {
        self.early_candidates.lock().clear();
        let live = self.live_sessions();
        for (_, handle) in &live {
            handle.hangup();
        }
        for (peer, handle) in live {
            let mut state = handle.watch_state();
            if state.wait_for(|s| s.is_terminal()).await.is_err() {
                sink_debug!(self.ctx.logger, "[calls] session {} already gone", peer);
            }
        }
        sink_info!(self.ctx.logger, "[calls] shut down");
    }
}
