use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::aggregator::{CompositeStream, RemoteStreamAggregator};
use crate::call::context::CallContext;
use crate::call::handle::SessionHandle;
use crate::call::session_input::{LocalCommand, Reply, SessionInput};
use crate::call::{CallError, CallEvent, CallState, Direction, EndReason, display_label};
use crate::ice::CandidateBuffer;
use crate::media::{MediaKind, MediaTrack, SwitchError};
use crate::peer::{
    IceCandidate, PeerLink, PeerLinkEvent, PeerLinkEventHandler, SessionDescription,
};
use crate::renegotiation::{RenegotiationController, TrackRole};
use crate::signaling::{CallSignal, OutboundMsg, PeerId};
use crate::{sink_debug, sink_info, sink_warn};

/// One call with one peer, run as a task that is the only consumer of its
/// input channel. Every transition happens inside that task.
pub(crate) struct CallSession {
    peer: PeerId,
    direction: Direction,
    media_kind: MediaKind,
    state: CallState,
    ctx: Arc<CallContext>,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    state_tx: watch::Sender<CallState>,
    remote_tx: watch::Sender<Arc<CompositeStream>>,
    hangup: Arc<AtomicBool>,
    link: Option<Arc<dyn PeerLink>>,
    link_events: Option<mpsc::UnboundedReceiver<PeerLinkEvent>>,
    controller: RenegotiationController,
    candidates: CandidateBuffer,
    aggregator: RemoteStreamAggregator,
    remote_offer: Option<SessionDescription>,
    ring_deadline: Option<Instant>,
    peer_contacted: bool,
}

enum Wake {
    Input(Option<SessionInput>),
    Link(Option<PeerLinkEvent>),
    RingTimeout,
}

/// Starts a session task in `Idle` and returns the handle that feeds it.
pub(crate) fn spawn(
    peer: PeerId,
    direction: Direction,
    media_kind: MediaKind,
    ctx: Arc<CallContext>,
) -> SessionHandle {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(CallState::Idle);
    let (remote_tx, remote_rx) = watch::channel(Arc::new(CompositeStream::default()));
    let hangup = Arc::new(AtomicBool::new(false));

    let session = CallSession {
        controller: RenegotiationController::new(Arc::clone(&ctx.logger)),
        candidates: CandidateBuffer::new(Arc::clone(&ctx.logger)),
        aggregator: RemoteStreamAggregator::new(),
        peer,
        direction,
        media_kind,
        state: CallState::Idle,
        ctx,
        inputs: input_rx,
        state_tx,
        remote_tx,
        hangup: Arc::clone(&hangup),
        link: None,
        link_events: None,
        remote_offer: None,
        ring_deadline: None,
        peer_contacted: false,
    };
    tokio::spawn(session.run());
    SessionHandle::new(direction, input_tx, state_rx, remote_rx, hangup)
}

async fn next_link_event(
    events: &mut Option<mpsc::UnboundedReceiver<PeerLinkEvent>>,
) -> Option<PeerLinkEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn ring_expired(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn end_reason_for(err: CallError) -> EndReason {
    match err {
        CallError::Cancelled => EndReason::LocalHangup,
        other => EndReason::Failed(other),
    }
}

impl CallSession {
    async fn run(mut self) {
        sink_debug!(
            self.ctx.logger,
            "[call {}] session started ({:?}, {})",
            self.peer,
            self.direction,
            self.media_kind
        );
        while self.state.is_live() {
            let wake = tokio::select! {
                biased;
                input = self.inputs.recv() => Wake::Input(input),
                event = next_link_event(&mut self.link_events) => Wake::Link(event),
                () = ring_expired(self.ring_deadline) => Wake::RingTimeout,
            };
            match wake {
                Wake::Input(Some(SessionInput::Command(cmd))) => self.on_command(cmd).await,
                Wake::Input(Some(SessionInput::Signal(signal))) => self.on_signal(signal).await,
                Wake::Input(None) => self.finish(EndReason::LocalHangup).await,
                Wake::Link(Some(event)) => {
                    if let Err(e) = self.on_link_event(event).await {
                        sink_warn!(self.ctx.logger, "[call {}] link failure: {}", self.peer, e);
                        self.finish(end_reason_for(e)).await;
                    }
                }
                Wake::Link(None) => self.link_events = None,
                Wake::RingTimeout => {
                    self.ring_deadline = None;
                    if self.state == CallState::Dialing {
                        sink_info!(self.ctx.logger, "[call {}] no answer", self.peer);
                        self.finish(EndReason::NoAnswer).await;
                    }
                }
            }
        }

        self.inputs.close();
        while let Ok(input) = self.inputs.try_recv() {
            if let SessionInput::Command(cmd) = input {
                cmd.refuse(self.state);
            }
        }
        sink_debug!(self.ctx.logger, "[call {}] session task done", self.peer);
    }

    // ---- local commands ----

    fn accepts(&self, cmd: &LocalCommand) -> bool {
        let in_call = matches!(
            self.state,
            CallState::Dialing | CallState::Connecting | CallState::Active
        );
        match cmd {
            LocalCommand::Start { .. } => {
                self.state == CallState::Idle && self.direction == Direction::Outgoing
            }
            LocalCommand::Accept { .. } | LocalCommand::Reject { .. } => {
                self.state == CallState::Ringing
            }
            LocalCommand::ToggleScreenShare { .. } => {
                matches!(self.state, CallState::Connecting | CallState::Active)
            }
            LocalCommand::ToggleMute { .. }
            | LocalCommand::ToggleCamera { .. }
            | LocalCommand::SwitchDevice { .. } => in_call,
            LocalCommand::Hangup | LocalCommand::ApplyInputGain | LocalCommand::ReattachOutput => {
                true
            }
        }
    }

    async fn on_command(&mut self, cmd: LocalCommand) {
        if !self.accepts(&cmd) {
            sink_debug!(
                self.ctx.logger,
                "[call {}] {} ignored in {:?}",
                self.peer,
                cmd.name(),
                self.state
            );
            cmd.refuse(self.state);
            return;
        }
        match cmd {
            LocalCommand::Start { reply } => {
                let result = self.dial().await;
                self.settle(reply, result, |_| true).await;
            }
            LocalCommand::Accept { reply } => {
                let result = self.accept().await;
                self.settle(reply, result, |_| true).await;
            }
            LocalCommand::Reject { reply } => {
                self.finish(EndReason::LocalReject).await;
                let _ = reply.send(Ok(()));
            }
            LocalCommand::Hangup => self.finish(EndReason::LocalHangup).await,
            LocalCommand::ToggleMute { reply } => {
                let _ = reply.send(self.toggle_mute());
            }
            LocalCommand::ToggleCamera { reply } => {
                let _ = reply.send(self.toggle_camera());
            }
            LocalCommand::ToggleScreenShare { reply } => {
                let result = self.toggle_screen_share().await;
                self.settle(reply, result, CallError::ends_call).await;
            }
            LocalCommand::SwitchDevice {
                kind,
                device_id,
                reply,
            } => {
                // A failed switch rolls back; the call goes on.
                let result = self.switch_device(kind, &device_id).await;
                let _ = reply.send(result);
            }
            LocalCommand::ApplyInputGain => {
                if let Some(mic) = self.controller.track(TrackRole::Microphone) {
                    self.ctx.pipeline.apply_input_gain(mic);
                }
            }
            LocalCommand::ReattachOutput => self.attach_output(&self.aggregator.current()),
        }
    }

    /// Replies to a command, ending the call first when `fatal` says so.
    async fn settle<T>(
        &mut self,
        reply: Reply<T>,
        result: Result<T, CallError>,
        fatal: impl Fn(&CallError) -> bool,
    ) {
        if let Err(e) = &result {
            if fatal(e) {
                sink_warn!(self.ctx.logger, "[call {}] {}", self.peer, e);
                self.finish(end_reason_for(e.clone())).await;
            }
        }
        let _ = reply.send(result);
    }

    fn ensure_not_cancelled(&self) -> Result<(), CallError> {
        if self.hangup.load(Ordering::Acquire) {
            return Err(CallError::Cancelled);
        }
        Ok(())
    }

    fn invalid(&self, op: &'static str) -> CallError {
        CallError::InvalidState {
            op,
            state: self.state,
        }
    }

    fn require_link(&self, op: &'static str) -> Result<Arc<dyn PeerLink>, CallError> {
        self.link.clone().ok_or_else(|| self.invalid(op))
    }

    async fn dial(&mut self) -> Result<(), CallError> {
        self.ensure_not_cancelled()?;
        self.set_state(CallState::Dialing);

        let media = self.ctx.pipeline.acquire(self.media_kind).await?;
        self.controller.adopt(&media);
        self.ensure_not_cancelled()?;

        let link = self.open_link().await?;
        self.ensure_not_cancelled()?;
        self.controller.bind_initial(&*link).await?;
        let offer = link.create_offer().await?;
        link.set_local_description(offer.clone()).await?;
        self.ensure_not_cancelled()?;

        self.send_signal(CallSignal::Request {
            media_kind: self.media_kind,
            offer,
        })
        .await?;
        self.peer_contacted = true;
        self.ring_deadline = Some(Instant::now() + self.ctx.config.ring_timeout);
        Ok(())
    }

    async fn accept(&mut self) -> Result<(), CallError> {
        let Some(offer) = self.remote_offer.take() else {
            return Err(self.invalid("accept"));
        };
        self.ensure_not_cancelled()?;
        self.set_state(CallState::Connecting);

        let media = self.ctx.pipeline.acquire(self.media_kind).await?;
        self.controller.adopt(&media);
        self.ensure_not_cancelled()?;

        let link = self.open_link().await?;
        self.ensure_not_cancelled()?;
        self.controller.bind_initial(&*link).await?;
        link.set_remote_description(offer).await?;
        self.candidates.flush(&*link).await;
        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;
        self.ensure_not_cancelled()?;

        self.send_signal(CallSignal::Answer { answer }).await?;
        self.send_signal(CallSignal::Accept).await?;
        self.maybe_activate();
        Ok(())
    }

    async fn open_link(&mut self) -> Result<Arc<dyn PeerLink>, CallError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: PeerLinkEventHandler = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        let link = self.ctx.links.create(&self.ctx.config.link, handler).await?;
        self.link = Some(Arc::clone(&link));
        self.link_events = Some(rx);
        sink_debug!(self.ctx.logger, "[call {}] peer link created", self.peer);
        Ok(link)
    }

    fn toggle_mute(&self) -> Result<bool, CallError> {
        let mic = self
            .controller
            .track(TrackRole::Microphone)
            .ok_or_else(|| self.invalid("toggle mute"))?;
        let muted = mic.is_enabled();
        self.ctx.pipeline.set_mute(mic, muted);
        Ok(muted)
    }

    fn toggle_camera(&self) -> Result<bool, CallError> {
        let camera = self
            .controller
            .track(TrackRole::Camera)
            .ok_or_else(|| self.invalid("toggle camera"))?;
        let enabled = !camera.is_enabled();
        self.ctx.pipeline.set_camera_enabled(camera, enabled);
        Ok(enabled)
    }

    async fn toggle_screen_share(&mut self) -> Result<bool, CallError> {
        let link = self.require_link("toggle screen share")?;
        if self.controller.track(TrackRole::ScreenVideo).is_some() {
            self.stop_screen_share(&*link).await?;
            Ok(false)
        } else {
            self.start_screen_share(&*link).await?;
            Ok(true)
        }
    }

    async fn start_screen_share(&mut self, link: &dyn PeerLink) -> Result<(), CallError> {
        let screen = self.ctx.pipeline.acquire_screen().await?;
        let stop_all = |video: &MediaTrack, audio: Option<&MediaTrack>| {
            video.stop();
            if let Some(a) = audio {
                a.stop();
            }
        };
        if let Err(e) = self.ensure_not_cancelled() {
            stop_all(&screen.video, screen.audio.as_ref());
            return Err(e);
        }

        let outcome = match self
            .controller
            .install(link, TrackRole::ScreenVideo, screen.video.clone())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                stop_all(&screen.video, screen.audio.as_ref());
                return Err(e.into());
            }
        };
        sink_info!(
            self.ctx.logger,
            "[call {}] screen share started ({:?})",
            self.peer,
            outcome.change
        );
        self.send_offer(outcome.offer).await?;

        let Some(audio) = screen.audio else {
            return Ok(());
        };
        match self
            .controller
            .install(link, TrackRole::ScreenAudio, audio.clone())
            .await
        {
            Ok(outcome) => self.send_offer(outcome.offer).await?,
            Err(e) => {
                audio.stop();
                sink_warn!(
                    self.ctx.logger,
                    "[call {}] sharing without system audio: {}",
                    self.peer,
                    e
                );
            }
        }
        Ok(())
    }

    async fn stop_screen_share(&mut self, link: &dyn PeerLink) -> Result<(), CallError> {
        for role in [TrackRole::ScreenAudio, TrackRole::ScreenVideo] {
            if self.controller.track(role).is_none() {
                continue;
            }
            let (track, outcome) = self.controller.uninstall(link, role).await?;
            track.stop();
            sink_debug!(
                self.ctx.logger,
                "[call {}] {:?} off the wire ({:?})",
                self.peer,
                role,
                outcome.change
            );
            self.send_offer(outcome.offer).await?;
        }
        sink_info!(self.ctx.logger, "[call {}] screen share stopped", self.peer);
        Ok(())
    }

    async fn switch_device(&mut self, kind: MediaKind, device_id: &str) -> Result<(), CallError> {
        let role = match kind {
            MediaKind::Audio => TrackRole::Microphone,
            MediaKind::Video => TrackRole::Camera,
        };
        let Some(current) = self.controller.track(role).cloned() else {
            return Err(self.invalid("switch device"));
        };
        let link = self.require_link("switch device")?;

        let fresh = self
            .ctx
            .pipeline
            .acquire_replacement(kind, device_id)
            .await
            .map_err(SwitchError::from)?;
        fresh.set_enabled(current.is_enabled());
        if let Err(e) = self.ensure_not_cancelled() {
            fresh.stop();
            return Err(e);
        }

        match self.controller.replace_in_place(&*link, role, fresh.clone()).await {
            Ok(old) => {
                old.stop();
                sink_info!(
                    self.ctx.logger,
                    "[call {}] {:?} switched to {}",
                    self.peer,
                    role,
                    device_id
                );
                Ok(())
            }
            Err(e) => {
                fresh.stop();
                sink_warn!(
                    self.ctx.logger,
                    "[call {}] {:?} switch to {} rolled back: {}",
                    self.peer,
                    role,
                    device_id,
                    e
                );
                Err(SwitchError::Replace(e).into())
            }
        }
    }

    // ---- signaling ----

    async fn on_signal(&mut self, signal: CallSignal) {
        let kind = signal.kind();
        sink_debug!(
            self.ctx.logger,
            "[call {}] received {} in {:?}",
            self.peer,
            kind,
            self.state
        );
        let result = match signal {
            CallSignal::Request { media_kind, offer } => {
                self.on_request(media_kind, offer);
                Ok(())
            }
            CallSignal::Accept => {
                if self.state == CallState::Dialing {
                    sink_info!(self.ctx.logger, "[call {}] peer accepted", self.peer);
                }
                Ok(())
            }
            CallSignal::Reject => {
                if self.state == CallState::Dialing {
                    self.finish(EndReason::RemoteRejected).await;
                }
                Ok(())
            }
            CallSignal::Offer { offer } => self.on_remote_offer(offer).await,
            CallSignal::Answer { answer } => self.on_remote_answer(answer).await,
            CallSignal::IceCandidate { candidate } => {
                self.on_remote_candidate(candidate).await;
                Ok(())
            }
            CallSignal::End => {
                self.finish(EndReason::RemoteHangup).await;
                Ok(())
            }
        };
        if let Err(e) = result {
            sink_warn!(self.ctx.logger, "[call {}] {} failed: {}", self.peer, kind, e);
            self.finish(end_reason_for(e)).await;
        }
    }

    fn on_request(&mut self, media_kind: MediaKind, offer: SessionDescription) {
        if self.state != CallState::Idle || self.direction != Direction::Incoming {
            sink_debug!(
                self.ctx.logger,
                "[call {}] duplicate call_request dropped",
                self.peer
            );
            return;
        }
        self.media_kind = media_kind;
        self.remote_offer = Some(offer);
        self.peer_contacted = true;
        self.set_state(CallState::Ringing);
        let label = display_label(&*self.ctx.directory, &self.peer);
        sink_info!(
            self.ctx.logger,
            "[call {}] incoming {} call from {}",
            self.peer,
            media_kind,
            label
        );
        self.ctx.emit(CallEvent::IncomingCall {
            peer: self.peer.clone(),
            label,
            media_kind,
        });
    }

    async fn on_remote_offer(&mut self, offer: SessionDescription) -> Result<(), CallError> {
        if !matches!(self.state, CallState::Connecting | CallState::Active) {
            sink_debug!(
                self.ctx.logger,
                "[call {}] call_offer ignored in {:?}",
                self.peer,
                self.state
            );
            return Ok(());
        }
        let link = self.require_link("apply remote offer")?;
        let (answer, follow_up) = self.controller.on_remote_offer(&*link, offer).await?;
        self.candidates.flush(&*link).await;
        self.send_signal(CallSignal::Answer { answer }).await?;
        self.send_offer(follow_up).await
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) -> Result<(), CallError> {
        match self.state {
            CallState::Dialing | CallState::Connecting | CallState::Active => {}
            _ => {
                sink_debug!(
                    self.ctx.logger,
                    "[call {}] call_answer ignored in {:?}",
                    self.peer,
                    self.state
                );
                return Ok(());
            }
        }
        let link = self.require_link("apply remote answer")?;
        let follow_up = self.controller.on_remote_answer(&*link, answer).await?;
        if self.state == CallState::Dialing {
            self.ring_deadline = None;
            self.set_state(CallState::Connecting);
        }
        self.candidates.flush(&*link).await;
        self.send_offer(follow_up).await?;
        self.maybe_activate();
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        self.candidates.offer(candidate, self.link.as_deref()).await;
    }

    async fn send_signal(&self, signal: CallSignal) -> Result<(), CallError> {
        let kind = signal.kind();
        self.ctx
            .transport
            .send(OutboundMsg::new(self.peer.clone(), signal))
            .await?;
        sink_debug!(self.ctx.logger, "[call {}] sent {}", self.peer, kind);
        Ok(())
    }

    async fn send_offer(&self, offer: Option<SessionDescription>) -> Result<(), CallError> {
        if let Some(offer) = offer {
            self.send_signal(CallSignal::Offer { offer }).await?;
        }
        Ok(())
    }

    // ---- peer link events ----

    async fn on_link_event(&mut self, event: PeerLinkEvent) -> Result<(), CallError> {
        match event {
            PeerLinkEvent::Track { track, stream } => {
                sink_debug!(
                    self.ctx.logger,
                    "[call {}] remote {} track {} on stream {}",
                    self.peer,
                    track.kind(),
                    track.id(),
                    stream.id()
                );
                let composite = self.aggregator.on_track(track, stream);
                self.publish(composite);
                self.maybe_activate();
            }
            PeerLinkEvent::TrackEnded { track_id } => {
                let composite = self.aggregator.on_track_ended(&track_id);
                self.publish(composite);
            }
            PeerLinkEvent::IceCandidate(candidate) => {
                self.send_signal(CallSignal::IceCandidate { candidate }).await?;
            }
            PeerLinkEvent::ConnectionState(state) => {
                sink_debug!(self.ctx.logger, "[call {}] connection {:?}", self.peer, state);
                if state.is_fatal() {
                    return Err(CallError::Connectivity(state));
                }
            }
            PeerLinkEvent::SignalingState(state) => {
                if state.is_stable() && self.controller.has_deferred_offer() {
                    if let Some(link) = self.link.clone() {
                        let offer = self.controller.resume_deferred(&*link).await?;
                        self.send_offer(offer).await?;
                    }
                }
            }
        }
        Ok(())
    }

    fn publish(&mut self, composite: Arc<CompositeStream>) {
        self.remote_tx.send_replace(Arc::clone(&composite));
        self.attach_output(&composite);
        self.ctx.emit(CallEvent::RemoteStream {
            peer: self.peer.clone(),
            stream: composite,
        });
    }

    fn attach_output(&self, composite: &CompositeStream) {
        if composite.is_empty() {
            return;
        }
        if let Err(e) = self.ctx.pipeline.attach_output(composite) {
            sink_warn!(
                self.ctx.logger,
                "[call {}] could not play remote audio: {}",
                self.peer,
                e
            );
        }
    }

    fn maybe_activate(&mut self) {
        if self.state == CallState::Connecting && !self.aggregator.current().is_empty() {
            self.set_state(CallState::Active);
        }
    }

    fn set_state(&mut self, state: CallState) {
        if self.state == state {
            return;
        }
        sink_debug!(
            self.ctx.logger,
            "[call {}] {:?} -> {:?}",
            self.peer,
            self.state,
            state
        );
        self.state = state;
        self.state_tx.send_replace(state);
        self.ctx.emit(CallEvent::StateChanged {
            peer: self.peer.clone(),
            state,
        });
    }

    // ---- teardown ----

    fn farewell(&self, reason: &EndReason) -> Option<CallSignal> {
        if !self.peer_contacted {
            return None;
        }
        match reason {
            EndReason::LocalReject => Some(CallSignal::Reject),
            EndReason::RemoteHangup
            | EndReason::RemoteRejected
            | EndReason::Failed(CallError::Transport(_)) => None,
            EndReason::LocalHangup | EndReason::NoAnswer | EndReason::Failed(_) => {
                Some(CallSignal::End)
            }
        }
    }

    /// The single teardown path. Runs once; every step runs even when an
    /// earlier one fails.
    async fn finish(&mut self, reason: EndReason) {
        if self.state.is_terminal() || self.state == CallState::Ending {
            return;
        }
        let farewell = self.farewell(&reason);
        self.set_state(CallState::Ending);
        sink_info!(self.ctx.logger, "[call {}] ending: {:?}", self.peer, reason);

        self.ring_deadline = None;
        for track in self.controller.take_all_tracks() {
            track.stop();
        }
        let cleared = self.aggregator.clear();
        self.remote_tx.send_replace(Arc::clone(&cleared));
        self.ctx.emit(CallEvent::RemoteStream {
            peer: self.peer.clone(),
            stream: cleared,
        });
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        self.link_events = None;
        self.candidates.clear();
        self.remote_offer = None;

        if let Some(signal) = farewell {
            let kind = signal.kind();
            if let Err(e) = self.send_signal(signal).await {
                sink_warn!(
                    self.ctx.logger,
                    "[call {}] could not send {}: {}",
                    self.peer,
                    kind,
                    e
                );
            }
        }

        let terminal = if reason.is_failure() {
            CallState::Failed
        } else {
            CallState::Ended
        };
        self.set_state(terminal);
        self.ctx.emit(CallEvent::Ended {
            peer: self.peer.clone(),
            reason,
        });
    }
}
