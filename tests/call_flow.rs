#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rustycall::call::{
    CallConfig, CallError, CallEvent, CallManager, CallServices, CallState, Direction, EndReason,
    StaticDirectory,
};
use rustycall::log::NoopLogSink;
use rustycall::media::{DeviceRole, DeviceSelection, GainTarget, MediaKind};
use rustycall::peer::{
    ConnectionState, IceCandidate, NegotiationError, PeerLink, SessionDescription, SignalingState,
};
use rustycall::signaling::{
    CallRelay, CallSignal, InboundMsg, PeerId, SignalKind, TransportError,
};
use rustycall::sim::{SimMediaDevices, SimPeerLinkFactory, SimTransport};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(60);

struct Party {
    manager: Arc<CallManager>,
    events: mpsc::UnboundedReceiver<CallEvent>,
    devices: Arc<SimMediaDevices>,
    links: Arc<SimPeerLinkFactory>,
    transport: Arc<SimTransport>,
}

impl Party {
    fn new(transport: SimTransport, config: CallConfig) -> Self {
        let devices = Arc::new(SimMediaDevices::with_default_catalog());
        let links = Arc::new(SimPeerLinkFactory::new());
        let transport = Arc::new(transport);
        let services = CallServices {
            transport: transport.clone(),
            links: links.clone(),
            devices: devices.clone(),
            directory: Arc::new(StaticDirectory::new().with("alice", "Alice").with("bob", "Bob")),
            logger: Arc::new(NoopLogSink),
        };
        let (manager, events) = CallManager::new(services, config, DeviceSelection::default());
        Self {
            manager: Arc::new(manager),
            events,
            devices,
            links,
            transport,
        }
    }

    fn solo() -> Self {
        Self::new(SimTransport::new(), CallConfig::default())
    }

    fn inbound(&self, from: &str, signal: CallSignal) {
        self.manager.handle_inbound(InboundMsg::new(from, signal));
    }

    fn drain(&mut self) -> Vec<CallEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            out.push(e);
        }
        out
    }

    fn end_reason(&mut self, peer: &str) -> Option<EndReason> {
        self.drain().into_iter().find_map(|e| match e {
            CallEvent::Ended { peer: p, reason } if p.as_str() == peer => Some(reason),
            _ => None,
        })
    }

    fn assert_every_track_stopped_once(&self) {
        let tracks = self.devices.acquired_tracks();
        assert!(!tracks.is_empty());
        for t in tracks {
            assert_eq!(t.stop_count(), 1, "track {} ({})", t.id(), t.label());
        }
        assert_eq!(self.devices.live_tracks(), 0);
    }
}

async fn wait_state(manager: &CallManager, peer: &str, want: CallState) {
    let peer = PeerId::from(peer);
    let found = tokio::time::timeout(WAIT, async {
        let mut rx = loop {
            if let Some(rx) = manager.watch_state(&peer) {
                break rx;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        rx.wait_for(|s| *s == want).await.is_ok()
    })
    .await;
    assert_eq!(found, Ok(true), "{peer} never reached {want:?}");
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Two managers wired through an in-process relay, each recording what it sends.
fn pair() -> (Party, Party) {
    let relay = Arc::new(CallRelay::new(Arc::new(NoopLogSink)));
    let join = |user: &str| {
        let (_, inbox) = relay.connect(PeerId::from(user));
        let transport = SimTransport::forwarding(Arc::new(relay.transport_for(PeerId::from(user))));
        let party = Party::new(transport, CallConfig::default());
        let manager = Arc::clone(&party.manager);
        tokio::spawn(async move { manager.run(inbox).await });
        party
    };
    (join("alice"), join("bob"))
}

async fn active_pair(kind: MediaKind) -> (Party, Party) {
    let (alice, bob) = pair();
    alice.manager.start_call("bob", kind).await.unwrap();
    wait_state(&bob.manager, "alice", CallState::Ringing).await;
    bob.manager.accept_call("alice").await.unwrap();
    wait_state(&alice.manager, "bob", CallState::Active).await;
    wait_state(&bob.manager, "alice", CallState::Active).await;
    (alice, bob)
}

fn remote_offer(origin: &str) -> SessionDescription {
    SessionDescription::offer(format!("v=0\r\no=sim {origin} 1\r\ns=-\r\nm=audio\r\n"))
}

#[tokio::test]
async fn full_call_stops_every_track_once() {
    let (mut alice, mut bob) = active_pair(MediaKind::Video).await;

    let incoming = bob.drain().into_iter().find_map(|e| match e {
        CallEvent::IncomingCall { label, media_kind, .. } => Some((label, media_kind)),
        _ => None,
    });
    assert_eq!(incoming, Some(("Alice".to_owned(), MediaKind::Video)));
    assert_eq!(alice.manager.direction(&PeerId::from("bob")), Some(Direction::Outgoing));
    assert_eq!(bob.manager.direction(&PeerId::from("alice")), Some(Direction::Incoming));

    wait_until(|| {
        bob.manager
            .remote_stream(&PeerId::from("alice"))
            .is_some_and(|s| s.len() == 2)
    })
    .await;
    let stream = bob.manager.remote_stream(&PeerId::from("alice")).unwrap();
    assert_eq!(stream.tracks_of(MediaKind::Audio).count(), 1);
    assert_eq!(stream.tracks_of(MediaKind::Video).count(), 1);
    assert!(!bob.devices.outputs().is_empty());

    assert!(alice.manager.end_call("bob"));
    wait_state(&alice.manager, "bob", CallState::Ended).await;
    wait_state(&bob.manager, "alice", CallState::Ended).await;

    assert_eq!(alice.end_reason("bob"), Some(EndReason::LocalHangup));
    assert_eq!(bob.end_reason("alice"), Some(EndReason::RemoteHangup));
    alice.assert_every_track_stopped_once();
    bob.assert_every_track_stopped_once();

    assert_eq!(alice.transport.count(SignalKind::CallEnd), 1);
    assert_eq!(bob.transport.count(SignalKind::CallEnd), 0, "remote hangup is not echoed");
    assert!(alice.links.last().unwrap().is_closed());
    assert!(bob.links.last().unwrap().is_closed());
    assert!(bob.manager.remote_stream(&PeerId::from("alice")).unwrap().is_empty());
}

#[tokio::test]
async fn early_candidates_apply_in_order_after_remote_description() {
    let party = Party::solo();
    party.inbound("carol", CallSignal::IceCandidate { candidate: IceCandidate::new("A") });
    party.inbound("carol", CallSignal::IceCandidate { candidate: IceCandidate::new("B") });
    party.inbound(
        "carol",
        CallSignal::Request {
            media_kind: MediaKind::Audio,
            offer: remote_offer("carol"),
        },
    );
    party.inbound("carol", CallSignal::IceCandidate { candidate: IceCandidate::new("C") });
    wait_state(&party.manager, "carol", CallState::Ringing).await;
    assert!(party.links.created().is_empty(), "no link before accept");

    party.manager.accept_call("carol").await.unwrap();

    let link = party.links.last().unwrap();
    let applied: Vec<String> = link
        .applied_candidates()
        .into_iter()
        .map(|c| c.candidate)
        .collect();
    assert_eq!(applied, vec!["A", "B", "C"]);

    let kinds = party.transport.kinds();
    let answer = kinds.iter().position(|k| *k == SignalKind::CallAnswer);
    let accept = kinds.iter().position(|k| *k == SignalKind::CallAccept);
    assert!(answer.is_some() && answer < accept, "answer goes out before accept: {kinds:?}");
    wait_state(&party.manager, "carol", CallState::Active).await;
}

fn candidate_texts(party: &Party, index: usize) -> Vec<String> {
    party.links.created()[index]
        .applied_candidates()
        .into_iter()
        .map(|c| c.candidate)
        .collect()
}

async fn ring_and_accept(party: &Party, peer: &str) {
    party.inbound(
        peer,
        CallSignal::Request {
            media_kind: MediaKind::Audio,
            offer: remote_offer(peer),
        },
    );
    wait_state(&party.manager, peer, CallState::Ringing).await;
    party.manager.accept_call(peer).await.unwrap();
    wait_state(&party.manager, peer, CallState::Active).await;
}

#[tokio::test]
async fn candidate_after_remote_hangup_stays_out_of_the_next_call() {
    let party = Party::solo();
    ring_and_accept(&party, "carol").await;
    party.inbound("carol", CallSignal::End);
    wait_state(&party.manager, "carol", CallState::Ended).await;

    party.inbound("carol", CallSignal::IceCandidate { candidate: IceCandidate::new("STALE") });
    ring_and_accept(&party, "carol").await;

    assert_eq!(party.links.created().len(), 2);
    assert!(candidate_texts(&party, 1).is_empty(), "old call's candidate reached the new one");
}

#[tokio::test]
async fn early_candidates_are_held_for_a_bounded_number_of_peers() {
    let config = CallConfig {
        early_candidate_peers: 1,
        ..CallConfig::default()
    };
    let party = Party::new(SimTransport::new(), config);
    party.inbound("olga", CallSignal::IceCandidate { candidate: IceCandidate::new("O1") });
    party.inbound("pete", CallSignal::IceCandidate { candidate: IceCandidate::new("P1") });
    party.inbound("olga", CallSignal::IceCandidate { candidate: IceCandidate::new("O2") });

    ring_and_accept(&party, "olga").await;
    ring_and_accept(&party, "pete").await;

    assert_eq!(candidate_texts(&party, 0), vec!["O1", "O2"]);
    assert!(candidate_texts(&party, 1).is_empty());
}

#[tokio::test]
async fn second_start_for_same_peer_is_rejected() {
    let party = Party::solo();
    party.manager.start_call("dave", MediaKind::Audio).await.unwrap();

    let err = party
        .manager
        .start_call("dave", MediaKind::Video)
        .await
        .unwrap_err();
    assert_eq!(err, CallError::AlreadyInProgress(PeerId::from("dave")));
    assert_eq!(
        party.manager.state(&PeerId::from("dave")),
        Some(CallState::Dialing)
    );
    assert_eq!(party.transport.count(SignalKind::CallRequest), 1);
    assert_eq!(party.links.created().len(), 1);
}

#[tokio::test]
async fn hangup_during_acquisition_discards_the_capture() {
    let mut party = Party::solo();
    party.inbound(
        "erin",
        CallSignal::Request {
            media_kind: MediaKind::Video,
            offer: remote_offer("erin"),
        },
    );
    wait_state(&party.manager, "erin", CallState::Ringing).await;

    party.devices.hold_acquisitions();
    let manager = Arc::clone(&party.manager);
    let accepting = tokio::spawn(async move { manager.accept_call("erin").await });
    wait_until(|| party.devices.pending_acquisitions() == 1).await;

    assert!(party.manager.end_call("erin"));
    party.devices.release_acquisitions();

    assert_eq!(accepting.await.unwrap(), Err(CallError::Cancelled));
    wait_state(&party.manager, "erin", CallState::Ended).await;
    assert!(party.links.created().is_empty());
    party.assert_every_track_stopped_once();
    assert_eq!(party.end_reason("erin"), Some(EndReason::LocalHangup));
}

#[tokio::test]
async fn screen_share_on_audio_call_renegotiates() {
    let (alice, bob) = active_pair(MediaKind::Audio).await;
    let link = alice.links.last().unwrap();

    assert!(alice.manager.toggle_screen_share("bob").await.unwrap());
    assert_eq!(alice.transport.count(SignalKind::CallOffer), 1);
    assert_eq!(link.sender_count(MediaKind::Video), 1);
    assert_eq!(link.sender_count(MediaKind::Audio), 1);

    wait_until(|| link.signaling_state().is_stable()).await;
    wait_until(|| {
        bob.manager
            .remote_stream(&PeerId::from("alice"))
            .is_some_and(|s| s.tracks_of(MediaKind::Video).count() == 1)
    })
    .await;

    assert!(!alice.manager.toggle_screen_share("bob").await.unwrap());
    assert_eq!(alice.transport.count(SignalKind::CallOffer), 2);
    assert_eq!(link.sender_count(MediaKind::Video), 0);
    assert_eq!(link.sender_count(MediaKind::Audio), 1);

    let screen: Vec<_> = alice
        .devices
        .acquired_tracks()
        .into_iter()
        .filter(|t| t.device_id().is_none())
        .collect();
    assert_eq!(screen.len(), 2);
    assert!(screen.iter().all(|t| t.stop_count() == 1));
}

#[tokio::test]
async fn screen_share_on_video_call_swaps_in_place() {
    let (alice, _bob) = active_pair(MediaKind::Video).await;
    let link = alice.links.last().unwrap();
    let camera = link.sent_track(MediaKind::Video).unwrap();

    assert!(alice.manager.toggle_screen_share("bob").await.unwrap());
    assert_ne!(link.sent_track(MediaKind::Video), Some(camera.clone()));
    assert!(!alice.manager.toggle_screen_share("bob").await.unwrap());

    assert_eq!(link.sent_track(MediaKind::Video), Some(camera));
    assert_eq!(alice.transport.count(SignalKind::CallOffer), 0);
    assert_eq!(link.sender_count(MediaKind::Video), 1);
}

#[tokio::test]
async fn microphone_switch_keeps_one_sender_and_no_signaling() {
    let (alice, _bob) = active_pair(MediaKind::Audio).await;
    let link = alice.links.last().unwrap();
    let sent_before = alice.transport.sent().len();

    alice
        .manager
        .switch_device(DeviceRole::Microphone, "mic-2")
        .await
        .unwrap();

    assert_eq!(link.sender_count(MediaKind::Audio), 1);
    assert_eq!(alice.transport.sent().len(), sent_before);
    assert_eq!(alice.manager.selection().input_device.as_deref(), Some("mic-2"));

    let tracks = alice.devices.acquired_tracks();
    let old = tracks.iter().find(|t| t.device_id() == Some("mic-1")).unwrap();
    let new = tracks.iter().find(|t| t.device_id() == Some("mic-2")).unwrap();
    assert_eq!(old.stop_count(), 1);
    assert!(new.is_live() && new.has_transform());
    assert_eq!(link.sent_track(MediaKind::Audio).as_deref(), Some(new.id()));
    assert_eq!(
        alice.manager.state(&PeerId::from("bob")),
        Some(CallState::Active)
    );
}

#[tokio::test]
async fn failed_switch_rolls_back() {
    let (alice, _bob) = active_pair(MediaKind::Audio).await;
    let link = alice.links.last().unwrap();
    link.fail_replace_track(true);

    let err = alice
        .manager
        .switch_device(DeviceRole::Microphone, "mic-2")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Negotiation(NegotiationError::Backend(_))
    ));

    let tracks = alice.devices.acquired_tracks();
    let old = tracks.iter().find(|t| t.device_id() == Some("mic-1")).unwrap();
    let new = tracks.iter().find(|t| t.device_id() == Some("mic-2")).unwrap();
    assert!(old.is_live());
    assert_eq!(new.stop_count(), 1);
    assert_eq!(link.sent_track(MediaKind::Audio).as_deref(), Some(old.id()));
    assert_eq!(alice.manager.selection().input_device, None);
    assert_eq!(
        alice.manager.state(&PeerId::from("bob")),
        Some(CallState::Active)
    );
}

#[tokio::test]
async fn unknown_device_is_refused_before_touching_calls() {
    let (alice, _bob) = active_pair(MediaKind::Audio).await;
    let err = alice
        .manager
        .switch_device(DeviceRole::Camera, "mic-2")
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Device(_)));
    assert_eq!(alice.devices.acquired_tracks().len(), 1);
}

#[tokio::test]
async fn speaker_switch_and_volume_reattach_remote_audio() {
    let (_alice, bob) = active_pair(MediaKind::Audio).await;

    bob.manager
        .switch_device(DeviceRole::Speaker, "spk-2")
        .await
        .unwrap();
    assert_eq!(bob.manager.set_gain(GainTarget::Output, 1.5), 1.0);
    bob.manager.set_gain(GainTarget::Output, 0.4);

    wait_until(|| {
        bob.devices
            .outputs()
            .last()
            .is_some_and(|o| o.device_id.as_deref() == Some("spk-2") && o.volume == 0.4)
    })
    .await;
}

#[tokio::test]
async fn mute_and_input_gain_do_not_signal() {
    let (alice, _bob) = active_pair(MediaKind::Audio).await;
    let sent_before = alice.transport.sent().len();
    let mic = alice.devices.acquired_tracks().remove(0);

    assert!(alice.manager.toggle_mute("bob").await.unwrap());
    assert!(!mic.is_enabled());
    assert!(mic.is_live());
    assert!(!alice.manager.toggle_mute("bob").await.unwrap());
    assert!(mic.is_enabled());

    alice.manager.set_gain(GainTarget::Input, 0.5);
    wait_until(|| mic.gain() == 0.5).await;

    let err = alice.manager.toggle_camera("bob").await.unwrap_err();
    assert!(matches!(err, CallError::InvalidState { .. }));
    assert_eq!(alice.transport.sent().len(), sent_before);
}

#[tokio::test]
async fn end_call_twice_tears_down_once() {
    let (mut alice, _bob) = active_pair(MediaKind::Audio).await;

    assert!(alice.manager.end_call("bob"));
    assert!(!alice.manager.end_call("bob"));
    wait_state(&alice.manager, "bob", CallState::Ended).await;
    assert!(!alice.manager.end_call("bob"));

    let ended = alice
        .drain()
        .into_iter()
        .filter(|e| matches!(e, CallEvent::Ended { .. }))
        .count();
    assert_eq!(ended, 1);
    assert_eq!(alice.transport.count(SignalKind::CallEnd), 1);
    alice.assert_every_track_stopped_once();
}

#[tokio::test]
async fn repeated_remote_end_is_tolerated() {
    let mut party = Party::solo();
    ring_and_accept(&party, "lena").await;

    party.inbound("lena", CallSignal::End);
    party.inbound("lena", CallSignal::End);
    wait_state(&party.manager, "lena", CallState::Ended).await;
    party.inbound("lena", CallSignal::End);

    let ended: Vec<EndReason> = party
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            CallEvent::Ended { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![EndReason::RemoteHangup]);
    assert_eq!(party.transport.count(SignalKind::CallEnd), 0);
    assert!(party.links.last().unwrap().is_closed());
    party.assert_every_track_stopped_once();
}

#[tokio::test]
async fn deferred_offer_goes_out_once_the_link_settles() {
    let party = Party::solo();
    ring_and_accept(&party, "mona").await;
    let link = party.links.last().unwrap();

    assert!(party.manager.toggle_screen_share("mona").await.unwrap());
    assert_eq!(party.transport.count(SignalKind::CallOffer), 1);
    assert_eq!(link.signaling_state(), SignalingState::HaveLocalOffer);

    // no answer yet, so the second offer has to wait
    assert!(!party.manager.toggle_screen_share("mona").await.unwrap());
    assert_eq!(party.transport.count(SignalKind::CallOffer), 1);
    assert_eq!(link.sender_count(MediaKind::Video), 0);

    link.settle_signaling(SignalingState::Stable);
    wait_until(|| party.transport.count(SignalKind::CallOffer) == 2).await;
    assert_eq!(link.signaling_state(), SignalingState::HaveLocalOffer);
    assert_eq!(
        party.manager.state(&PeerId::from("mona")),
        Some(CallState::Active)
    );
}

#[tokio::test(start_paused = true)]
async fn unanswered_call_times_out() {
    let config = CallConfig {
        ring_timeout: Duration::from_secs(30),
        ..CallConfig::default()
    };
    let mut party = Party::new(SimTransport::new(), config);
    party.manager.start_call("frank", MediaKind::Audio).await.unwrap();

    wait_state(&party.manager, "frank", CallState::Ended).await;
    assert_eq!(party.end_reason("frank"), Some(EndReason::NoAnswer));
    assert_eq!(party.transport.count(SignalKind::CallEnd), 1);
    party.assert_every_track_stopped_once();
}

#[tokio::test]
async fn remote_reject_ends_without_echo() {
    let mut party = Party::solo();
    party.manager.start_call("gina", MediaKind::Audio).await.unwrap();
    party.inbound("gina", CallSignal::Reject);

    wait_state(&party.manager, "gina", CallState::Ended).await;
    assert_eq!(party.end_reason("gina"), Some(EndReason::RemoteRejected));
    assert_eq!(party.transport.count(SignalKind::CallEnd), 0);
    assert_eq!(party.transport.count(SignalKind::CallReject), 0);
}

#[tokio::test]
async fn local_reject_sends_call_reject() {
    let mut party = Party::solo();
    party.inbound(
        "ivan",
        CallSignal::Request {
            media_kind: MediaKind::Audio,
            offer: remote_offer("ivan"),
        },
    );
    wait_state(&party.manager, "ivan", CallState::Ringing).await;
    party.manager.reject_call("ivan").await.unwrap();

    assert_eq!(party.manager.state(&PeerId::from("ivan")), Some(CallState::Ended));
    assert_eq!(party.end_reason("ivan"), Some(EndReason::LocalReject));
    assert_eq!(party.transport.kinds(), vec![SignalKind::CallReject]);
    assert!(party.devices.acquired_tracks().is_empty());
}

#[tokio::test]
async fn transport_failure_fails_the_call_locally() {
    let mut party = Party::solo();
    party.transport.fail_sends(true);

    let err = party
        .manager
        .start_call("hank", MediaKind::Audio)
        .await
        .unwrap_err();
    assert_eq!(err, CallError::Transport(TransportError::Disconnected));
    assert_eq!(
        party.manager.state(&PeerId::from("hank")),
        Some(CallState::Failed)
    );
    assert!(matches!(
        party.end_reason("hank"),
        Some(EndReason::Failed(CallError::Transport(_)))
    ));
    party.assert_every_track_stopped_once();
}

#[tokio::test]
async fn denied_devices_fail_without_contacting_peer() {
    let party = Party::solo();
    party.devices.deny_permission(true);
    let err = party
        .manager
        .start_call("judy", MediaKind::Video)
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Device(_)));
    assert_eq!(
        party.manager.state(&PeerId::from("judy")),
        Some(CallState::Failed)
    );
    assert!(party.transport.sent().is_empty());
    assert!(party.links.created().is_empty());
}

#[tokio::test]
async fn connectivity_failure_is_fatal() {
    let mut party = Party::solo();
    party.inbound(
        "kim",
        CallSignal::Request {
            media_kind: MediaKind::Audio,
            offer: remote_offer("kim"),
        },
    );
    wait_state(&party.manager, "kim", CallState::Ringing).await;
    party.manager.accept_call("kim").await.unwrap();
    wait_state(&party.manager, "kim", CallState::Active).await;

    party
        .links
        .last()
        .unwrap()
        .emit_connection_state(ConnectionState::Failed);

    wait_state(&party.manager, "kim", CallState::Failed).await;
    assert_eq!(
        party.end_reason("kim"),
        Some(EndReason::Failed(CallError::Connectivity(ConnectionState::Failed)))
    );
    assert_eq!(party.transport.count(SignalKind::CallEnd), 1);
    party.assert_every_track_stopped_once();
}

#[tokio::test]
async fn shutdown_ends_every_call() {
    let (alice, _bob) = active_pair(MediaKind::Audio).await;
    alice.manager.shutdown().await;
    assert_eq!(
        alice.manager.state(&PeerId::from("bob")),
        Some(CallState::Ended)
    );
    alice.assert_every_track_stopped_once();
}
