#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use rustycall::call::{CallConfig, CallManager, CallServices, CallState, StaticDirectory};
use rustycall::log::NoopLogSink;
use rustycall::media::{DeviceSelection, MediaKind};
use rustycall::peer::IceCandidate;
use rustycall::signaling::{
    CallRelay, CallSignal, InboundMsg, OutboundMsg, PeerId, SignalingTransport,
    TcpSignalingClient, serve,
};
use rustycall::sim::{SimMediaDevices, SimPeerLinkFactory};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

const WAIT: Duration = Duration::from_secs(10);

async fn start_relay() -> (Arc<CallRelay>, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = Arc::new(CallRelay::new(Arc::new(NoopLogSink)));
    tokio::spawn(serve(listener, Arc::clone(&relay), Arc::new(NoopLogSink)));
    (relay, addr)
}

async fn wait_online(relay: &CallRelay, users: &[&str]) {
    tokio::time::timeout(WAIT, async {
        while !users.iter().all(|u| relay.is_online(&PeerId::from(*u))) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("clients never registered");
}

#[tokio::test]
async fn frames_cross_the_relay_with_sender_rewritten() {
    let (relay, addr) = start_relay().await;
    let (alice, _alice_inbox) = TcpSignalingClient::connect(addr, "alice".into(), Arc::new(NoopLogSink))
        .await
        .unwrap();
    let (_bob, mut bob_inbox) = TcpSignalingClient::connect(addr, "bob".into(), Arc::new(NoopLogSink))
        .await
        .unwrap();
    wait_online(&relay, &["alice", "bob"]).await;

    let candidate = IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host").with_mid("0", 0);
    alice
        .send(OutboundMsg::new(
            "bob",
            CallSignal::IceCandidate {
                candidate: candidate.clone(),
            },
        ))
        .await
        .unwrap();
    alice
        .send(OutboundMsg::new("bob", CallSignal::End))
        .await
        .unwrap();

    let first = tokio::time::timeout(WAIT, bob_inbox.recv()).await.unwrap();
    let second = tokio::time::timeout(WAIT, bob_inbox.recv()).await.unwrap();
    assert_eq!(
        first,
        Some(InboundMsg::new("alice", CallSignal::IceCandidate { candidate }))
    );
    assert_eq!(second, Some(InboundMsg::new("alice", CallSignal::End)));
}

#[tokio::test]
async fn closing_a_connection_takes_the_user_offline() {
    let (relay, addr) = start_relay().await;
    let (client, inbox) = TcpSignalingClient::connect(addr, "carol".into(), Arc::new(NoopLogSink))
        .await
        .unwrap();
    wait_online(&relay, &["carol"]).await;

    drop(inbox);
    drop(client);
    tokio::time::timeout(WAIT, async {
        while relay.is_online(&PeerId::from("carol")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relay kept a closed connection");
}

#[tokio::test]
async fn unreadable_bytes_still_take_the_user_offline() {
    let (relay, addr) = start_relay().await;
    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(b"{\"user_id\":\"dave\"}\n").await.unwrap();
    wait_online(&relay, &["dave"]).await;

    // not UTF-8, so the line reader fails instead of reaching end of stream
    raw.write_all(&[0xff, 0xfe, 0xfd, b'\n']).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while relay.is_online(&PeerId::from("dave")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relay kept a failed connection registered");
    drop(raw);
}

async fn tcp_manager(addr: std::net::SocketAddr, user: &str) -> Arc<CallManager> {
    let (transport, inbox) = TcpSignalingClient::connect(addr, user.into(), Arc::new(NoopLogSink))
        .await
        .unwrap();
    let services = CallServices {
        transport,
        links: Arc::new(SimPeerLinkFactory::new()),
        devices: Arc::new(SimMediaDevices::with_default_catalog()),
        directory: Arc::new(StaticDirectory::new()),
        logger: Arc::new(NoopLogSink),
    };
    let (manager, _events) =
        CallManager::new(services, CallConfig::default(), DeviceSelection::default());
    let manager = Arc::new(manager);
    let runner = Arc::clone(&manager);
    tokio::spawn(async move { runner.run(inbox).await });
    manager
}

async fn wait_state(manager: &CallManager, peer: &str, want: CallState) {
    let peer = PeerId::from(peer);
    let reached = tokio::time::timeout(WAIT, async {
        let mut rx = loop {
            if let Some(rx) = manager.watch_state(&peer) {
                break rx;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        rx.wait_for(|s| *s == want).await.is_ok()
    })
    .await;
    assert_eq!(reached, Ok(true), "{peer} never reached {want:?}");
}

#[tokio::test]
async fn call_over_tcp_relay() {
    let (relay, addr) = start_relay().await;
    let alice = tcp_manager(addr, "alice").await;
    let bob = tcp_manager(addr, "bob").await;
    wait_online(&relay, &["alice", "bob"]).await;

    alice.start_call("bob", MediaKind::Video).await.unwrap();
    wait_state(&bob, "alice", CallState::Ringing).await;
    bob.accept_call("alice").await.unwrap();
    wait_state(&alice, "bob", CallState::Active).await;
    wait_state(&bob, "alice", CallState::Active).await;

    assert!(bob.end_call("alice"));
    wait_state(&bob, "alice", CallState::Ended).await;
    wait_state(&alice, "bob", CallState::Ended).await;
}
