// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios for the complete matchmaking and signaling stack.
//!
//! Each test assembles an isolated harness over a fresh in-memory store and
//! drives the same per-connection state machine the WebSocket transport
//! uses. Bus deliveries are pumped explicitly so the tests control exactly
//! when cross-task events are observed.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use rendez_core::{ClientCommand, Intent, Medium, ServerEvent, SignalEnvelope, SignalKind};
use rendez_gateway::connection::{Flow, Phase};
use rendez_gateway::server::build_router;
use rendez_test_utils::TestHarness;

fn join(mode: Intent, connection_type: Medium) -> ClientCommand {
    ClientCommand::JoinQueue {
        mode,
        connection_type,
    }
}

fn offer() -> SignalEnvelope {
    SignalEnvelope {
        kind: SignalKind::Offer,
        payload: serde_json::json!({"sdp": "v=0"}),
    }
}

// ---- S1: Symmetric pairing ----

#[tokio::test]
async fn symmetric_pairing_end_to_end() {
    let harness = TestHarness::builder().build();
    let (mut alice, _) = harness.connected_client().await;
    let (mut bob, _) = harness.connected_client().await;
    let alice_id = alice.session_id();
    let bob_id = bob.session_id();

    // Alice enqueues first and waits.
    alice.command(Some(1), join(Intent::Casual, Medium::Chat)).await;
    let frame = alice.try_frame().unwrap();
    assert_eq!(frame.seq, Some(1), "ack echoes the correlation");
    assert!(matches!(frame.event, ServerEvent::Waiting));

    // Bob enqueues and matches: he popped Alice, so he initiates.
    bob.command(Some(2), join(Intent::Casual, Medium::Chat)).await;
    let frame = bob.try_frame().unwrap();
    assert_eq!(frame.seq, Some(2));
    let ServerEvent::Matched {
        room_id,
        peer_id,
        is_initiator,
    } = frame.event
    else {
        panic!("expected matched");
    };
    assert_eq!(peer_id, alice_id);
    assert!(is_initiator);

    // Alice hears about it over the bus, as the non-initiating side.
    alice.pump_bus().await;
    let ServerEvent::Matched {
        room_id: alice_room,
        peer_id,
        is_initiator,
    } = alice.expect_event()
    else {
        panic!("expected matched");
    };
    assert_eq!(alice_room, room_id);
    assert_eq!(peer_id, bob_id);
    assert!(!is_initiator);

    // Both mappings agree and the room records Bob as initiator.
    assert_eq!(
        harness.gateway.rooms.resolve(&alice_id).await.unwrap(),
        Some(room_id.clone())
    );
    assert_eq!(
        harness.gateway.rooms.resolve(&bob_id).await.unwrap(),
        Some(room_id.clone())
    );
    let room = harness.gateway.rooms.lookup(&room_id).await.unwrap().unwrap();
    assert_eq!(room.initiator, bob_id);
    assert_eq!(room.participants.len(), 2);

    assert_eq!(alice.conn.phase(), Phase::Paired);
    assert_eq!(bob.conn.phase(), Phase::Paired);
}

// ---- S2: Cross-intent pairing ----

#[tokio::test]
async fn hire_and_freelance_cross_pair() {
    let harness = TestHarness::builder().build();
    let (mut hirer, _) = harness.connected_client().await;
    let (mut freelancer, _) = harness.connected_client().await;
    let hirer_id = hirer.session_id();

    hirer.command(None, join(Intent::Hire, Medium::Video)).await;
    assert!(matches!(hirer.expect_event(), ServerEvent::Waiting));

    freelancer
        .command(None, join(Intent::Freelance, Medium::Video))
        .await;
    let ServerEvent::Matched { peer_id, .. } = freelancer.expect_event() else {
        panic!("expected matched");
    };
    assert_eq!(peer_id, hirer_id);
}

#[tokio::test]
async fn two_hires_never_match() {
    let harness = TestHarness::builder().build();
    let (mut first, _) = harness.connected_client().await;
    let (mut second, _) = harness.connected_client().await;

    first.command(None, join(Intent::Hire, Medium::Video)).await;
    second.command(None, join(Intent::Hire, Medium::Video)).await;

    assert!(matches!(first.expect_event(), ServerEvent::Waiting));
    assert!(matches!(second.expect_event(), ServerEvent::Waiting));
    assert_eq!(
        harness
            .gateway
            .queues
            .waiting(Intent::Hire, Medium::Video)
            .await
            .unwrap(),
        2
    );
}

// ---- S3: Skip cascade ----

#[tokio::test]
async fn skip_rematches_both_sides_when_a_candidate_waits() {
    let harness = TestHarness::builder().build();
    let (mut alice, _) = harness.connected_client().await;
    let (mut bob, _) = harness.connected_client().await;
    let (mut carol, _) = harness.connected_client().await;
    let alice_id = alice.session_id();
    let bob_id = bob.session_id();
    let carol_id = carol.session_id();

    // Alice and Bob pair up.
    alice.command(None, join(Intent::Casual, Medium::Chat)).await;
    bob.command(None, join(Intent::Casual, Medium::Chat)).await;
    alice.drain_events();
    bob.drain_events();
    alice.pump_bus().await;
    alice.drain_events();
    let old_room = harness.gateway.rooms.resolve(&alice_id).await.unwrap().unwrap();

    // Carol waits in the compatible queue.
    carol.command(None, join(Intent::Casual, Medium::Chat)).await;
    assert!(matches!(carol.expect_event(), ServerEvent::Waiting));

    // Alice skips: the old room dies, Bob is rematched with Carol, and
    // Alice re-enters the queue.
    alice
        .command(Some(3), ClientCommand::Next {
            room_id: old_room.clone(),
            mode: Intent::Casual,
            connection_type: Medium::Chat,
        })
        .await;
    let frame = alice.try_frame().unwrap();
    assert_eq!(frame.seq, Some(3));
    assert!(matches!(frame.event, ServerEvent::Waiting));
    assert_eq!(alice.conn.phase(), Phase::Queued);

    // No lingering mapping points at the destroyed room.
    assert!(harness.gateway.rooms.lookup(&old_room).await.unwrap().is_none());
    assert_eq!(
        harness.gateway.rooms.resolve(&alice_id).await.unwrap(),
        None
    );

    // Bob: peer-skipped first, then matched with Carol.
    bob.pump_bus().await;
    assert!(matches!(bob.expect_event(), ServerEvent::PeerSkipped));
    let ServerEvent::Matched {
        peer_id,
        is_initiator,
        ..
    } = bob.expect_event()
    else {
        panic!("expected matched after skip");
    };
    assert_eq!(peer_id, carol_id);
    assert!(is_initiator, "the rematched side popped the waiting candidate");
    assert_eq!(bob.conn.phase(), Phase::Paired);

    // Carol: matched with Bob.
    carol.pump_bus().await;
    let ServerEvent::Matched { peer_id, .. } = carol.expect_event() else {
        panic!("expected matched");
    };
    assert_eq!(peer_id, bob_id);

    let new_room = harness.gateway.rooms.resolve(&bob_id).await.unwrap().unwrap();
    assert_ne!(new_room, old_room);
    assert_eq!(
        harness.gateway.rooms.resolve(&carol_id).await.unwrap(),
        Some(new_room)
    );
}

#[tokio::test]
async fn skip_without_candidates_requeues_both() {
    let harness = TestHarness::builder().build();
    let (mut alice, _) = harness.connected_client().await;
    let (mut bob, _) = harness.connected_client().await;

    alice.command(None, join(Intent::Casual, Medium::Chat)).await;
    bob.command(None, join(Intent::Casual, Medium::Chat)).await;
    alice.drain_events();
    bob.drain_events();
    alice.pump_bus().await;
    alice.drain_events();
    let room = harness
        .gateway
        .rooms
        .resolve(&alice.session_id())
        .await
        .unwrap()
        .unwrap();

    alice
        .command(None, ClientCommand::Next {
            room_id: room,
            mode: Intent::Casual,
            connection_type: Medium::Chat,
        })
        .await;

    bob.pump_bus().await;
    assert!(matches!(bob.expect_event(), ServerEvent::PeerSkipped));
    assert_eq!(bob.conn.phase(), Phase::Queued);

    // Bob was requeued first, so Alice's own rematch found him... unless
    // ordering kept them apart; either way both end up queued or paired
    // together, never half-and-half.
    let alice_room = harness.gateway.rooms.resolve(&alice.session_id()).await.unwrap();
    let bob_room = harness.gateway.rooms.resolve(&bob.session_id()).await.unwrap();
    assert_eq!(alice_room.is_some(), bob_room.is_some());
}

// ---- S4: Stale-socket tab swap ----

#[tokio::test]
async fn tab_swap_keeps_the_room_alive() {
    let harness = TestHarness::builder().build();
    let (mut tab1, issued) = harness.connected_client().await;
    let (mut bob, _) = harness.connected_client().await;
    let alice_id = tab1.session_id();
    let bob_id = bob.session_id();

    tab1.command(None, join(Intent::Casual, Medium::Chat)).await;
    bob.command(None, join(Intent::Casual, Medium::Chat)).await;
    tab1.drain_events();
    bob.drain_events();
    let room = harness.gateway.rooms.resolve(&alice_id).await.unwrap().unwrap();

    // The same session re-opens the app in a new tab.
    let mut tab2 = harness.client();
    assert_eq!(tab2.auth(&issued.token).await, Flow::Continue);
    assert_eq!(tab2.conn.phase(), Phase::Paired, "re-attach recovers the room");

    // The old tab's transport closes afterwards: a no-op.
    tab1.disconnect().await;
    assert_eq!(
        harness.gateway.rooms.resolve(&alice_id).await.unwrap(),
        Some(room.clone()),
        "late detach from the superseded transport must not tear the room down"
    );
    assert_eq!(
        harness.gateway.sessions.current_socket(&alice_id).await.unwrap().as_ref(),
        Some(tab2.conn.id())
    );

    // Signaling from the new tab still reaches Bob.
    tab2.command(None, ClientCommand::Signal {
        room_id: room,
        target_id: bob_id,
        signal: offer(),
    })
    .await;
    bob.pump_bus().await;
    let ServerEvent::Signal { from_id, signal } = bob.expect_event() else {
        panic!("expected a relayed signal");
    };
    assert_eq!(from_id, alice_id);
    assert_eq!(signal.kind, SignalKind::Offer);
}

// ---- S5: Auto-disconnect after repeated reports ----

#[tokio::test]
async fn three_reports_force_disconnect_the_target() {
    let harness = TestHarness::builder()
        .with_warn_delay(Duration::from_millis(20))
        .build();
    let router = build_router(harness.gateway.clone());

    let (mut target, _) = harness.connected_client().await;
    let (mut peer, _) = harness.connected_client().await;
    let target_id = target.session_id();

    // Target and peer share a room.
    target.command(None, join(Intent::Casual, Medium::Chat)).await;
    peer.command(None, join(Intent::Casual, Medium::Chat)).await;
    target.drain_events();
    peer.drain_events();
    target.pump_bus().await;
    target.drain_events();
    let room = harness.gateway.rooms.resolve(&target_id).await.unwrap().unwrap();

    // Three distinct reporters file one report each.
    for i in 0..3 {
        let reporter = harness.issue().await;
        let body = serde_json::json!({
            "reportedSessionId": target_id.0,
            "roomId": room.0,
            "reason": "abuse",
        });
        let mut request = Request::post("/api/reports")
            .header("authorization", format!("Bearer {}", reporter.token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let addr: SocketAddr = "203.0.113.7:9000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["shouldAutoDisconnect"],
            i == 2,
            "only the third report flags auto-disconnect"
        );
    }

    // After the warning delay, the force-disconnect lands on the target.
    tokio::time::sleep(Duration::from_millis(80)).await;
    let flow = target.pump_bus().await;
    assert_eq!(flow, Flow::Close, "the target's connection is closed");
    assert!(harness.gateway.rooms.resolve(&target_id).await.unwrap().is_none());

    // The counterparty hears peer-left.
    peer.pump_bus().await;
    assert!(matches!(peer.expect_event(), ServerEvent::PeerLeft));
}

// ---- S6: Stale candidate skip ----

#[tokio::test]
async fn stale_queue_entries_are_discarded_on_pop() {
    let harness = TestHarness::builder()
        .with_liveness_window(Duration::from_millis(50))
        .build();

    // A enqueues, then goes silent past the liveness window.
    let (mut a, _) = harness.connected_client().await;
    a.command(None, join(Intent::Casual, Medium::Chat)).await;
    a.drain_events();

    tokio::time::sleep(Duration::from_millis(80)).await;

    // B enqueues: A's entry is popped, found stale, and dropped; B waits.
    let (mut b, _) = harness.connected_client().await;
    b.command(None, join(Intent::Casual, Medium::Chat)).await;
    assert!(matches!(b.expect_event(), ServerEvent::Waiting));
    assert_eq!(
        harness
            .gateway
            .queues
            .waiting(Intent::Casual, Medium::Chat)
            .await
            .unwrap(),
        1,
        "A's stale entry is gone; only B waits"
    );

    // C enqueues immediately and matches the live waiter, never the
    // stale one.
    let (mut c, _) = harness.connected_client().await;
    c.command(None, join(Intent::Casual, Medium::Chat)).await;
    let ServerEvent::Matched { peer_id, .. } = c.expect_event() else {
        panic!("expected matched");
    };
    assert_eq!(peer_id, b.session_id());
    assert!(
        harness
            .gateway
            .rooms
            .resolve(&a.session_id())
            .await
            .unwrap()
            .is_none(),
        "the stale session was not paired"
    );
    assert_eq!(
        harness
            .gateway
            .queues
            .waiting(Intent::Casual, Medium::Chat)
            .await
            .unwrap(),
        0
    );
}

// ---- Laws ----

#[tokio::test]
async fn token_round_trip_recovers_the_session() {
    let harness = TestHarness::builder().build();
    let issued = harness.issue().await;
    let verified = harness.gateway.authority.verify(&issued.token).await.unwrap();
    assert_eq!(verified, issued.session_id);
}

#[tokio::test]
async fn destroy_is_idempotent_through_the_full_stack() {
    let harness = TestHarness::builder().build();
    let (mut a, _) = harness.connected_client().await;
    let (mut b, _) = harness.connected_client().await;
    a.command(None, join(Intent::Casual, Medium::Chat)).await;
    b.command(None, join(Intent::Casual, Medium::Chat)).await;

    let room = harness
        .gateway
        .rooms
        .resolve(&a.session_id())
        .await
        .unwrap()
        .unwrap();
    let first = harness.gateway.rooms.destroy(&room).await.unwrap();
    assert_eq!(first.len(), 2);
    let second = harness.gateway.rooms.destroy(&room).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn pairing_exclusivity_holds_after_churn() {
    let harness = TestHarness::builder().build();
    let (mut a, _) = harness.connected_client().await;
    let (mut b, _) = harness.connected_client().await;
    let (mut c, _) = harness.connected_client().await;

    for client in [&mut a, &mut b, &mut c] {
        client.command(None, join(Intent::Casual, Medium::Chat)).await;
        client.drain_events();
    }
    for client in [&mut a, &mut b, &mut c] {
        client.pump_bus().await;
        client.drain_events();
    }

    // Exactly one pair formed; everyone has at most one room, and queue
    // membership excludes room membership.
    let mut paired = 0;
    for client in [&a, &b, &c] {
        let sid = client.session_id();
        let record = harness.gateway.sessions.record(&sid).await.unwrap().unwrap();
        if record.match_id.is_some() {
            paired += 1;
            assert!(!record.in_queue, "paired session must not sit in a queue");
        }
    }
    assert_eq!(paired, 2);
    assert_eq!(
        harness
            .gateway
            .queues
            .waiting(Intent::Casual, Medium::Chat)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn stats_reflect_connections_and_rooms() {
    let harness = TestHarness::builder().build();
    let (mut a, _) = harness.connected_client().await;
    let (mut b, _) = harness.connected_client().await;
    a.command(None, join(Intent::Casual, Medium::Chat)).await;
    b.command(None, join(Intent::Casual, Medium::Chat)).await;

    let snapshot = harness
        .gateway
        .stats
        .snapshot(&harness.gateway.store, harness.gateway.online())
        .await
        .unwrap();
    assert_eq!(snapshot.online, 2);
    assert_eq!(snapshot.total_connections, 2);
    assert_eq!(snapshot.today_connections, 2);
    assert_eq!(snapshot.by_mode["casual"], 2);
    assert_eq!(snapshot.realtime.active_rooms, 1);
    assert_eq!(snapshot.realtime.total_waiting, 0);
}
