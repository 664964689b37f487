// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete service stack on a process-embedded
//! `MemoryStore`: authority, queues, rooms, safety layer, and one gateway
//! instance. `TestClient` drives the same per-connection state machine the
//! WebSocket transport uses, with the bus subscription pumped explicitly so
//! tests control exactly when cross-task events are observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use rendez_core::{ClientCommand, ServerEvent, ServerFrame, SessionId};
use rendez_gateway::connection::{Connection, Flow};
use rendez_gateway::{Gateway, GatewayConfig, SharedGateway};
use rendez_match::{QueueEngine, RoomRegistry};
use rendez_safety::{RateLimiter, ReportService};
use rendez_session::{IssuedSession, SessionAuthority, TokenSigner};
use rendez_store::{MemoryStore, StateStore, Subscription};

const TEST_SECRET: &str = "test-secret-test-secret-test-secret!";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    scan_limit: usize,
    liveness_window: Duration,
    session_ttl: Duration,
    warn_delay: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scan_limit: 50,
            liveness_window: Duration::from_secs(30),
            session_ttl: Duration::from_secs(86_400),
            warn_delay: Duration::from_millis(10),
        }
    }

    /// Cap the pairing scan.
    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Shrink or grow the queue liveness window.
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Override the session TTL.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Override the forced-disconnect warning delay.
    pub fn with_warn_delay(mut self, delay: Duration) -> Self {
        self.warn_delay = delay;
        self
    }

    /// Build the harness, wiring every subsystem to one memory store.
    pub fn build(self) -> TestHarness {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let authority = SessionAuthority::new(
            store.clone(),
            TokenSigner::new(TEST_SECRET),
            self.session_ttl,
        );
        let sessions = authority.sessions().clone();
        let rooms = RoomRegistry::new(store.clone(), sessions.clone());
        let queues = QueueEngine::new(
            store.clone(),
            sessions.clone(),
            rooms.clone(),
            self.scan_limit,
            self.liveness_window,
        );
        let config = GatewayConfig {
            warn_delay: self.warn_delay,
            liveness_window: self.liveness_window,
            ice_urls: vec!["stun:stun.example.org:3478".to_string()],
            ..GatewayConfig::default()
        };
        let gateway = Gateway::new(
            config,
            store.clone(),
            authority,
            rooms,
            queues,
            RateLimiter::new(store.clone()),
            ReportService::new(store.clone(), sessions),
        );
        TestHarness { store, gateway }
    }
}

/// A complete service stack over one in-memory store.
pub struct TestHarness {
    pub store: Arc<dyn StateStore>,
    pub gateway: SharedGateway,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Issue a fresh session.
    pub async fn issue(&self) -> IssuedSession {
        self.gateway
            .authority
            .issue()
            .await
            .expect("memory store issuance cannot fail")
    }

    /// Create an unauthenticated client.
    pub fn client(&self) -> TestClient {
        let (tx, rx) = mpsc::channel(128);
        TestClient {
            conn: Connection::new(self.gateway.clone(), tx),
            rx,
            bus: None,
            gateway: self.gateway.clone(),
        }
    }

    /// Issue a session and return a client already attached to it.
    pub async fn connected_client(&self) -> (TestClient, IssuedSession) {
        let issued = self.issue().await;
        let mut client = self.client();
        let flow = client.auth(&issued.token).await;
        assert_eq!(flow, Flow::Continue, "fresh token must authenticate");
        (client, issued)
    }
}

/// Drives one connection state machine the way the WebSocket loop does.
pub struct TestClient {
    pub conn: Connection,
    rx: mpsc::Receiver<ServerFrame>,
    bus: Option<Subscription>,
    gateway: SharedGateway,
}

impl TestClient {
    /// Authenticate and start the bus subscription on success.
    pub async fn auth(&mut self, token: &str) -> Flow {
        let flow = self
            .conn
            .handle_command(None, ClientCommand::Auth {
                token: token.to_string(),
            })
            .await;
        if let Some(session) = self.conn.session() {
            self.bus = Some(self.gateway.subscribe(session));
        }
        flow
    }

    /// Send one command through the state machine.
    pub async fn command(&mut self, seq: Option<u64>, command: ClientCommand) -> Flow {
        self.conn.handle_command(seq, command).await
    }

    /// The session this client is attached to.
    pub fn session_id(&self) -> SessionId {
        self.conn.session().cloned().expect("client not attached")
    }

    /// Deliver every pending bus payload into the state machine, the way
    /// the transport's fan-in task would.
    pub async fn pump_bus(&mut self) -> Flow {
        let Some(bus) = self.bus.as_mut() else {
            return Flow::Continue;
        };
        while let Some(payload) = bus.try_recv() {
            if self.conn.handle_bus(&payload).await == Flow::Close {
                return Flow::Close;
            }
        }
        Flow::Continue
    }

    /// Pop the next emitted event, if any.
    pub fn try_event(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok().map(|frame| frame.event)
    }

    /// Pop the next emitted frame with its correlation number.
    pub fn try_frame(&mut self) -> Option<ServerFrame> {
        self.rx.try_recv().ok()
    }

    /// Pop the next event, failing the test if none is pending.
    pub fn expect_event(&mut self) -> ServerEvent {
        self.try_event().expect("expected a pending event")
    }

    /// Assert no event is pending.
    pub fn expect_silence(&mut self) {
        if let Some(event) = self.try_event() {
            panic!("expected no event, got {event:?}");
        }
    }

    /// Drop all pending events.
    pub fn drain_events(&mut self) {
        while self.try_event().is_some() {}
    }

    /// Detach the connection as the transport would on close.
    pub async fn disconnect(&mut self) {
        self.conn.detach().await;
        self.bus = None;
    }
}
