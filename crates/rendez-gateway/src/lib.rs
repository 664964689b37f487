// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection gateway for the Rendez signaling service.
//!
//! Each gateway instance owns the set of long-lived client connections it
//! accepted. Instances share nothing directly: sessions, queues, and rooms
//! live in the shared store, and events reach a session through its
//! `user:<sessionId>` bus topic regardless of which instance holds its
//! connection.

pub mod connection;
pub mod handlers;
pub mod relay;
pub mod server;
pub mod stats;
pub mod ws;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use rendez_core::{BusEvent, RendezError, SessionId};
use rendez_match::{QueueEngine, RoomRegistry};
use rendez_safety::{RateLimiter, ReportService};
use rendez_session::{SessionAuthority, Sessions};
use rendez_store::{StateStore, Subscription, keys};

use crate::relay::SignalRelay;
use crate::stats::StatsCache;

/// Gateway runtime settings.
///
/// Mirrors the relevant parts of `RendezConfig` so this crate does not
/// depend on the config crate.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Detach a connection after this much client silence.
    pub idle_timeout: Duration,
    /// Close a connection that has not authenticated within this window.
    pub auth_timeout: Duration,
    /// How long shutdown waits for outbound queues to drain.
    pub drain_timeout: Duration,
    /// UI-visible warning delay before a forced disconnect is executed.
    pub warn_delay: Duration,
    /// Queue liveness window, shared with the queue engine.
    pub liveness_window: Duration,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
    /// ICE server URLs handed to clients verbatim.
    pub ice_urls: Vec<String>,
    /// Prometheus text renderer for `/metrics`, when metrics are enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("idle_timeout", &self.idle_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .field("warn_delay", &self.warn_delay)
            .field("liveness_window", &self.liveness_window)
            .field("cors_origins", &self.cors_origins)
            .field("ice_urls", &self.ice_urls)
            .field(
                "prometheus_render",
                &self.prometheus_render.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            auth_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            warn_delay: Duration::from_secs(10),
            liveness_window: Duration::from_secs(30),
            cors_origins: vec!["*".to_string()],
            ice_urls: Vec::new(),
            prometheus_render: None,
        }
    }
}

/// One gateway instance: services plus the process-local connection state.
pub struct Gateway {
    pub config: GatewayConfig,
    pub store: Arc<dyn StateStore>,
    pub authority: SessionAuthority,
    pub sessions: Sessions,
    pub rooms: RoomRegistry,
    pub queues: QueueEngine,
    pub limiter: RateLimiter,
    pub reports: ReportService,
    pub relay: SignalRelay,
    pub stats: StatsCache,
    /// Cooperative shutdown for the listener and every connection task.
    pub shutdown: CancellationToken,
    online: AtomicI64,
    started: Instant,
}

/// Shared handle to one gateway instance.
pub type SharedGateway = Arc<Gateway>;

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn StateStore>,
        authority: SessionAuthority,
        rooms: RoomRegistry,
        queues: QueueEngine,
        limiter: RateLimiter,
        reports: ReportService,
    ) -> SharedGateway {
        let sessions = authority.sessions().clone();
        let relay = SignalRelay::new(rooms.clone(), store.clone());
        Arc::new(Self {
            config,
            store,
            authority,
            sessions,
            rooms,
            queues,
            limiter,
            reports,
            relay,
            stats: StatsCache::new(Duration::from_secs(2)),
            shutdown: CancellationToken::new(),
            online: AtomicI64::new(0),
            started: Instant::now(),
        })
    }

    /// Adjust the process-local online counter; returns the new value.
    pub fn online_add(&self, delta: i64) -> i64 {
        let online = self.online.fetch_add(delta, Ordering::Relaxed) + delta;
        metrics::gauge!("rendez_online_sessions").set(online as f64);
        online
    }

    /// Sessions attached to this instance (approximate by design).
    pub fn online(&self) -> i64 {
        self.online.load(Ordering::Relaxed)
    }

    /// Seconds since this instance started.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Subscribe to a session's bus topic.
    pub fn subscribe(&self, session: &SessionId) -> Subscription {
        self.store.subscribe(&keys::user_topic(session))
    }

    /// Publish a bus event to a session, wherever it is attached.
    pub async fn publish_to(
        &self,
        session: &SessionId,
        event: &BusEvent,
    ) -> Result<u64, RendezError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| RendezError::Fatal(format!("bus event encode: {e}")))?;
        self.store.publish(&keys::user_topic(session), &payload).await
    }

    /// Destroy `actor`'s room, notify the counterparty, and try to re-pair
    /// the counterparty immediately.
    ///
    /// The counterparty hears `peer-left`/`peer-skipped` before any new
    /// `matched`, so its UI can react in order. Returns the destroyed room,
    /// or `None` when it was already gone.
    pub async fn teardown_room(
        &self,
        actor: &SessionId,
        room_id: &rendez_core::RoomId,
        skipped: bool,
    ) -> Result<Option<rendez_core::Room>, RendezError> {
        let Some(room) = self.rooms.lookup(room_id).await? else {
            return Ok(None);
        };
        let Some(peer) = room.peer_of(actor).cloned() else {
            return Err(RendezError::not_authorized("not a participant of this room"));
        };

        self.rooms.destroy(room_id).await?;

        // The peer re-enters the waiting set under its own declared intent,
        // not the actor's.
        let peer_intent = match self.sessions.record(&peer).await? {
            Some(record) => record.selected_mode.unwrap_or(room.intent.counterpart()),
            None => room.intent.counterpart(),
        };

        let mut requeued = false;
        let mut peer_room: Option<rendez_core::Room> = None;
        if self
            .sessions
            .is_live(&peer, self.config.liveness_window)
            .await?
        {
            self.queues.withdraw(&peer).await?;
            match self.queues.enqueue(&peer, peer_intent, room.medium).await {
                Ok(rendez_match::EnqueueOutcome::Matched { room }) => peer_room = Some(room),
                Ok(rendez_match::EnqueueOutcome::Waiting) => requeued = true,
                Err(RendezError::Conflict { .. }) => {
                    // The peer already found a new room on another path.
                }
                Err(e) => warn!(peer = %peer, error = %e, "counterparty rematch failed"),
            }
        }

        let notice = if skipped {
            BusEvent::PeerSkipped { requeued }
        } else {
            BusEvent::PeerLeft { requeued }
        };
        self.publish_to(&peer, &notice).await?;

        if let Some(new_room) = peer_room {
            // The peer popped someone: it initiates toward its new match.
            let third = new_room
                .peer_of(&peer)
                .cloned()
                .ok_or_else(|| RendezError::Fatal("rematch room lacks the peer".to_string()))?;
            self.publish_to(
                &peer,
                &BusEvent::Matched {
                    room_id: new_room.id.clone(),
                    peer_id: third.clone(),
                    is_initiator: true,
                },
            )
            .await?;
            self.publish_to(
                &third,
                &BusEvent::Matched {
                    room_id: new_room.id.clone(),
                    peer_id: peer.clone(),
                    is_initiator: false,
                },
            )
            .await?;
            metrics::counter!("rendez_matches_total").increment(1);
        }

        Ok(Some(room))
    }
}
