// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection state machine.
//!
//! Each long-lived connection owns a [`Connection`] value that moves through
//! `Unauthenticated -> Idle -> Queued -> Paired -> TearingDown`. Inbound
//! commands dispatch on the current phase; events to the client flow through
//! the outbound channel owned by the connection task. Bus events published
//! by other tasks or instances drive the same machine.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use rendez_core::{
    BusEvent, ClientCommand, ClientFrame, ConnectionId, Intent, Medium, RendezError, RoomId,
    ServerEvent, ServerFrame, SessionId, SignalEnvelope,
};
use rendez_match::EnqueueOutcome;
use rendez_safety::RateLimit;
use rendez_store::keys;

use crate::SharedGateway;
use crate::stats::DAY_COUNTER_TTL;

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Transport open, no token presented yet.
    Unauthenticated,
    /// Authenticated, neither queued nor paired.
    Idle,
    /// Waiting in a queue.
    Queued,
    /// In a room.
    Paired,
    /// Detach in progress; no further commands are processed.
    TearingDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Unauthenticated => write!(f, "unauthenticated"),
            Phase::Idle => write!(f, "idle"),
            Phase::Queued => write!(f, "queued"),
            Phase::Paired => write!(f, "paired"),
            Phase::TearingDown => write!(f, "tearing-down"),
        }
    }
}

/// What the connection task should do after handling an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// State machine for one client connection.
pub struct Connection {
    id: ConnectionId,
    gateway: SharedGateway,
    outbound: mpsc::Sender<ServerFrame>,
    session: Option<SessionId>,
    phase: Phase,
}

impl Connection {
    pub fn new(gateway: SharedGateway, outbound: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id: ConnectionId(Uuid::new_v4().to_string()),
            gateway,
            outbound,
            session: None,
            phase: Phase::Unauthenticated,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    async fn emit(&self, frame: ServerFrame) {
        // A failed send means the sender task is gone and the connection
        // is closing anyway.
        let _ = self.outbound.send(frame).await;
    }

    async fn emit_error(&self, seq: Option<u64>, message: impl Into<String>) {
        self.emit(ServerFrame::ack(
            seq,
            ServerEvent::Error {
                message: message.into(),
            },
        ))
        .await;
    }

    /// Tell the client this instance is going away.
    pub async fn emit_shutting_down(&self) {
        self.emit(ServerFrame::push(ServerEvent::ShuttingDown)).await;
    }

    /// Handle one raw inbound frame.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "unparseable client frame");
                self.emit_error(None, "invalid message").await;
                return Flow::Continue;
            }
        };
        self.handle_command(frame.seq, frame.command).await
    }

    /// Dispatch one parsed command against the current phase.
    pub async fn handle_command(&mut self, seq: Option<u64>, command: ClientCommand) -> Flow {
        if self.phase == Phase::TearingDown {
            return Flow::Continue;
        }

        let command = match command {
            ClientCommand::Auth { token } => return self.cmd_auth(seq, &token).await,
            other => other,
        };

        let Some(session) = self.session.clone() else {
            self.emit(ServerFrame::ack(
                seq,
                ServerEvent::AuthError {
                    message: "authenticate first".to_string(),
                },
            ))
            .await;
            return Flow::Close;
        };

        // Default per-session command budget; individual commands may add
        // stricter scopes on top.
        if !self
            .gateway
            .limiter
            .check(&RateLimit::COMMANDS, &session.0)
            .await
        {
            self.emit_error(seq, "rate limited: commands").await;
            return Flow::Continue;
        }
        metrics::counter!("rendez_commands_total").increment(1);

        let result = match command {
            ClientCommand::Auth { .. } => unreachable!("auth handled above"),
            ClientCommand::JoinQueue {
                mode,
                connection_type,
            } => self.cmd_join_queue(seq, &session, mode, connection_type).await,
            ClientCommand::Next {
                room_id,
                mode,
                connection_type,
            } => {
                self.cmd_next(seq, &session, &room_id, mode, connection_type)
                    .await
            }
            ClientCommand::Leave { room_id } => self.cmd_leave(&session, room_id.as_ref()).await,
            ClientCommand::Signal {
                room_id,
                target_id,
                signal,
            } => self.cmd_signal(seq, &session, &room_id, &target_id, signal).await,
            ClientCommand::GetStats => self.cmd_stats(seq).await,
            ClientCommand::Ping => self.cmd_ping(seq, &session).await,
        };

        match result {
            Ok(flow) => flow,
            Err(e) => {
                warn!(
                    connection_id = %self.id,
                    session_id = %session,
                    error = %e,
                    "command failed"
                );
                self.emit_error(seq, e.to_string()).await;
                Flow::Continue
            }
        }
    }

    /// Authentication handshake: bind the session to this connection.
    async fn cmd_auth(&mut self, seq: Option<u64>, token: &str) -> Flow {
        if self.phase != Phase::Unauthenticated {
            self.emit_error(seq, "already authenticated").await;
            return Flow::Continue;
        }

        let session = match self.gateway.authority.verify(token).await {
            Ok(session) => session,
            Err(e) => {
                info!(connection_id = %self.id, error = %e, "authentication failed");
                self.emit(ServerFrame::ack(
                    seq,
                    ServerEvent::AuthError {
                        message: e.to_string(),
                    },
                ))
                .await;
                return Flow::Close;
            }
        };

        if let Err(e) = self.attach(&session).await {
            warn!(session_id = %session, error = %e, "attach failed");
            self.emit(ServerFrame::ack(
                seq,
                ServerEvent::AuthError {
                    message: "could not attach session".to_string(),
                },
            ))
            .await;
            return Flow::Close;
        }

        info!(
            connection_id = %self.id,
            session_id = %session,
            phase = %self.phase,
            "session attached"
        );
        Flow::Continue
    }

    /// Write the connection binding and recover phase from the record.
    ///
    /// A session re-attaching mid-room (new tab) comes back as `Paired`;
    /// the stale-socket rule keeps the old transport from undoing it.
    async fn attach(&mut self, session: &SessionId) -> Result<(), RendezError> {
        self.gateway.sessions.bind_socket(session, &self.id).await?;
        self.gateway.authority.touch(session).await?;

        let record = self.gateway.sessions.record(session).await?;
        self.phase = match record {
            Some(record) if record.match_id.is_some() => Phase::Paired,
            Some(record) if record.in_queue => Phase::Queued,
            _ => Phase::Idle,
        };
        self.session = Some(session.clone());

        self.gateway.online_add(1);
        self.gateway
            .store
            .hash_incr(keys::STATS_COUNTERS, "totalConnections", 1)
            .await?;
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        self.gateway
            .store
            .incr(&keys::stats_day(&today), 1, Some(DAY_COUNTER_TTL))
            .await?;
        metrics::counter!("rendez_connections_total").increment(1);
        Ok(())
    }

    async fn cmd_join_queue(
        &mut self,
        seq: Option<u64>,
        session: &SessionId,
        intent: Intent,
        medium: Medium,
    ) -> Result<Flow, RendezError> {
        if self.phase == Phase::Paired {
            return Err(RendezError::conflict("already in a room; use next or leave"));
        }

        self.gateway.authority.touch(session).await?;
        self.gateway.queues.withdraw(session).await?;
        self.gateway
            .store
            .hash_incr(keys::STATS_COUNTERS, &format!("mode:{intent}"), 1)
            .await?;

        match self.gateway.queues.enqueue(session, intent, medium).await? {
            EnqueueOutcome::Matched { room } => {
                self.announce_match(seq, session, &room).await?;
                self.phase = Phase::Paired;
            }
            EnqueueOutcome::Waiting => {
                self.emit(ServerFrame::ack(seq, ServerEvent::Waiting)).await;
                self.phase = Phase::Queued;
            }
        }
        Ok(Flow::Continue)
    }

    async fn cmd_next(
        &mut self,
        seq: Option<u64>,
        session: &SessionId,
        _claimed_room: &RoomId,
        intent: Intent,
        medium: Medium,
    ) -> Result<Flow, RendezError> {
        self.gateway.authority.touch(session).await?;

        // The session's own mapping is authoritative; the claimed room id
        // in the command is advisory only.
        if let Some(room_id) = self.gateway.rooms.resolve(session).await? {
            self.gateway.teardown_room(session, &room_id, true).await?;
        }

        self.gateway.queues.withdraw(session).await?;
        match self.gateway.queues.enqueue(session, intent, medium).await? {
            EnqueueOutcome::Matched { room } => {
                self.announce_match(seq, session, &room).await?;
                self.phase = Phase::Paired;
            }
            EnqueueOutcome::Waiting => {
                self.emit(ServerFrame::ack(seq, ServerEvent::Waiting)).await;
                self.phase = Phase::Queued;
            }
        }
        Ok(Flow::Continue)
    }

    async fn cmd_leave(
        &mut self,
        session: &SessionId,
        _claimed_room: Option<&RoomId>,
    ) -> Result<Flow, RendezError> {
        // Stale-socket rule: a leave from a superseded transport is
        // silently ignored.
        let current = self.gateway.sessions.current_socket(session).await?;
        if current.as_ref() != Some(&self.id) {
            debug!(
                connection_id = %self.id,
                session_id = %session,
                "leave from superseded transport ignored"
            );
            return Ok(Flow::Continue);
        }

        self.gateway.authority.touch(session).await?;
        if let Some(room_id) = self.gateway.rooms.resolve(session).await? {
            self.gateway.teardown_room(session, &room_id, false).await?;
        }
        self.gateway.queues.withdraw(session).await?;
        self.phase = Phase::Idle;
        Ok(Flow::Continue)
    }

    async fn cmd_signal(
        &mut self,
        seq: Option<u64>,
        session: &SessionId,
        room: &RoomId,
        target: &SessionId,
        signal: SignalEnvelope,
    ) -> Result<Flow, RendezError> {
        self.gateway
            .limiter
            .enforce(&RateLimit::SIGNALING, &session.0)
            .await?;

        match self.gateway.relay.relay(session, room, target, signal).await {
            Ok(()) => Ok(Flow::Continue),
            Err(RendezError::NotAuthorized { .. }) => {
                // Normal outcome of a signal racing a room teardown; the
                // client learns via peer-left/peer-skipped instead.
                debug!(session_id = %session, room_id = %room, "signal to dead room dropped");
                Ok(Flow::Continue)
            }
            Err(e) => {
                self.emit_error(seq, e.to_string()).await;
                Ok(Flow::Continue)
            }
        }
    }

    async fn cmd_stats(&mut self, seq: Option<u64>) -> Result<Flow, RendezError> {
        let snapshot = self
            .gateway
            .stats
            .snapshot(&self.gateway.store, self.gateway.online())
            .await?;
        self.emit(ServerFrame::ack(seq, ServerEvent::Stats(snapshot)))
            .await;
        Ok(Flow::Continue)
    }

    async fn cmd_ping(&mut self, seq: Option<u64>, session: &SessionId) -> Result<Flow, RendezError> {
        self.gateway.authority.touch(session).await?;
        self.emit(ServerFrame::ack(seq, ServerEvent::Pong)).await;
        Ok(Flow::Continue)
    }

    /// Ack the caller and notify the popped counterparty.
    async fn announce_match(
        &self,
        seq: Option<u64>,
        session: &SessionId,
        room: &rendez_core::Room,
    ) -> Result<(), RendezError> {
        let peer = room
            .peer_of(session)
            .cloned()
            .ok_or_else(|| RendezError::Fatal("minted room lacks the caller".to_string()))?;

        self.emit(ServerFrame::ack(
            seq,
            ServerEvent::Matched {
                room_id: room.id.clone(),
                peer_id: peer.clone(),
                is_initiator: true,
            },
        ))
        .await;

        self.gateway
            .publish_to(
                &peer,
                &BusEvent::Matched {
                    room_id: room.id.clone(),
                    peer_id: session.clone(),
                    is_initiator: false,
                },
            )
            .await?;
        metrics::counter!("rendez_matches_total").increment(1);
        Ok(())
    }

    /// Handle one payload from the session's bus topic.
    pub async fn handle_bus(&mut self, payload: &str) -> Flow {
        let Some(session) = self.session.clone() else {
            return Flow::Continue;
        };
        let event: BusEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %session, error = %e, "unparseable bus event");
                return Flow::Continue;
            }
        };

        match event {
            BusEvent::Matched {
                room_id,
                peer_id,
                is_initiator,
            } => {
                self.phase = Phase::Paired;
                self.emit(ServerFrame::push(ServerEvent::Matched {
                    room_id,
                    peer_id,
                    is_initiator,
                }))
                .await;
                Flow::Continue
            }
            BusEvent::PeerLeft { requeued } => {
                self.phase = if requeued { Phase::Queued } else { Phase::Idle };
                self.emit(ServerFrame::push(ServerEvent::PeerLeft)).await;
                Flow::Continue
            }
            BusEvent::PeerSkipped { requeued } => {
                self.phase = if requeued { Phase::Queued } else { Phase::Idle };
                self.emit(ServerFrame::push(ServerEvent::PeerSkipped)).await;
                Flow::Continue
            }
            BusEvent::Signal {
                room_id,
                from_id,
                signal,
            } => {
                // Confinement check at delivery time: only emit signals
                // scoped to the session's current room.
                match self.gateway.rooms.authorize(&session, &room_id).await {
                    Ok(true) => {
                        self.emit(ServerFrame::push(ServerEvent::Signal { signal, from_id }))
                            .await;
                    }
                    Ok(false) => {
                        debug!(session_id = %session, room_id = %room_id, "stale signal dropped");
                    }
                    Err(e) => {
                        warn!(session_id = %session, error = %e, "signal authorization failed");
                    }
                }
                Flow::Continue
            }
            BusEvent::ForceDisconnect { reason } => {
                info!(session_id = %session, reason = %reason, "force disconnect");
                if let Err(e) = self.force_leave(&session).await {
                    warn!(session_id = %session, error = %e, "forced leave failed");
                }
                self.emit_error(None, reason).await;
                Flow::Close
            }
        }
    }

    /// Leave semantics executed on behalf of the session, regardless of
    /// which transport currently owns it.
    async fn force_leave(&mut self, session: &SessionId) -> Result<(), RendezError> {
        self.phase = Phase::TearingDown;
        if let Some(room_id) = self.gateway.rooms.resolve(session).await? {
            self.gateway.teardown_room(session, &room_id, false).await?;
        }
        self.gateway.queues.withdraw(session).await?;
        Ok(())
    }

    /// Detach on transport close.
    ///
    /// Runs leave semantics only when this connection still owns the
    /// session binding; a detach from a superseded transport must leave
    /// the session and its room untouched.
    pub async fn detach(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.phase = Phase::TearingDown;
        self.gateway.online_add(-1);

        let owner = match self.gateway.sessions.release_socket(&session, &self.id).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(session_id = %session, error = %e, "socket release failed");
                false
            }
        };
        if !owner {
            debug!(
                connection_id = %self.id,
                session_id = %session,
                "stale transport detached, session untouched"
            );
            return;
        }

        if let Err(e) = async {
            if let Some(room_id) = self.gateway.rooms.resolve(&session).await? {
                self.gateway.teardown_room(&session, &room_id, false).await?;
            }
            self.gateway.queues.withdraw(&session).await
        }
        .await
        {
            warn!(session_id = %session, error = %e, "detach cleanup failed");
        }

        info!(connection_id = %self.id, session_id = %session, "session detached");
    }
}
