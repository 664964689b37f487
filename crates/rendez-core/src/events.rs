// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire protocol for the long-lived client connection and the
//! cross-instance session bus.
//!
//! Client -> Server (JSON):
//! ```json
//! {"event": "join-queue", "seq": 3, "data": {"mode": "casual", "connectionType": "chat"}}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"event": "matched", "seq": 3, "data": {"roomId": "...", "peerId": "...", "isInitiator": true}}
//! {"event": "peer-left"}
//! ```
//!
//! `seq` is an optional client-chosen correlation number echoed on the
//! direct acknowledgement of the command that carried it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Intent, Medium, RoomId, SessionId, SignalEnvelope};

/// A command received from a client over its long-lived connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Authentication handshake; must be the first frame on the connection.
    Auth { token: String },
    /// Enter the waiting set for (mode, connectionType).
    JoinQueue {
        mode: Intent,
        connection_type: Medium,
    },
    /// Abandon the current room and immediately look for a new peer.
    Next {
        room_id: RoomId,
        mode: Intent,
        connection_type: Medium,
    },
    /// Abandon the current room and/or queue position.
    Leave {
        #[serde(default)]
        room_id: Option<RoomId>,
    },
    /// Forward a WebRTC control message to the counterparty.
    Signal {
        room_id: RoomId,
        target_id: SessionId,
        signal: SignalEnvelope,
    },
    /// Request the aggregate service counters.
    GetStats,
    /// Heartbeat. Expected every 25 seconds while connected.
    Ping,
}

/// A full inbound frame: command plus optional correlation number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Client-chosen correlation, echoed on the direct acknowledgement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// An event pushed to a client over its long-lived connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The session was paired; a room now exists.
    Matched {
        room_id: RoomId,
        peer_id: SessionId,
        is_initiator: bool,
    },
    /// Enqueue acknowledgement: no peer available, now waiting.
    Waiting,
    /// The counterparty left the room.
    PeerLeft,
    /// The counterparty skipped to the next peer.
    PeerSkipped,
    /// A WebRTC control message from the counterparty.
    Signal {
        signal: SignalEnvelope,
        from_id: SessionId,
    },
    /// Aggregate service counters.
    Stats(StatsSnapshot),
    /// Heartbeat acknowledgement.
    Pong,
    /// A command failed; the connection stays up.
    Error { message: String },
    /// Authentication failed; the connection is closed after this event.
    AuthError { message: String },
    /// The instance is shutting down; clients should reconnect elsewhere.
    ShuttingDown,
}

/// A full outbound frame: event plus optional echoed correlation number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl ServerFrame {
    /// An unsolicited push (no correlation).
    pub fn push(event: ServerEvent) -> Self {
        Self { seq: None, event }
    }

    /// A direct acknowledgement echoing the triggering command's `seq`.
    pub fn ack(seq: Option<u64>, event: ServerEvent) -> Self {
        Self { seq, event }
    }
}

/// An event carried on the per-session bus topic (`user:<sessionId>`).
///
/// Every gateway instance subscribes to the topic of each session attached
/// to it; publishing here reaches the session wherever it is connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum BusEvent {
    /// The session was paired by another instance (or another task).
    Matched {
        room_id: RoomId,
        peer_id: SessionId,
        is_initiator: bool,
    },
    /// The counterparty left; the session may already be re-queued.
    PeerLeft { requeued: bool },
    /// The counterparty skipped; the session may already be re-queued.
    PeerSkipped { requeued: bool },
    /// A relayed WebRTC control message.
    Signal {
        room_id: RoomId,
        from_id: SessionId,
        signal: SignalEnvelope,
    },
    /// The safety layer ordered this session disconnected.
    ForceDisconnect { reason: String },
}

/// Aggregate counters reported by `GET /api/stats` and the `stats` event.
///
/// `online`, `total_connections`, and `today_connections` are best-effort
/// aggregates; queue and room figures are read from the shared store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Sessions attached to this instance right now (approximate).
    pub online: i64,
    /// Connections accepted since the counters were created.
    pub total_connections: i64,
    /// Connections accepted today (UTC).
    pub today_connections: i64,
    /// Enqueue counts per intent since the counters were created.
    pub by_mode: HashMap<String, i64>,
    /// Live queue and room figures.
    pub realtime: RealtimeStats,
}

/// Point-in-time queue and room figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStats {
    /// Rooms currently active.
    pub active_rooms: i64,
    /// Waiting sessions per `<intent>:<medium>` queue.
    pub waiting_by_mode: HashMap<String, i64>,
    /// Waiting sessions across all queues.
    pub total_waiting: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalKind;

    #[test]
    fn join_queue_frame_deserializes() {
        let json = r#"{"event":"join-queue","seq":7,"data":{"mode":"casual","connectionType":"chat"}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.seq, Some(7));
        match frame.command {
            ClientCommand::JoinQueue {
                mode,
                connection_type,
            } => {
                assert_eq!(mode, Intent::Casual);
                assert_eq!(connection_type, Medium::Chat);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn leave_frame_room_is_optional() {
        let json = r#"{"event":"leave","data":{}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(
            frame.command,
            ClientCommand::Leave { room_id: None }
        ));
    }

    #[test]
    fn signal_frame_round_trips() {
        let json = r#"{"event":"signal","data":{"roomId":"r1","targetId":"s2","signal":{"type":"offer","payload":{"sdp":"v=0"}}}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match &frame.command {
            ClientCommand::Signal { signal, .. } => {
                assert_eq!(signal.kind, SignalKind::Offer);
                assert_eq!(signal.payload["sdp"], "v=0");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        let back = serde_json::to_string(&frame).unwrap();
        let again: ClientFrame = serde_json::from_str(&back).unwrap();
        assert!(matches!(again.command, ClientCommand::Signal { .. }));
    }

    #[test]
    fn matched_event_uses_camel_case_fields() {
        let frame = ServerFrame::ack(
            Some(3),
            ServerEvent::Matched {
                room_id: RoomId("r1".into()),
                peer_id: SessionId("s2".into()),
                is_initiator: true,
            },
        );
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"event\":\"matched\""));
        assert!(json.contains("\"roomId\":\"r1\""));
        assert!(json.contains("\"isInitiator\":true"));
        assert!(json.contains("\"seq\":3"));
    }

    #[test]
    fn push_frames_omit_seq() {
        let json = serde_json::to_string(&ServerFrame::push(ServerEvent::PeerLeft)).unwrap();
        assert!(!json.contains("seq"));
        assert!(json.contains("\"event\":\"peer-left\""));
    }

    #[test]
    fn bus_event_round_trips() {
        let event = BusEvent::PeerSkipped { requeued: true };
        let json = serde_json::to_string(&event).unwrap();
        let back: BusEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, BusEvent::PeerSkipped { requeued: true }));
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let json = r#"{"event":"teleport","data":{}}"#;
        assert!(serde_json::from_str::<ClientFrame>(json).is_err());
    }
}
