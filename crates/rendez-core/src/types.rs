// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Rendez workspace.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::RendezError;

/// Unique identifier for an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a two-participant room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for one long-lived client connection (one transport).
///
/// A session may be re-attached by a newer connection; the session record
/// always carries the identifier of the connection that currently owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The declared purpose of a pairing request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Intent {
    Casual,
    Pitch,
    Collab,
    Hire,
    Freelance,
    Review,
}

impl Intent {
    /// The intent a pairing request draws its peer from.
    ///
    /// `hire` pairs only with `freelance` (and vice versa); every other
    /// intent pairs with itself.
    pub fn counterpart(self) -> Intent {
        match self {
            Intent::Hire => Intent::Freelance,
            Intent::Freelance => Intent::Hire,
            other => other,
        }
    }
}

/// The declared communication modality.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Medium {
    Video,
    Chat,
}

/// Discriminant of a forwarded WebRTC control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// A typed WebRTC control message forwarded verbatim between the two
/// participants of a room. The payload is opaque to the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Message discriminant: offer, answer, or ice-candidate.
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Opaque body (SDP or ICE candidate JSON). Never inspected.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A two-participant rendezvous minted at pairing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Exactly two participant sessions.
    pub participants: [SessionId; 2],
    /// Intent the match was minted under.
    pub intent: Intent,
    /// Medium the match was minted under.
    pub medium: Medium,
    /// The session that popped the other off the queue; produces the
    /// WebRTC offer.
    pub initiator: SessionId,
    /// Unix seconds at mint time.
    pub created_at: i64,
}

impl Room {
    /// The participant that is not `session`, if `session` is a participant.
    pub fn peer_of(&self, session: &SessionId) -> Option<&SessionId> {
        let [a, b] = &self.participants;
        if a == session {
            Some(b)
        } else if b == session {
            Some(a)
        } else {
            None
        }
    }
}

/// Typed view of the `session:<id>` hash.
///
/// Field names follow the persisted layout exactly; the record converts to
/// and from the flat string fields the store holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    /// Unix milliseconds at issuance.
    pub created_at: i64,
    /// Unix milliseconds of the last sign of life. Drives queue liveness.
    pub last_seen: i64,
    /// Connection currently bound to this session, if attached.
    pub socket_id: Option<ConnectionId>,
    /// Intent selected by the most recent enqueue.
    pub selected_mode: Option<Intent>,
    /// Medium selected by the most recent enqueue.
    pub connection_type: Option<Medium>,
    /// Current room, if paired.
    pub match_id: Option<RoomId>,
    /// Counterparty session in the current room, if paired.
    pub peer_id: Option<SessionId>,
    /// Whether the session currently sits in a waiting queue.
    pub in_queue: bool,
    /// Accumulated abuse report count against this session.
    pub report_count: u32,
}

impl SessionRecord {
    /// Parse a record out of the raw hash fields. Returns `None` when the
    /// mandatory timestamps are missing (an empty or vanished hash).
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let created_at = fields.get("createdAt")?.parse().ok()?;
        let last_seen = fields.get("lastSeen")?.parse().ok()?;
        Some(Self {
            created_at,
            last_seen,
            socket_id: fields.get("socketId").cloned().map(ConnectionId),
            selected_mode: fields.get("selectedMode").and_then(|s| s.parse().ok()),
            connection_type: fields.get("connectionType").and_then(|s| s.parse().ok()),
            match_id: fields.get("matchId").cloned().map(RoomId),
            peer_id: fields.get("peerId").cloned().map(SessionId),
            in_queue: fields.get("inQueue").is_some_and(|v| v == "1"),
            report_count: fields
                .get("reportCount")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }

    /// Serialize the record into flat hash fields for initial creation.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("createdAt".to_string(), self.created_at.to_string()),
            ("lastSeen".to_string(), self.last_seen.to_string()),
            ("inQueue".to_string(), if self.in_queue { "1" } else { "0" }.to_string()),
            ("reportCount".to_string(), self.report_count.to_string()),
        ];
        if let Some(ref socket) = self.socket_id {
            fields.push(("socketId".to_string(), socket.0.clone()));
        }
        if let Some(mode) = self.selected_mode {
            fields.push(("selectedMode".to_string(), mode.to_string()));
        }
        if let Some(medium) = self.connection_type {
            fields.push(("connectionType".to_string(), medium.to_string()));
        }
        if let Some(ref room) = self.match_id {
            fields.push(("matchId".to_string(), room.0.clone()));
        }
        if let Some(ref peer) = self.peer_id {
            fields.push(("peerId".to_string(), peer.0.clone()));
        }
        fields
    }
}

/// Lifecycle status of an abuse report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
}

/// An abuse report filed by one participant against another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Report identifier.
    pub id: String,
    /// Session that filed the report.
    pub reporter_session_id: SessionId,
    /// Session the report is about.
    pub reported_session_id: SessionId,
    /// Room the two shared when the report was filed.
    pub room_id: RoomId,
    /// Reason tag chosen by the reporter.
    pub reason: String,
    /// Optional free-text detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unix seconds at intake.
    pub created_at: i64,
    /// Review status.
    pub status: ReportStatus,
}

/// Parse an intent from its wire name.
pub fn parse_intent(s: &str) -> Result<Intent, RendezError> {
    s.parse()
        .map_err(|_| RendezError::invalid(format!("unknown intent `{s}`")))
}

/// Parse a medium from its wire name.
pub fn parse_medium(s: &str) -> Result<Medium, RendezError> {
    s.parse()
        .map_err(|_| RendezError::invalid(format!("unknown medium `{s}`")))
}
