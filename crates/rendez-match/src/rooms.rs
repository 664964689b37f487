// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room registry: mints, resolves, and destroys two-participant rooms.
//!
//! A room record and both participants' session-to-room mappings are
//! created together and destroyed together. Partial states may exist only
//! briefly mid-destroy; any reader that observes one treats the room as
//! destroyed and finishes the teardown.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use rendez_core::{Intent, Medium, RendezError, Room, RoomId, SessionId};
use rendez_session::Sessions;
use rendez_store::{StateStore, keys};

/// Mints and resolves rooms through the shared store.
#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn StateStore>,
    sessions: Sessions,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn StateStore>, sessions: Sessions) -> Self {
        Self { store, sessions }
    }

    /// Allocate a room for `participants` and record both mappings.
    ///
    /// `initiator` must be one of the participants; it is the side that
    /// will produce the WebRTC offer. Fails with `Conflict` if either
    /// participant already has a room.
    pub async fn mint(
        &self,
        participants: [SessionId; 2],
        intent: Intent,
        medium: Medium,
        initiator: &SessionId,
    ) -> Result<Room, RendezError> {
        if !participants.contains(initiator) {
            return Err(RendezError::Fatal(
                "room initiator is not a participant".to_string(),
            ));
        }

        for participant in &participants {
            if let Some(existing) = self.sessions.current_room(participant).await? {
                return Err(RendezError::conflict(format!(
                    "session {participant} already has room {existing}"
                )));
            }
        }

        let created_at = Utc::now().timestamp();
        let id = RoomId(format!(
            "{}-{:06x}",
            Utc::now().timestamp_millis(),
            rand::random::<u32>() & 0xff_ffff
        ));

        let room = Room {
            id: id.clone(),
            participants: participants.clone(),
            intent,
            medium,
            initiator: initiator.clone(),
            created_at,
        };

        let key = keys::room(&id);
        let participants_json = serde_json::to_string(&[
            participants[0].0.as_str(),
            participants[1].0.as_str(),
        ])
        .map_err(|e| RendezError::Fatal(format!("room participants encode: {e}")))?;
        self.store
            .hash_set(
                &key,
                &[
                    ("participants", &participants_json),
                    ("mode", &intent.to_string()),
                    ("connectionType", &medium.to_string()),
                    ("initiatorId", &initiator.0),
                    ("createdAt", &created_at.to_string()),
                ],
            )
            .await?;
        self.store.expire(&key, keys::ROOM_TTL).await?;

        let [a, b] = &participants;
        self.sessions.set_room(a, &id, b).await?;
        self.sessions.set_room(b, &id, a).await?;
        self.store.incr(keys::STATS_ACTIVE_ROOMS, 1, None).await?;

        debug!(room_id = %id, initiator = %initiator, %intent, %medium, "room minted");
        Ok(room)
    }

    /// Load a room record.
    ///
    /// A record whose reverse mappings no longer both point at it is
    /// inconsistent; it is torn down here and reads as absent.
    pub async fn lookup(&self, room: &RoomId) -> Result<Option<Room>, RendezError> {
        let fields = self.store.hash_get_all(&keys::room(room)).await?;
        let Some(parsed) = parse_room(room, &fields) else {
            return Ok(None);
        };

        for participant in &parsed.participants {
            if self.sessions.current_room(participant).await?.as_ref() != Some(room) {
                warn!(room_id = %room, session_id = %participant, "room missing reverse mapping, tearing down");
                self.destroy(room).await?;
                return Ok(None);
            }
        }

        Ok(Some(parsed))
    }

    /// The session's current room, if any.
    pub async fn resolve(&self, session: &SessionId) -> Result<Option<RoomId>, RendezError> {
        self.sessions.current_room(session).await
    }

    /// Whether `session` is a participant of `room` right now.
    pub async fn authorize(&self, session: &SessionId, room: &RoomId) -> Result<bool, RendezError> {
        Ok(self.sessions.current_room(session).await?.as_ref() == Some(room))
    }

    /// Delete the room record and both mappings; returns the prior
    /// participants. Destroying a vanished room returns an empty list.
    pub async fn destroy(&self, room: &RoomId) -> Result<Vec<SessionId>, RendezError> {
        let fields = self.store.hash_get_all(&keys::room(room)).await?;
        let existed = self.store.delete(&keys::room(room)).await?;

        let participants = match parse_room(room, &fields) {
            Some(parsed) => parsed.participants.to_vec(),
            None => Vec::new(),
        };

        for participant in &participants {
            self.sessions.clear_room_if(participant, room).await?;
        }

        if existed {
            self.store.incr(keys::STATS_ACTIVE_ROOMS, -1, None).await?;
            debug!(room_id = %room, "room destroyed");
        }

        Ok(participants)
    }
}

/// Decode a room out of its raw hash fields. Empty or garbled hashes read
/// as absent.
fn parse_room(
    id: &RoomId,
    fields: &std::collections::HashMap<String, String>,
) -> Option<Room> {
    let participants: [String; 2] =
        serde_json::from_str(fields.get("participants")?).ok()?;
    Some(Room {
        id: id.clone(),
        participants: participants.map(SessionId),
        intent: fields.get("mode")?.parse().ok()?,
        medium: fields.get("connectionType")?.parse().ok()?,
        initiator: SessionId(fields.get("initiatorId")?.clone()),
        created_at: fields.get("createdAt")?.parse().ok()?,
    })
}
