// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed accessors over the `session:<id>` hash.
//!
//! The session hash is the single source of truth for attachment, queue
//! membership, and room membership. Every mutation goes through here so
//! the field layout stays consistent across the workspace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use rendez_core::{ConnectionId, Intent, Medium, RendezError, RoomId, SessionId, SessionRecord};
use rendez_store::{StateStore, keys};

/// Handle for reading and mutating session records.
#[derive(Clone)]
pub struct Sessions {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl Sessions {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Session (and token) lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write a fresh record and start its TTL clock.
    pub async fn create(&self, id: &SessionId, record: &SessionRecord) -> Result<(), RendezError> {
        let key = keys::session(id);
        let fields = record.to_fields();
        let borrowed: Vec<(&str, &str)> = fields
            .iter()
            .map(|(f, v)| (f.as_str(), v.as_str()))
            .collect();
        self.store.hash_set(&key, &borrowed).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Load the full record, or `None` if the session has expired.
    pub async fn record(&self, id: &SessionId) -> Result<Option<SessionRecord>, RendezError> {
        let fields = self.store.hash_get_all(&keys::session(id)).await?;
        Ok(SessionRecord::from_fields(&fields))
    }

    /// Whether the session record still exists.
    pub async fn exists(&self, id: &SessionId) -> Result<bool, RendezError> {
        Ok(self
            .store
            .hash_get(&keys::session(id), "createdAt")
            .await?
            .is_some())
    }

    /// Refresh `lastSeen` and extend the record's TTL.
    pub async fn touch(&self, id: &SessionId) -> Result<(), RendezError> {
        let key = keys::session(id);
        let now = Utc::now().timestamp_millis().to_string();
        self.store.hash_set(&key, &[("lastSeen", &now)]).await?;
        self.store.expire(&key, self.ttl).await?;
        Ok(())
    }

    /// Whether the session was seen within `window`. Missing records are
    /// not live.
    pub async fn is_live(&self, id: &SessionId, window: Duration) -> Result<bool, RendezError> {
        let Some(last_seen) = self.store.hash_get(&keys::session(id), "lastSeen").await? else {
            return Ok(false);
        };
        let last_seen: i64 = last_seen.parse().unwrap_or(0);
        Ok(Utc::now().timestamp_millis() - last_seen <= window.as_millis() as i64)
    }

    /// Bind a connection to the session, superseding any previous one,
    /// and write the reverse `socket:<conn>` mapping.
    pub async fn bind_socket(
        &self,
        id: &SessionId,
        conn: &ConnectionId,
    ) -> Result<(), RendezError> {
        self.store
            .hash_set(&keys::session(id), &[("socketId", &conn.0)])
            .await?;
        self.store
            .set(&keys::socket(conn), &id.0, Some(keys::SOCKET_TTL))
            .await?;
        Ok(())
    }

    /// Clear the session's connection binding only if `conn` still owns it.
    ///
    /// Returns whether the binding was cleared. A detach from a superseded
    /// transport finds a different binding and must change nothing.
    pub async fn release_socket(
        &self,
        id: &SessionId,
        conn: &ConnectionId,
    ) -> Result<bool, RendezError> {
        let released = self
            .store
            .hash_compare_delete(&keys::session(id), "socketId", &conn.0)
            .await?;
        self.store.delete(&keys::socket(conn)).await?;
        Ok(released)
    }

    /// The connection currently bound to the session, if any.
    pub async fn current_socket(
        &self,
        id: &SessionId,
    ) -> Result<Option<ConnectionId>, RendezError> {
        Ok(self
            .store
            .hash_get(&keys::session(id), "socketId")
            .await?
            .map(ConnectionId))
    }

    /// The session a connection is bound to, if the binding is still live.
    pub async fn session_of_socket(
        &self,
        conn: &ConnectionId,
    ) -> Result<Option<SessionId>, RendezError> {
        Ok(self.store.get(&keys::socket(conn)).await?.map(SessionId))
    }

    /// Record room membership after a mint.
    pub async fn set_room(
        &self,
        id: &SessionId,
        room: &RoomId,
        peer: &SessionId,
    ) -> Result<(), RendezError> {
        self.store
            .hash_set(
                &keys::session(id),
                &[("matchId", &room.0), ("peerId", &peer.0), ("inQueue", "0")],
            )
            .await?;
        Ok(())
    }

    /// Drop room membership after a destroy.
    pub async fn clear_room(&self, id: &SessionId) -> Result<(), RendezError> {
        self.store
            .hash_del(&keys::session(id), &["matchId", "peerId"])
            .await?;
        Ok(())
    }

    /// Drop room membership only if the session is still mapped to `room`.
    ///
    /// Returns whether the mapping was cleared. A destroy racing a fresh
    /// mint for the same session must not clobber the new mapping.
    pub async fn clear_room_if(
        &self,
        id: &SessionId,
        room: &RoomId,
    ) -> Result<bool, RendezError> {
        let cleared = self
            .store
            .hash_compare_delete(&keys::session(id), "matchId", &room.0)
            .await?;
        if cleared {
            self.store.hash_del(&keys::session(id), &["peerId"]).await?;
        }
        Ok(cleared)
    }

    /// The session's current room, straight from the hash.
    pub async fn current_room(&self, id: &SessionId) -> Result<Option<RoomId>, RendezError> {
        Ok(self
            .store
            .hash_get(&keys::session(id), "matchId")
            .await?
            .map(RoomId))
    }

    /// Atomically increment the session's accumulated report count,
    /// returning the new value.
    pub async fn bump_report_count(&self, id: &SessionId) -> Result<i64, RendezError> {
        self.store
            .hash_incr(&keys::session(id), "reportCount", 1)
            .await
    }

    /// Record queue membership after an enqueue.
    pub async fn set_queue(
        &self,
        id: &SessionId,
        intent: Intent,
        medium: Medium,
    ) -> Result<(), RendezError> {
        self.store
            .hash_set(
                &keys::session(id),
                &[
                    ("inQueue", "1"),
                    ("selectedMode", &intent.to_string()),
                    ("connectionType", &medium.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Drop queue membership after a withdraw or a successful pair.
    pub async fn clear_queue(&self, id: &SessionId) -> Result<(), RendezError> {
        self.store
            .hash_set(&keys::session(id), &[("inQueue", "0")])
            .await?;
        Ok(())
    }
}
