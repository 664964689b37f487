// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(intent, medium) FIFO waiting queues and the pairing scan.
//!
//! Pairing pops the target queue head-first. The atomic pop makes exactly
//! one instance the owner of a candidate; ownership is then validated
//! (session exists, recently seen, not already paired) before a room is
//! minted. Candidates that fail validation are already off the queue and
//! stay off.

use std::sync::Arc;
use std::time::Duration;

use strum::IntoEnumIterator;
use tracing::{debug, warn};

use rendez_core::{Intent, Medium, RendezError, Room, SessionId};
use rendez_session::Sessions;
use rendez_store::{StateStore, keys};

use crate::rooms::RoomRegistry;

/// Outcome of an enqueue request.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A peer was found; the caller is the room's initiator.
    Matched { room: Room },
    /// No admissible peer; the caller now waits in its own queue.
    Waiting,
}

/// The queue engine: enqueue, pair, withdraw.
#[derive(Clone)]
pub struct QueueEngine {
    store: Arc<dyn StateStore>,
    sessions: Sessions,
    rooms: RoomRegistry,
    scan_limit: usize,
    liveness_window: Duration,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        sessions: Sessions,
        rooms: RoomRegistry,
        scan_limit: usize,
        liveness_window: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            rooms,
            scan_limit,
            liveness_window,
        }
    }

    /// Try to pair `session`; append it to its own queue otherwise.
    ///
    /// The caller must not be in any queue when this is invoked; command
    /// handlers withdraw first on every transition.
    pub async fn enqueue(
        &self,
        session: &SessionId,
        intent: Intent,
        medium: Medium,
    ) -> Result<EnqueueOutcome, RendezError> {
        if let Some(room) = self.sessions.current_room(session).await? {
            return Err(RendezError::conflict(format!(
                "session {session} already has room {room}"
            )));
        }

        if let Some(room) = self.pair(session, intent, medium).await? {
            return Ok(EnqueueOutcome::Matched { room });
        }

        self.store
            .push_back(&keys::queue(intent, medium), &session.0)
            .await?;
        self.sessions.set_queue(session, intent, medium).await?;
        debug!(session_id = %session, %intent, %medium, "session waiting");
        Ok(EnqueueOutcome::Waiting)
    }

    /// Scan the target queue for an admissible peer and mint a room.
    ///
    /// The scan is bounded: after `scan_limit` pops the attempt gives up
    /// even if every head entry was stale.
    async fn pair(
        &self,
        session: &SessionId,
        intent: Intent,
        medium: Medium,
    ) -> Result<Option<Room>, RendezError> {
        let target_key = keys::queue(intent.counterpart(), medium);

        for _ in 0..self.scan_limit {
            let Some(candidate) = self.store.pop_front(&target_key).await? else {
                return Ok(None);
            };
            let candidate = SessionId(candidate);

            if candidate == *session {
                // A leftover entry of our own; it is off the queue now.
                continue;
            }

            let Some(record) = self.sessions.record(&candidate).await? else {
                debug!(candidate = %candidate, "queue candidate vanished, dropping");
                continue;
            };
            let age_ms = chrono::Utc::now().timestamp_millis() - record.last_seen;
            if age_ms > self.liveness_window.as_millis() as i64 {
                debug!(candidate = %candidate, age_ms, "queue candidate stale, dropping");
                continue;
            }
            if record.match_id.is_some() {
                debug!(candidate = %candidate, "queue candidate already paired, dropping");
                continue;
            }

            // Claim: the candidate passed validation while we solely own
            // its popped entry. Mint re-checks both rooms; losing that
            // race discards the candidate and the scan continues.
            match self
                .rooms
                .mint(
                    [candidate.clone(), session.clone()],
                    intent,
                    medium,
                    session,
                )
                .await
            {
                Ok(room) => {
                    self.sessions.clear_queue(&candidate).await?;
                    return Ok(Some(room));
                }
                Err(RendezError::Conflict { .. }) => {
                    if self.rooms.resolve(session).await?.is_some() {
                        return Err(RendezError::conflict(format!(
                            "session {session} acquired a room mid-pair"
                        )));
                    }
                    warn!(candidate = %candidate, "candidate acquired a room mid-claim, dropping");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Ok(None)
    }

    /// Remove the session from every queue it may sit in. Idempotent, and
    /// tolerant of duplicate entries.
    pub async fn withdraw(&self, session: &SessionId) -> Result<(), RendezError> {
        for intent in Intent::iter() {
            for medium in [Medium::Video, Medium::Chat] {
                self.store
                    .remove_value(&keys::queue(intent, medium), &session.0)
                    .await?;
            }
        }
        self.sessions.clear_queue(session).await?;
        Ok(())
    }

    /// Waiting-set length for one queue.
    pub async fn waiting(&self, intent: Intent, medium: Medium) -> Result<u64, RendezError> {
        self.store.list_len(&keys::queue(intent, medium)).await
    }
}
