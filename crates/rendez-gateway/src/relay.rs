// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signaling relay: forwards WebRTC control messages between the two
//! participants of a room.
//!
//! The relay never interprets envelope contents. It enforces room
//! membership on both ends and a payload size cap, then publishes to the
//! target's bus topic. Delivery is best-effort, at-most-once; WebRTC
//! itself re-sends semantically equivalent signals when needed.

use std::sync::Arc;

use tracing::debug;

use rendez_core::{BusEvent, RendezError, RoomId, SessionId, SignalEnvelope};
use rendez_match::RoomRegistry;
use rendez_store::{StateStore, keys};

/// Upper bound on a serialized signal payload.
pub const MAX_SIGNAL_BYTES: usize = 16 * 1024;

/// Forwards signal envelopes with room-level authorization.
#[derive(Clone)]
pub struct SignalRelay {
    rooms: RoomRegistry,
    store: Arc<dyn StateStore>,
}

impl SignalRelay {
    pub fn new(rooms: RoomRegistry, store: Arc<dyn StateStore>) -> Self {
        Self { rooms, store }
    }

    /// Forward `signal` from `source` to `target` within `room`.
    ///
    /// Fails `InvalidArgument` on oversized payloads and `NotAuthorized`
    /// when either end is not (or no longer) a participant of the room;
    /// callers drop the latter silently because it is the normal outcome
    /// of a signal racing a room teardown.
    pub async fn relay(
        &self,
        source: &SessionId,
        room: &RoomId,
        target: &SessionId,
        signal: SignalEnvelope,
    ) -> Result<(), RendezError> {
        let payload_len = serde_json::to_vec(&signal.payload)
            .map_err(|e| RendezError::invalid(format!("unencodable signal payload: {e}")))?
            .len();
        if payload_len > MAX_SIGNAL_BYTES {
            return Err(RendezError::invalid(format!(
                "signal payload too large: {payload_len} bytes (max {MAX_SIGNAL_BYTES})"
            )));
        }

        if !self.rooms.authorize(source, room).await? {
            return Err(RendezError::not_authorized("sender is not in this room"));
        }
        if !self.rooms.authorize(target, room).await? {
            return Err(RendezError::not_authorized("target is not in this room"));
        }

        let event = BusEvent::Signal {
            room_id: room.clone(),
            from_id: source.clone(),
            signal,
        };
        let payload = serde_json::to_string(&event)
            .map_err(|e| RendezError::Fatal(format!("bus event encode: {e}")))?;
        let delivered = self
            .store
            .publish(&keys::user_topic(target), &payload)
            .await?;

        metrics::counter!("rendez_signals_relayed_total").increment(1);
        debug!(room_id = %room, from = %source, to = %target, delivered, "signal relayed");
        Ok(())
    }
}
