// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted key layout.
//!
//! Every key the service writes is minted here so the layout stays in one
//! place. Time-to-live constants live next to the keys they govern.

use std::time::Duration;

use rendez_core::{ConnectionId, Intent, Medium, RoomId, SessionId};

/// Session hash lifetime; also the upper bound on token validity.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Reverse connection-to-session binding lifetime.
pub const SOCKET_TTL: Duration = Duration::from_secs(60 * 60);

/// Room hash lifetime; an inactive room is reaped regardless of state.
pub const ROOM_TTL: Duration = Duration::from_secs(60 * 60);

/// Individual report record retention.
pub const REPORT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-target report counter lifetime.
pub const REPORT_COUNTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// `session:<sessionId>` — hash of session fields.
pub fn session(id: &SessionId) -> String {
    format!("session:{id}")
}

/// `socket:<connectionId>` — scalar holding the attached session id.
pub fn socket(id: &ConnectionId) -> String {
    format!("socket:{id}")
}

/// `queue:<intent>:<medium>` — FIFO list of waiting session ids.
pub fn queue(intent: Intent, medium: Medium) -> String {
    format!("queue:{intent}:{medium}")
}

/// `match:<roomId>` — hash of room fields.
pub fn room(id: &RoomId) -> String {
    format!("match:{id}")
}

/// `ratelimit:<scope>:<identifier>` — sorted set of request timestamps.
pub fn rate_limit(scope: &str, identifier: &str) -> String {
    format!("ratelimit:{scope}:{identifier}")
}

/// `reports:list` — list of JSON report records, newest first.
pub const REPORTS_LIST: &str = "reports:list";

/// `report:<id>` — individual report record.
pub fn report(id: &str) -> String {
    format!("report:{id}")
}

/// `reported:<sessionId>` — counter driving the auto-disconnect rule.
pub fn reported(id: &SessionId) -> String {
    format!("reported:{id}")
}

/// `user:<sessionId>` — pub/sub topic for cross-instance delivery.
pub fn user_topic(id: &SessionId) -> String {
    format!("user:{id}")
}

/// `stats:counters` — hash of monotonic aggregate counters.
pub const STATS_COUNTERS: &str = "stats:counters";

/// `stats:day:<yyyy-mm-dd>` — connections accepted on one UTC day.
pub fn stats_day(date: &str) -> String {
    format!("stats:day:{date}")
}

/// `stats:activeRooms` — rooms currently active.
pub const STATS_ACTIVE_ROOMS: &str = "stats:activeRooms";
