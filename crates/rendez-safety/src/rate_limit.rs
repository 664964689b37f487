// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiting over the shared store.
//!
//! Each (scope, identifier) pair keeps a sorted set of request timestamps.
//! A window check prunes entries older than the window, adds the current
//! attempt, and counts -- all in one atomic pipeline. A rejected attempt's
//! entry is removed again so it does not consume the window.
//!
//! The limiter fails OPEN: when the store is unreachable, requests are
//! admitted and the failure is logged. Everything else in the service
//! fails closed; blocking all traffic on a store hiccup is worse than
//! briefly losing rate enforcement.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use rendez_core::RendezError;
use rendez_store::{StateStore, StoreOp, keys};

/// One named sliding-window rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Scope name, part of the store key.
    pub scope: &'static str,
    /// Maximum admitted requests per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

impl RateLimit {
    /// Session issuance: 10 per minute per network address.
    pub const SESSION_INIT: Self = Self {
        scope: "session-init",
        limit: 10,
        window: Duration::from_secs(60),
    };

    /// Abuse reports: 5 per hour per session.
    pub const REPORTS: Self = Self {
        scope: "reports",
        limit: 5,
        window: Duration::from_secs(60 * 60),
    };

    /// Signaling messages: 30 per second per session.
    pub const SIGNALING: Self = Self {
        scope: "signaling",
        limit: 30,
        window: Duration::from_secs(1),
    };

    /// Default command budget: 100 per second per session.
    pub const COMMANDS: Self = Self {
        scope: "commands",
        limit: 100,
        window: Duration::from_secs(1),
    };
}

/// Sliding-window limiter over the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn StateStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Whether one more request under `limit` is admitted for `identifier`.
    ///
    /// Never errors: a store failure admits the request and logs.
    pub async fn check(&self, limit: &RateLimit, identifier: &str) -> bool {
        let key = keys::rate_limit(limit.scope, identifier);
        let now_ms = Utc::now().timestamp_millis();
        let cutoff = now_ms - limit.window.as_millis() as i64;
        let member = format!("{now_ms}-{}", Uuid::new_v4());

        let replies = self
            .store
            .pipeline(
                &key,
                vec![
                    StoreOp::SortedRemoveRange {
                        min: f64::MIN,
                        max: cutoff as f64,
                    },
                    StoreOp::SortedAdd {
                        score: now_ms as f64,
                        member: member.clone(),
                    },
                    StoreOp::SortedCount,
                    StoreOp::Expire { ttl: limit.window },
                ],
            )
            .await;

        match replies {
            Ok(replies) => {
                let count = replies.get(2).map(|r| r.count()).unwrap_or(0);
                if count <= limit.limit {
                    true
                } else {
                    // Take the rejected attempt back out of the window.
                    if let Err(e) = self.store.sorted_remove(&key, &member).await {
                        warn!(scope = limit.scope, error = %e, "rate-limit member removal failed");
                    }
                    false
                }
            }
            Err(e) => {
                warn!(scope = limit.scope, error = %e, "rate limiter store failure, failing open");
                true
            }
        }
    }

    /// Like [`check`](Self::check) but yields a typed error on rejection.
    pub async fn enforce(&self, limit: &RateLimit, identifier: &str) -> Result<(), RendezError> {
        if self.check(limit, identifier).await {
            Ok(())
        } else {
            Err(RendezError::RateLimited {
                scope: limit.scope.to_string(),
            })
        }
    }
}
