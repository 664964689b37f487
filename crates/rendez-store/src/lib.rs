// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state store abstraction.
//!
//! Every service instance cooperates through one logical store holding
//! sessions, queues, rooms, rate-limit windows, and the per-session pub/sub
//! bus. The [`StateStore`] trait is the only surface the rest of the
//! workspace sees; [`MemoryStore`] is the process-embedded backend. A
//! networked backend slots in behind the same trait without touching the
//! services.
//!
//! Single-key operations are atomic. [`StateStore::pipeline`] runs a short
//! typed op sequence against one key under the same exclusivity, which is
//! what the rate limiter's window maintenance needs.

pub mod keys;
pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use rendez_core::RendezError;

pub use memory::MemoryStore;

/// Backoff before the single retry of a retryable store failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Run `op`, retrying exactly once after a short backoff when the failure
/// is retryable. Everything past the second failure propagates; callers
/// fail closed from there (except the rate limiter, which fails open on
/// its own).
pub async fn retry_once<T, F, Fut>(op: F) -> Result<T, RendezError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, RendezError>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "store operation failed, retrying once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            op().await
        }
        other => other,
    }
}

/// One step of a single-key transactional pipeline.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Add a member to a sorted set with the given score.
    SortedAdd { score: f64, member: String },
    /// Remove all members whose score falls in `[min, max]`.
    SortedRemoveRange { min: f64, max: f64 },
    /// Count the members of the sorted set.
    SortedCount,
    /// Refresh the key's time-to-live.
    Expire { ttl: Duration },
}

/// Reply for one pipeline step, in op order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    /// Count result (`SortedCount`, removed-member count).
    Count(u64),
    /// Ops that produce no value.
    Unit,
}

impl StoreReply {
    /// The count carried by this reply, or 0 for unit replies.
    pub fn count(&self) -> u64 {
        match self {
            StoreReply::Count(n) => *n,
            StoreReply::Unit => 0,
        }
    }
}

/// A live subscription to one pub/sub topic.
pub struct Subscription {
    rx: broadcast::Receiver<String>,
    topic: String,
}

impl Subscription {
    /// Wrap a raw broadcast receiver. Backends hand these out from
    /// [`StateStore::subscribe`].
    pub fn new(rx: broadcast::Receiver<String>, topic: String) -> Self {
        Self { rx, topic }
    }

    /// The topic this subscription is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive the next published payload.
    ///
    /// Returns `None` once the topic is closed. A slow subscriber that
    /// lags skips the overwritten payloads and keeps receiving; delivery
    /// here is best-effort by contract.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        topic = %self.topic,
                        skipped,
                        "subscription lagged, dropping missed payloads"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive a pending payload without waiting. Returns `None` when the
    /// topic is currently empty or closed.
    pub fn try_recv(&mut self) -> Option<String> {
        loop {
            match self.rx.try_recv() {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        topic = %self.topic,
                        skipped,
                        "subscription lagged, dropping missed payloads"
                    );
                }
                Err(_) => return None,
            }
        }
    }
}

/// Uniform key-value + hash + list + sorted-set + pub/sub store.
///
/// All operations are fallible; a failure means the outcome is unknown and
/// callers fail closed, except the rate limiter which fails open.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    // --- Scalar keys ---

    /// Read a scalar key.
    async fn get(&self, key: &str) -> Result<Option<String>, RendezError>;

    /// Write a scalar key, optionally with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), RendezError>;

    /// Delete a key of any kind. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, RendezError>;

    /// Refresh a key's time-to-live. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, RendezError>;

    /// Atomically add `delta` to a scalar counter, creating it at zero.
    /// `ttl` applies only when the counter is created by this call.
    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>)
        -> Result<i64, RendezError>;

    // --- Hash keys ---

    /// Read one hash field.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, RendezError>;

    /// Write hash fields, creating the hash if absent.
    async fn hash_set(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), RendezError>;

    /// Delete hash fields. Returns how many existed.
    async fn hash_del(&self, key: &str, fields: &[&str]) -> Result<u64, RendezError>;

    /// Read all fields of a hash. Absent key reads as empty.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RendezError>;

    /// Atomically add `delta` to a numeric hash field, creating it at zero.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, RendezError>;

    /// Atomically delete `field` only if its current value equals
    /// `expected`. Returns whether the delete happened. This backs the
    /// stale-socket rule's compare-and-clear.
    async fn hash_compare_delete(
        &self,
        key: &str,
        field: &str,
        expected: &str,
    ) -> Result<bool, RendezError>;

    // --- List keys (FIFO queues) ---

    /// Append to the tail. Returns the new length.
    async fn push_back(&self, key: &str, value: &str) -> Result<u64, RendezError>;

    /// Prepend to the head. Returns the new length.
    async fn push_front(&self, key: &str, value: &str) -> Result<u64, RendezError>;

    /// Atomically remove and return the head, or `None` when empty.
    /// Exactly one concurrent caller observes any given element.
    async fn pop_front(&self, key: &str) -> Result<Option<String>, RendezError>;

    /// Remove every occurrence of `value`. Returns how many were removed.
    async fn remove_value(&self, key: &str, value: &str) -> Result<u64, RendezError>;

    /// Current length. Absent key reads as zero.
    async fn list_len(&self, key: &str) -> Result<u64, RendezError>;

    /// Read elements `start..=stop` (negative indices count from the tail,
    /// `-1` being the last element).
    async fn list_range(&self, key: &str, start: i64, stop: i64)
        -> Result<Vec<String>, RendezError>;

    /// Keep only elements `start..=stop`, dropping the rest.
    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> Result<(), RendezError>;

    // --- Sorted sets (rate-limit windows) ---

    /// Add a member with a score, replacing its previous score if present.
    async fn sorted_add(&self, key: &str, score: f64, member: &str) -> Result<(), RendezError>;

    /// Remove one member. Returns whether it existed.
    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool, RendezError>;

    /// Remove all members with scores in `[min, max]`. Returns the count.
    async fn sorted_remove_range(&self, key: &str, min: f64, max: f64)
        -> Result<u64, RendezError>;

    /// Member count. Absent key reads as zero.
    async fn sorted_count(&self, key: &str) -> Result<u64, RendezError>;

    /// Run `ops` against `key` as one atomic step; replies are in op order.
    async fn pipeline(&self, key: &str, ops: Vec<StoreOp>)
        -> Result<Vec<StoreReply>, RendezError>;

    // --- Pub/sub ---

    /// Publish a payload to a topic. Returns the subscriber count.
    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, RendezError>;

    /// Subscribe to a topic. The subscription is live immediately.
    fn subscribe(&self, topic: &str) -> Subscription;

    // --- Maintenance ---

    /// Evict expired entries. Returns how many were dropped.
    async fn sweep(&self) -> Result<u64, RendezError>;
}
