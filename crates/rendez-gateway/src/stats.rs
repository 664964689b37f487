// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate service counters with a short-lived cache.
//!
//! Counters are explicitly approximate: the online figure is this
//! instance's attachment count, and the rest are best-effort store
//! counters. Snapshots are cached briefly so `get-stats` floods do not
//! hammer the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strum::IntoEnumIterator;
use tokio::sync::Mutex;

use rendez_core::events::{RealtimeStats, StatsSnapshot};
use rendez_core::{Intent, Medium, RendezError};
use rendez_store::{StateStore, keys};

/// Daily connection counters outlive their day by one more, then expire.
pub const DAY_COUNTER_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Computes and caches [`StatsSnapshot`]s.
pub struct StatsCache {
    freshness: Duration,
    cached: Mutex<Option<(Instant, StatsSnapshot)>>,
}

impl StatsCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            cached: Mutex::new(None),
        }
    }

    /// Return a snapshot, recomputing only when the cache has gone stale.
    pub async fn snapshot(
        &self,
        store: &Arc<dyn StateStore>,
        online: i64,
    ) -> Result<StatsSnapshot, RendezError> {
        let mut cached = self.cached.lock().await;
        if let Some((at, snapshot)) = cached.as_ref()
            && at.elapsed() < self.freshness
        {
            let mut snapshot = snapshot.clone();
            snapshot.online = online;
            return Ok(snapshot);
        }

        let snapshot = Self::compute(store, online).await?;
        *cached = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }

    async fn compute(
        store: &Arc<dyn StateStore>,
        online: i64,
    ) -> Result<StatsSnapshot, RendezError> {
        let counters = store.hash_get_all(keys::STATS_COUNTERS).await?;
        let total_connections = counters
            .get("totalConnections")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut by_mode = HashMap::new();
        for intent in Intent::iter() {
            let count = counters
                .get(&format!("mode:{intent}"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            by_mode.insert(intent.to_string(), count);
        }

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let today_connections = store
            .get(&keys::stats_day(&today))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut waiting_by_mode = HashMap::new();
        let mut total_waiting = 0;
        for intent in Intent::iter() {
            for medium in [Medium::Video, Medium::Chat] {
                let len = store.list_len(&keys::queue(intent, medium)).await? as i64;
                waiting_by_mode.insert(format!("{intent}:{medium}"), len);
                total_waiting += len;
            }
        }

        let active_rooms = store
            .get(keys::STATS_ACTIVE_ROOMS)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(StatsSnapshot {
            online,
            total_connections,
            today_connections,
            by_mode,
            realtime: RealtimeStats {
                active_rooms,
                waiting_by_mode,
                total_waiting,
            },
        })
    }
}
