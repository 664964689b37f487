// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abuse report intake and the auto-disconnect rule.
//!
//! Reports are accepted only on authenticated surfaces. Each report bumps
//! a 24-hour counter on the target; at [`AUTO_DISCONNECT_THRESHOLD`] the
//! intake response flags the target for forced disconnection, which the
//! connection gateway executes after a short warning delay.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rendez_core::{RendezError, Report, ReportStatus, RoomId, SessionId};
use rendez_session::Sessions;
use rendez_store::{StateStore, keys};

/// Reports within the counter TTL that trigger a forced disconnect.
pub const AUTO_DISCONNECT_THRESHOLD: i64 = 3;

/// How many recent report records the listing keeps.
const LIST_RETENTION: i64 = 1000;

/// Result of a report intake.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The stored report's identifier.
    pub report_id: String,
    /// Reports accumulated against the target within the counter window.
    pub report_count: i64,
    /// Whether the gateway must force-disconnect the target.
    pub should_auto_disconnect: bool,
}

/// Accepts, stores, and lists abuse reports.
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn StateStore>,
    sessions: Sessions,
}

impl ReportService {
    pub fn new(store: Arc<dyn StateStore>, sessions: Sessions) -> Self {
        Self { store, sessions }
    }

    /// Record a report and evaluate the auto-disconnect rule.
    ///
    /// Self-reports are rejected. Rate limiting happens at the HTTP
    /// surface before this is called.
    pub async fn submit(
        &self,
        reporter: &SessionId,
        target: &SessionId,
        room: &RoomId,
        reason: &str,
        details: Option<String>,
    ) -> Result<ReportOutcome, RendezError> {
        if reporter == target {
            return Err(RendezError::invalid("cannot report yourself"));
        }
        if reason.trim().is_empty() {
            return Err(RendezError::invalid("report reason must not be empty"));
        }

        let report = Report {
            id: Uuid::new_v4().to_string(),
            reporter_session_id: reporter.clone(),
            reported_session_id: target.clone(),
            room_id: room.clone(),
            reason: reason.to_string(),
            details,
            created_at: Utc::now().timestamp(),
            status: ReportStatus::Pending,
        };
        let json = serde_json::to_string(&report)
            .map_err(|e| RendezError::Fatal(format!("report encode: {e}")))?;

        self.store
            .set(&keys::report(&report.id), &json, Some(keys::REPORT_TTL))
            .await?;
        self.store.push_front(keys::REPORTS_LIST, &json).await?;
        self.store
            .list_trim(keys::REPORTS_LIST, 0, LIST_RETENTION - 1)
            .await?;

        let report_count = self
            .store
            .incr(&keys::reported(target), 1, Some(keys::REPORT_COUNTER_TTL))
            .await?;

        // Mirror the running total onto the session record if it still exists.
        if self.sessions.exists(target).await? {
            self.sessions.bump_report_count(target).await?;
        }

        let should_auto_disconnect = report_count >= AUTO_DISCONNECT_THRESHOLD;
        info!(
            report_id = %report.id,
            target = %target,
            report_count,
            should_auto_disconnect,
            "report recorded"
        );

        Ok(ReportOutcome {
            report_id: report.id,
            report_count,
            should_auto_disconnect,
        })
    }

    /// The most recent reports, newest first, optionally filtered by
    /// status. At most 100 are returned.
    pub async fn list(&self, status: Option<ReportStatus>) -> Result<Vec<Report>, RendezError> {
        let raw = self.store.list_range(keys::REPORTS_LIST, 0, 99).await?;
        let mut reports = Vec::with_capacity(raw.len());
        for json in raw {
            // Garbled entries are skipped rather than failing the listing.
            if let Ok(report) = serde_json::from_str::<Report>(&json)
                && status.is_none_or(|s| report.status == s)
            {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Reports accumulated against `target` within the counter window.
    pub async fn count_against(&self, target: &SessionId) -> Result<i64, RendezError> {
        Ok(self
            .store
            .get(&keys::reported(target))
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendez_store::MemoryStore;

    fn service() -> ReportService {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let sessions = Sessions::new(store.clone(), std::time::Duration::from_secs(86_400));
        ReportService::new(store, sessions)
    }

    fn sid(s: &str) -> SessionId {
        SessionId(s.to_string())
    }

    #[tokio::test]
    async fn self_report_is_rejected() {
        let service = service();
        let err = service
            .submit(&sid("x"), &sid("x"), &RoomId("r".into()), "spam", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RendezError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn empty_reason_is_rejected() {
        let service = service();
        let err = service
            .submit(&sid("a"), &sid("b"), &RoomId("r".into()), "  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RendezError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn threshold_fires_on_the_third_report() {
        let service = service();
        let target = sid("target");

        let first = service
            .submit(&sid("r1"), &target, &RoomId("r".into()), "spam", None)
            .await
            .unwrap();
        assert_eq!(first.report_count, 1);
        assert!(!first.should_auto_disconnect);

        let second = service
            .submit(&sid("r2"), &target, &RoomId("r".into()), "abuse", None)
            .await
            .unwrap();
        assert_eq!(second.report_count, 2);
        assert!(!second.should_auto_disconnect, "two reports stay below the threshold");

        let third = service
            .submit(&sid("r3"), &target, &RoomId("r".into()), "abuse", None)
            .await
            .unwrap();
        assert_eq!(third.report_count, 3);
        assert!(third.should_auto_disconnect, "third report trips the rule");
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_filterable() {
        let service = service();
        service
            .submit(&sid("a"), &sid("b"), &RoomId("r1".into()), "first", None)
            .await
            .unwrap();
        service
            .submit(&sid("a"), &sid("c"), &RoomId("r2".into()), "second", None)
            .await
            .unwrap();

        let all = service.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].reason, "second");
        assert_eq!(all[1].reason, "first");

        let pending = service.list(Some(ReportStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 2);
        let resolved = service.list(Some(ReportStatus::Resolved)).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn listing_caps_at_one_hundred() {
        let service = service();
        for i in 0..120 {
            service
                .submit(
                    &sid(&format!("reporter-{i}")),
                    &sid("target"),
                    &RoomId("r".into()),
                    "flood",
                    None,
                )
                .await
                .unwrap();
        }
        let listed = service.list(None).await.unwrap();
        assert_eq!(listed.len(), 100);
    }

    #[tokio::test]
    async fn details_are_preserved() {
        let service = service();
        service
            .submit(
                &sid("a"),
                &sid("b"),
                &RoomId("r".into()),
                "other",
                Some("free text".to_string()),
            )
            .await
            .unwrap();
        let listed = service.list(None).await.unwrap();
        assert_eq!(listed[0].details.as_deref(), Some("free text"));
    }

    #[tokio::test]
    async fn live_target_record_mirrors_the_count() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let sessions = Sessions::new(store.clone(), std::time::Duration::from_secs(86_400));
        let service = ReportService::new(store, sessions.clone());

        let target = sid("target");
        let now = chrono::Utc::now().timestamp_millis();
        sessions
            .create(
                &target,
                &rendez_core::SessionRecord {
                    created_at: now,
                    last_seen: now,
                    ..rendez_core::SessionRecord::default()
                },
            )
            .await
            .unwrap();

        service
            .submit(&sid("a"), &target, &RoomId("r".into()), "spam", None)
            .await
            .unwrap();

        let record = sessions.record(&target).await.unwrap().unwrap();
        assert_eq!(record.report_count, 1);
    }

    #[tokio::test]
    async fn count_against_reads_the_counter() {
        let service = service();
        let target = sid("t");
        assert_eq!(service.count_against(&target).await.unwrap(), 0);
        service
            .submit(&sid("a"), &target, &RoomId("r".into()), "spam", None)
            .await
            .unwrap();
        assert_eq!(service.count_against(&target).await.unwrap(), 1);
    }
}
