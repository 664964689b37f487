// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Safety layer for the Rendez signaling service.
//!
//! Sliding-window rate limits over the shared store (failing open on store
//! trouble) and abuse-report intake with the auto-disconnect threshold.

pub mod rate_limit;
pub mod reports;

pub use rate_limit::{RateLimit, RateLimiter};
pub use reports::{AUTO_DISCONNECT_THRESHOLD, ReportOutcome, ReportService};
