// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Rendez signaling service.

use thiserror::Error;

/// The primary error type used across all Rendez services and store operations.
#[derive(Debug, Error)]
pub enum RendezError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing, malformed, expired, or invalid token; unknown session.
    #[error("authentication failure: {reason}")]
    AuthFailure { reason: String },

    /// Operation targets a room the caller is not a participant of.
    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },

    /// A per-identifier sliding window was exceeded.
    #[error("rate limited: {scope}")]
    RateLimited { scope: String },

    /// Unknown intent or medium, oversized payload, self-report, bad input.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The session already has a room, or a queue entry is already present.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Shared state store transient failure. Outcome of the attempted
    /// operation is unknown; callers fail closed except the rate limiter.
    #[error("state store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Upstream timeout or comparable transient condition; retries are safe.
    #[error("transient failure: {reason}")]
    Transient { reason: String },

    /// Unrecoverable invariant violation.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl RendezError {
    /// Shorthand for an [`RendezError::AuthFailure`].
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::AuthFailure {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RendezError::NotAuthorized`].
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::NotAuthorized {
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`RendezError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RendezError::Conflict`].
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RendezError::StoreUnavailable`] from a message.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            source: reason.into().into(),
        }
    }

    /// Whether a retry of the failed operation is safe and worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::Transient { .. }
        )
    }
}
