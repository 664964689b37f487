// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session authority: issues and verifies short-lived anonymous identities.
//!
//! A session is an anonymous identity independent of any one transport. The
//! authority mints the record, signs a bearer token over it, and answers
//! liveness questions for the rest of the system. Token verification itself
//! is offline; only the follow-up existence check touches the store. All
//! session-record mutation (including the report counter) goes through the
//! [`Sessions`] accessor the authority exposes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use rendez_core::{RendezError, SessionId, SessionRecord};
use rendez_store::StateStore;

use crate::sessions::Sessions;
use crate::token::TokenSigner;

/// Result of issuing a new session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The new session's identifier.
    pub session_id: SessionId,
    /// Signed bearer token presented on every authenticated surface.
    pub token: String,
    /// Seconds until the token (and session) expires.
    pub expires_in: u64,
}

/// Issues and verifies anonymous session identities.
#[derive(Clone)]
pub struct SessionAuthority {
    sessions: Sessions,
    signer: TokenSigner,
    ttl: Duration,
}

impl SessionAuthority {
    pub fn new(store: Arc<dyn StateStore>, signer: TokenSigner, ttl: Duration) -> Self {
        Self {
            sessions: Sessions::new(store, ttl),
            signer,
            ttl,
        }
    }

    /// The typed session-record accessor sharing this authority's TTL.
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Create a new session record and return its signed token.
    ///
    /// Per-address rate limiting happens at the HTTP surface before this is
    /// called; the authority itself only mints.
    pub async fn issue(&self) -> Result<IssuedSession, RendezError> {
        let session_id = SessionId(Uuid::new_v4().to_string());
        let now = Utc::now();
        let expires_at = now.timestamp() + self.ttl.as_secs() as i64;

        let record = SessionRecord {
            created_at: now.timestamp_millis(),
            last_seen: now.timestamp_millis(),
            ..SessionRecord::default()
        };
        self.sessions.create(&session_id, &record).await?;

        let token = self.signer.sign(&session_id.0, expires_at);
        debug!(session_id = %session_id, "session issued");

        Ok(IssuedSession {
            session_id,
            token,
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Verify a bearer token and confirm its session still exists.
    pub async fn verify(&self, token: &str) -> Result<SessionId, RendezError> {
        let claims = self.signer.verify(token, Utc::now().timestamp())?;
        let session_id = SessionId(claims.session_id);

        if !self.sessions.exists(&session_id).await? {
            return Err(RendezError::auth("unknown session"));
        }

        Ok(session_id)
    }

    /// Refresh the session's liveness and extend its TTL.
    pub async fn touch(&self, session: &SessionId) -> Result<(), RendezError> {
        self.sessions.touch(session).await
    }
}
