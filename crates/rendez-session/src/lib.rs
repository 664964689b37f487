// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anonymous session identities for the Rendez signaling service.
//!
//! [`SessionAuthority`] mints short-lived sessions and signs offline-verifiable
//! bearer tokens; [`Sessions`] is the typed accessor every other component
//! uses to read and mutate the session record.

pub mod authority;
pub mod sessions;
pub mod token;

pub use authority::{IssuedSession, SessionAuthority};
pub use sessions::Sessions;
pub use token::{TokenClaims, TokenSigner};
