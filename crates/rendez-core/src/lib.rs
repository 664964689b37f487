// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Rendez signaling service.
//!
//! This crate provides the error taxonomy, domain types, and the wire
//! protocol shared by every other crate in the workspace. It carries no
//! I/O; services and the gateway build on top of it.

pub mod error;
pub mod events;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::RendezError;
pub use events::{BusEvent, ClientCommand, ClientFrame, ServerEvent, ServerFrame, StatsSnapshot};
pub use types::{
    ConnectionId, Intent, Medium, Report, ReportStatus, Room, RoomId, SessionId, SessionRecord,
    SignalEnvelope, SignalKind,
};
