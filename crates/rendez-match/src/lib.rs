// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matchmaking for the Rendez signaling service.
//!
//! [`QueueEngine`] holds the per-(intent, medium) FIFO waiting sets and the
//! bounded pairing scan; [`RoomRegistry`] owns room lifecycle and the
//! session-to-room mappings. Both go through the shared state store so any
//! number of service instances cooperate on one waiting population.

pub mod queue;
pub mod rooms;

pub use queue::{EnqueueOutcome, QueueEngine};
pub use rooms::RoomRegistry;
