// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test utilities for the Rendez workspace.
//!
//! Not part of the service; depended on by integration tests only.

pub mod harness;

pub use harness::{TestClient, TestHarness, TestHarnessBuilder};
