// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Rendez signaling service.
//!
//! Provides the config model, the layered Figment loader, and semantic
//! validation used by `rendez serve` and `rendez check-config`.

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::RendezConfig;
pub use validation::{ValidatedConfig, validate_config};
