// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./rendez.toml` > `~/.config/rendez/rendez.toml`
//! > `/etc/rendez/rendez.toml` with environment variable overrides via the
//! `RENDEZ_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RendezConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/rendez/rendez.toml` (system-wide)
/// 3. `~/.config/rendez/rendez.toml` (user XDG config)
/// 4. `./rendez.toml` (local directory)
/// 5. `RENDEZ_*` environment variables
pub fn load_config() -> Result<RendezConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RendezConfig::default()))
        .merge(Toml::file("/etc/rendez/rendez.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("rendez/rendez.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("rendez.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit inline configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RendezConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RendezConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RendezConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RendezConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `RENDEZ_SERVER_CORS_ORIGINS`
/// must map to `server.cors_origins`, not `server.cors.origins`.
fn env_provider() -> Env {
    Env::prefixed("RENDEZ_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: RENDEZ_AUTH_SECRET -> "auth_secret"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("store_", "store.", 1)
            .replacen("auth_", "auth.", 1)
            .replacen("matching_", "matching.", 1)
            .replacen("ice_", "ice.", 1)
            .replacen("observability_", "observability.", 1);
        mapped.into()
    })
}
