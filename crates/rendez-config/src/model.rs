// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Rendez signaling service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Rendez configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values,
/// except `auth.secret` which must be provided before `serve` will start.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RendezConfig {
    /// HTTP/WebSocket listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared state store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Token signing and session lifetime settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Matchmaking tunables.
    #[serde(default)]
    pub matching: MatchingConfig,

    /// ICE servers handed to clients (never dialed by the service).
    #[serde(default)]
    pub ice: IceConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Seconds a client may stay silent before it is detached.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds an unauthenticated connection may linger before close.
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,

    /// Seconds the gateway waits for outbound queues to drain on shutdown.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            idle_timeout_secs: default_idle_timeout_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_auth_timeout_secs() -> u64 {
    10
}

fn default_drain_timeout_secs() -> u64 {
    5
}

/// Shared state store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store URL. `memory://` selects the process-embedded backend; the
    /// pub/sub bus then only spans this process.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Pub/sub URL. Defaults to `url` when empty.
    #[serde(default)]
    pub pubsub_url: Option<String>,

    /// Seconds between expired-entry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            pubsub_url: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_store_url() -> String {
    "memory://".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Token signing and session lifetime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared secret for HMAC token signing. Required for `serve`;
    /// must be at least 32 bytes.
    #[serde(default)]
    pub secret: Option<String>,

    /// Session (and token) lifetime in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Matchmaking tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Upper bound on candidates examined per pairing attempt.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Seconds within which a queued session must have been seen to be
    /// considered alive.
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
            liveness_window_secs: default_liveness_window_secs(),
        }
    }
}

fn default_scan_limit() -> usize {
    50
}

fn default_liveness_window_secs() -> u64 {
    30
}

/// ICE servers passed through to clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IceConfig {
    /// STUN/TURN URLs, e.g. `stun:stun.l.google.com:19302`.
    #[serde(default = "default_ice_urls")]
    pub urls: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            urls: default_ice_urls(),
        }
    }
}

fn default_ice_urls() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to install the Prometheus recorder and serve `/metrics`.
    #[serde(default)]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_serviceable() {
        let config = RendezConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.idle_timeout_secs, 60);
        assert_eq!(config.matching.scan_limit, 50);
        assert_eq!(config.matching.liveness_window_secs, 30);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert!(config.auth.secret.is_none());
        assert_eq!(config.store.url, "memory://");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = "[server]\nprot = 9999\n";
        let result: Result<RendezConfig, _> = toml_from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn sections_deserialize_independently() {
        let toml = "[auth]\nsecret = \"0123456789abcdef0123456789abcdef\"\n";
        let config: RendezConfig = toml_from_str(toml).unwrap();
        assert!(config.auth.secret.is_some());
        assert_eq!(config.server.port, 8787, "untouched sections keep defaults");
    }

    fn toml_from_str(s: &str) -> Result<RendezConfig, figment::Error> {
        use figment::providers::{Format, Serialized, Toml};
        figment::Figment::new()
            .merge(Serialized::defaults(RendezConfig::default()))
            .merge(Toml::string(s))
            .extract()
    }
}
