// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as secret strength, valid bind addresses, and ICE URL
//! schemes.

use crate::diagnostic::ConfigError;
use crate::model::RendezConfig;

/// Minimum signing secret length in bytes. Shorter secrets make offline
/// token forgery feasible.
const MIN_SECRET_BYTES: usize = 32;

/// Proof that validation passed, carrying the values whose presence it
/// guarantees so callers never unwrap an `Option` that validation already
/// checked.
#[derive(Debug)]
pub struct ValidatedConfig {
    /// The token signing secret, present and long enough.
    pub signing_secret: String,
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns the validated values on success, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RendezConfig) -> Result<ValidatedConfig, Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut signing_secret = None;

    // Bind address must be a valid IP or hostname.
    let addr = config.server.host.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("server.host `{addr}` is not a valid IP address or hostname"),
            });
        }
    }

    if config.server.port == 0 {
        errors.push(ConfigError::Validation {
            message: "server.port must be non-zero".to_string(),
        });
    }

    // Signing secret: required for serve, and long enough to resist forgery.
    match &config.auth.secret {
        None => errors.push(ConfigError::MissingKey {
            key: "auth.secret".to_string(),
        }),
        Some(secret) if secret.len() < MIN_SECRET_BYTES => {
            errors.push(ConfigError::Validation {
                message: format!(
                    "auth.secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                    secret.len()
                ),
            });
        }
        Some(secret) => signing_secret = Some(secret.clone()),
    }

    if config.auth.session_ttl_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "auth.session_ttl_secs must be non-zero".to_string(),
        });
    }

    if config.matching.scan_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "matching.scan_limit must be non-zero".to_string(),
        });
    }

    if config.matching.liveness_window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "matching.liveness_window_secs must be non-zero".to_string(),
        });
    }

    // Store URL scheme.
    if !config.store.url.starts_with("memory://") {
        errors.push(ConfigError::Validation {
            message: format!(
                "store.url scheme `{}` is not supported (expected memory://)",
                config.store.url
            ),
        });
    }

    // ICE URLs must carry a stun:/stuns:/turn:/turns: scheme.
    for url in &config.ice.urls {
        let ok = ["stun:", "stuns:", "turn:", "turns:"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !ok {
            errors.push(ConfigError::Validation {
                message: format!("ice.urls entry `{url}` must use a stun:/turn: scheme"),
            });
        }
    }

    // CORS origins must be `*` or absolute http(s) origins.
    for origin in &config.server.cors_origins {
        if origin != "*" && !origin.starts_with("http://") && !origin.starts_with("https://") {
            errors.push(ConfigError::Validation {
                message: format!(
                    "server.cors_origins entry `{origin}` must be `*` or an absolute http(s) origin"
                ),
            });
        }
    }

    match signing_secret {
        Some(signing_secret) if errors.is_empty() => Ok(ValidatedConfig { signing_secret }),
        _ => Err(errors),
    }
}
