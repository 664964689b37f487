// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error diagnostics.
//!
//! Wraps Figment and validation failures in miette diagnostics so
//! `rendez check-config` can render actionable messages.

use miette::Diagnostic;
use thiserror::Error;

/// A configuration error with diagnostic help text.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(rendez::config::missing_key),
        help("add `{key} = <value>` to your rendez.toml or set the matching RENDEZ_* variable")
    )]
    MissingKey {
        /// The missing key name.
        key: String,
    },

    /// A validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(rendez::config::validation))]
    Validation {
        /// Description of the invalid value.
        message: String,
    },

    /// Figment failed to parse or merge the configuration sources.
    #[error("could not load configuration: {0}")]
    #[diagnostic(
        code(rendez::config::load),
        help("check rendez.toml syntax and RENDEZ_* variable values")
    )]
    Load(#[from] figment::Error),
}
