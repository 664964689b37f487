// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rendez check-config` command implementation.
//!
//! Validates the resolved configuration and prints a summary with secrets
//! redacted. Exits non-zero when the service would refuse to start.

use std::process::ExitCode;

use rendez_config::RendezConfig;

/// Runs the `rendez check-config` command.
pub fn run_check(config: &RendezConfig) -> ExitCode {
    if check(config) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Validate and print; returns whether the configuration is serviceable.
fn check(config: &RendezConfig) -> bool {
    match rendez_config::validate_config(config) {
        Ok(_) => {
            println!("configuration ok");
            print_summary(config);
            true
        }
        Err(errors) => {
            eprintln!("configuration has {} error(s):", errors.len());
            for error in errors {
                eprintln!("  - {}", miette::Report::new(error));
            }
            false
        }
    }
}

fn print_summary(config: &RendezConfig) {
    println!("  server:    {}:{}", config.server.host, config.server.port);
    println!(
        "  cors:      {}",
        if config.server.cors_origins.iter().any(|o| o == "*") {
            "any origin".to_string()
        } else {
            config.server.cors_origins.join(", ")
        }
    );
    println!("  store:     {}", config.store.url);
    println!(
        "  secret:    {}",
        if config.auth.secret.is_some() {
            "[set]"
        } else {
            "[missing]"
        }
    );
    println!("  session:   ttl {}s", config.auth.session_ttl_secs);
    println!(
        "  matching:  scan {} / liveness {}s",
        config.matching.scan_limit, config.matching.liveness_window_secs
    );
    println!("  ice:       {}", config.ice.urls.join(", "));
    println!(
        "  metrics:   {}",
        if config.observability.metrics {
            "enabled"
        } else {
            "disabled"
        }
    );
}
