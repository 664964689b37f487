// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rendez serve` command implementation.
//!
//! Wires the shared store, session authority, matchmaking, safety layer,
//! and the connection gateway, then serves until SIGTERM/SIGINT. The store
//! sweeper and the signal watcher run as background tasks tied to the
//! gateway's cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rendez_config::RendezConfig;
use rendez_core::RendezError;
use rendez_gateway::{Gateway, GatewayConfig, server};
use rendez_match::{QueueEngine, RoomRegistry};
use rendez_safety::{RateLimiter, ReportService};
use rendez_session::{SessionAuthority, TokenSigner};
use rendez_store::{MemoryStore, StateStore};

/// Runs the `rendez serve` command.
pub async fn run_serve(config: RendezConfig) -> Result<(), RendezError> {
    init_tracing(&config.observability.log_level);

    let validated = match rendez_config::validate_config(&config) {
        Ok(validated) => validated,
        Err(errors) => {
            for error in &errors {
                eprintln!("error: {error}");
            }
            return Err(RendezError::Config(format!(
                "{} configuration error(s)",
                errors.len()
            )));
        }
    };

    info!("starting rendez serve");

    // Prometheus recorder, if enabled.
    let prometheus_render = if config.observability.metrics {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("prometheus metrics recorder installed");
                Some(Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    // Shared state store. `memory://` is the only compiled-in backend; a
    // networked backend slots in behind the same trait.
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    info!(url = config.store.url.as_str(), "state store ready");

    let authority = SessionAuthority::new(
        store.clone(),
        TokenSigner::new(&validated.signing_secret),
        Duration::from_secs(config.auth.session_ttl_secs),
    );
    let sessions = authority.sessions().clone();
    let rooms = RoomRegistry::new(store.clone(), sessions.clone());
    let queues = QueueEngine::new(
        store.clone(),
        sessions.clone(),
        rooms.clone(),
        config.matching.scan_limit,
        Duration::from_secs(config.matching.liveness_window_secs),
    );
    let limiter = RateLimiter::new(store.clone());
    let reports = ReportService::new(store.clone(), sessions);

    let gateway_config = GatewayConfig {
        idle_timeout: Duration::from_secs(config.server.idle_timeout_secs),
        auth_timeout: Duration::from_secs(config.server.auth_timeout_secs),
        drain_timeout: Duration::from_secs(config.server.drain_timeout_secs),
        warn_delay: Duration::from_secs(10),
        liveness_window: Duration::from_secs(config.matching.liveness_window_secs),
        cors_origins: config.server.cors_origins.clone(),
        ice_urls: config.ice.urls.clone(),
        prometheus_render,
    };
    let gateway = Gateway::new(
        gateway_config,
        store.clone(),
        authority,
        rooms,
        queues,
        limiter,
        reports,
    );

    spawn_shutdown_watcher(gateway.shutdown.clone());

    // Expired-entry sweeper.
    {
        let store = store.clone();
        let cancel = gateway.shutdown.clone();
        let interval = Duration::from_secs(config.store.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.sweep().await {
                            Ok(0) => {}
                            Ok(swept) => debug!(swept, "expired store entries swept"),
                            Err(e) => warn!(error = %e, "store sweep failed"),
                        }
                    }
                    _ = cancel.cancelled() => {
                        debug!("sweeper shutting down");
                        break;
                    }
                }
            }
        });
        info!(interval_secs = config.store.sweep_interval_secs, "store sweeper started");
    }

    server::start_server(gateway, &config.server.host, config.server.port).await?;

    info!("rendez serve shutdown complete");
    Ok(())
}

/// Cancel `token` once the process is asked to terminate.
///
/// Watches Ctrl+C on every platform; on unix it additionally watches
/// SIGTERM, which is what service managers and container runtimes send.
/// If the SIGTERM stream cannot be registered, Ctrl+C remains the only
/// trigger rather than aborting startup.
fn spawn_shutdown_watcher(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminated = async {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM watcher unavailable, relying on Ctrl+C only");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt: draining and stopping"),
            _ = terminated => info!("termination requested: draining and stopping"),
        }
        token.cancel();
    });
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rendez={log_level},warn")));

    // Ignore re-initialization so tests can call run_serve repeatedly.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
