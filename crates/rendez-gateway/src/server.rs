// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, CORS, and shared state, and serves until the gateway's
//! cancellation token fires. WebSocket connections drain themselves; the
//! listener stops accepting as soon as shutdown begins.

use axum::{
    Router,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use rendez_core::RendezError;

use crate::SharedGateway;
use crate::handlers;
use crate::ws;

/// Build the gateway router.
pub fn build_router(gateway: SharedGateway) -> Router {
    // Public routes: bootstrap, stats, health, metrics.
    let public_routes = Router::new()
        .route("/api/session/init", post(handlers::post_session_init))
        .route("/api/session/verify", post(handlers::post_session_verify))
        .route("/api/stats", get(handlers::get_stats))
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(gateway.clone());

    // Routes requiring a valid session bearer token.
    let authed_routes = Router::new()
        .route(
            "/api/reports",
            post(handlers::post_report).get(handlers::get_reports),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            gateway.clone(),
            handlers::require_session,
        ))
        .with_state(gateway.clone());

    // WebSocket route (auth happens in-band, not via middleware).
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(gateway.clone());

    Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .merge(ws_routes)
        .layer(cors_layer(&gateway.config.cors_origins))
}

/// Build the CORS layer from the configured origin list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Bind and serve until the gateway's shutdown token fires.
pub async fn start_server(
    gateway: SharedGateway,
    host: &str,
    port: u16,
) -> Result<(), RendezError> {
    let app = build_router(gateway.clone());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RendezError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    let shutdown = gateway.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(|e| RendezError::Transient {
        reason: format!("gateway server error: {e}"),
    })?;

    info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::connect_info::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::{Gateway, GatewayConfig};
    use rendez_match::{QueueEngine, RoomRegistry};
    use rendez_safety::{RateLimiter, ReportService};
    use rendez_session::{SessionAuthority, TokenSigner};
    use rendez_store::{MemoryStore, StateStore};

    fn gateway() -> SharedGateway {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let authority = SessionAuthority::new(
            store.clone(),
            TokenSigner::new("0123456789abcdef0123456789abcdef"),
            Duration::from_secs(86_400),
        );
        let sessions = authority.sessions().clone();
        let rooms = RoomRegistry::new(store.clone(), sessions.clone());
        let queues = QueueEngine::new(
            store.clone(),
            sessions.clone(),
            rooms.clone(),
            50,
            Duration::from_secs(30),
        );
        let config = GatewayConfig {
            ice_urls: vec!["stun:stun.example.org:3478".to_string()],
            warn_delay: Duration::from_millis(10),
            ..GatewayConfig::default()
        };
        Gateway::new(
            config,
            store.clone(),
            authority,
            rooms,
            queues,
            RateLimiter::new(store.clone()),
            ReportService::new(store, sessions),
        )
    }

    fn with_addr(request: Request<Body>) -> Request<Body> {
        let mut request = request;
        let addr: SocketAddr = "203.0.113.9:55000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn init_session(router: &Router) -> serde_json::Value {
        let response = router
            .clone()
            .oneshot(with_addr(
                Request::post("/api/session/init").body(Body::empty()).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let router = build_router(gateway());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn session_init_returns_token_and_ice_servers() {
        let router = build_router(gateway());
        let json = init_session(&router).await;
        assert!(json["sessionId"].as_str().unwrap().len() >= 32);
        assert_eq!(json["token"].as_str().unwrap().split('.').count(), 3);
        assert_eq!(json["expiresIn"], 86_400);
        assert_eq!(json["iceServers"][0], "stun:stun.example.org:3478");
    }

    #[tokio::test]
    async fn session_init_rate_limits_an_address() {
        let router = build_router(gateway());
        for _ in 0..10 {
            let response = router
                .clone()
                .oneshot(with_addr(
                    Request::post("/api/session/init").body(Body::empty()).unwrap(),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = router
            .oneshot(with_addr(
                Request::post("/api/session/init").body(Body::empty()).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn verify_round_trips_the_token() {
        let router = build_router(gateway());
        let issued = init_session(&router).await;
        let token = issued["token"].as_str().unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::post("/api/session/verify")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["valid"], true);
        assert_eq!(json["sessionId"], issued["sessionId"]);
    }

    #[tokio::test]
    async fn verify_rejects_garbage() {
        let router = build_router(gateway());
        let response = router
            .oneshot(
                Request::post("/api/session/verify")
                    .header("authorization", "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reports_require_authentication() {
        let router = build_router(gateway());
        let response = router
            .oneshot(
                Request::post("/api/reports")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn self_report_is_a_bad_request() {
        let router = build_router(gateway());
        let issued = init_session(&router).await;
        let token = issued["token"].as_str().unwrap();
        let sid = issued["sessionId"].as_str().unwrap();

        let body = serde_json::json!({
            "reportedSessionId": sid,
            "roomId": "r1",
            "reason": "spam",
        });
        let response = router
            .oneshot(
                Request::post("/api/reports")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn third_report_flags_auto_disconnect() {
        let gw = gateway();
        let router = build_router(gw.clone());
        let target = init_session(&router).await;
        let target_id = target["sessionId"].as_str().unwrap();

        for i in 0..3 {
            let reporter = init_session(&router).await;
            let token = reporter["token"].as_str().unwrap();
            let body = serde_json::json!({
                "reportedSessionId": target_id,
                "roomId": "r1",
                "reason": "abuse",
            });
            let response = router
                .clone()
                .oneshot(
                    Request::post("/api/reports")
                        .header("authorization", format!("Bearer {token}"))
                        .header("content-type", "application/json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            let expected = i == 2;
            assert_eq!(
                json["shouldAutoDisconnect"], expected,
                "report {} should flag {}",
                i + 1,
                expected
            );
        }
    }

    #[tokio::test]
    async fn report_listing_filters_by_status() {
        let router = build_router(gateway());
        let reporter = init_session(&router).await;
        let other = init_session(&router).await;
        let token = reporter["token"].as_str().unwrap();

        let body = serde_json::json!({
            "reportedSessionId": other["sessionId"],
            "roomId": "r1",
            "reason": "spam",
        });
        router
            .clone()
            .oneshot(
                Request::post("/api/reports")
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::get("/api/reports?status=pending")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["reports"].as_array().unwrap().len(), 1);

        let response = router
            .oneshot(
                Request::get("/api/reports?status=bogus")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_shape_is_complete() {
        let router = build_router(gateway());
        let response = router
            .oneshot(Request::get("/api/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["online"].is_number());
        assert!(json["totalConnections"].is_number());
        assert!(json["todayConnections"].is_number());
        assert!(json["byMode"].is_object());
        assert!(json["realtime"]["activeRooms"].is_number());
        assert!(json["realtime"]["waitingByMode"].is_object());
        assert!(json["realtime"]["totalWaiting"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_is_404_when_disabled() {
        let router = build_router(gateway());
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
