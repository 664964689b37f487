// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Session issuance and verification, abuse reports, aggregate stats, and
//! health. The long-lived connection lives in [`crate::ws`]; these
//! endpoints cover bootstrap and the operations that make sense over plain
//! HTTP.

use std::net::SocketAddr;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rendez_core::{BusEvent, RendezError, ReportStatus, RoomId, SessionId, StatsSnapshot};
use rendez_safety::RateLimit;

use crate::SharedGateway;

/// Response body for `POST /api/session/init`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitResponse {
    pub session_id: SessionId,
    pub token: String,
    pub expires_in: u64,
    /// STUN/TURN servers for the client's peer connection; the service
    /// never dials them.
    pub ice_servers: Vec<String>,
}

/// Response body for `POST /api/session/verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    pub session_id: SessionId,
}

/// Request body for `POST /api/reports`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub reported_session_id: SessionId,
    pub room_id: RoomId,
    pub reason: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// Response body for `POST /api/reports`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub report_id: String,
    pub should_auto_disconnect: bool,
}

/// Query parameters for `GET /api/reports`.
#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Response body for `GET /api/reports`.
#[derive(Debug, Serialize)]
pub struct ReportListResponse {
    pub reports: Vec<rendez_core::Report>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime: u64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Typed error wrapper mapping [`RendezError`] onto HTTP statuses.
pub struct ApiError(pub RendezError);

impl From<RendezError> for ApiError {
    fn from(err: RendezError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RendezError::AuthFailure { .. } => StatusCode::UNAUTHORIZED,
            RendezError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            RendezError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RendezError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            RendezError::Conflict { .. } => StatusCode::CONFLICT,
            RendezError::StoreUnavailable { .. } | RendezError::Transient { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RendezError::Config(_) | RendezError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// The bearer token from an `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// The client network address for rate-limiting purposes.
///
/// Behind a reverse proxy the first `X-Forwarded-For` hop is trusted;
/// otherwise the transport peer address is used.
fn client_addr(headers: &HeaderMap, connect: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| connect.ip().to_string())
}

/// Middleware requiring a valid session bearer token.
///
/// On success the verified [`SessionId`] is inserted as a request
/// extension for the handler.
pub async fn require_session(
    State(gateway): State<SharedGateway>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(RendezError::auth("missing bearer token").into());
    };
    let session = gateway.authority.verify(token).await?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// `POST /api/session/init`
///
/// Mints a new anonymous session. Rate limited per client address.
pub async fn post_session_init(
    State(gateway): State<SharedGateway>,
    ConnectInfo(connect): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<SessionInitResponse>, ApiError> {
    let addr = client_addr(&headers, &connect);
    gateway
        .limiter
        .enforce(&RateLimit::SESSION_INIT, &addr)
        .await?;

    let issued = rendez_store::retry_once(|| gateway.authority.issue()).await?;
    Ok(Json(SessionInitResponse {
        session_id: issued.session_id,
        token: issued.token,
        expires_in: issued.expires_in,
        ice_servers: gateway.config.ice_urls.clone(),
    }))
}

/// `POST /api/session/verify`
///
/// Confirms a bearer token and returns its session id.
pub async fn post_session_verify(
    State(gateway): State<SharedGateway>,
    headers: HeaderMap,
) -> Result<Json<VerifyResponse>, ApiError> {
    let Some(token) = bearer_token(&headers) else {
        return Err(RendezError::auth("missing bearer token").into());
    };
    let session_id = gateway.authority.verify(token).await?;
    Ok(Json(VerifyResponse {
        valid: true,
        session_id,
    }))
}

/// `POST /api/reports` (authenticated)
///
/// Files an abuse report. When the target crosses the auto-disconnect
/// threshold, a forced leave is scheduled after the warning delay.
pub async fn post_report(
    State(gateway): State<SharedGateway>,
    Extension(reporter): Extension<SessionId>,
    Json(body): Json<ReportRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    gateway
        .limiter
        .enforce(&RateLimit::REPORTS, &reporter.0)
        .await?;

    let outcome = gateway
        .reports
        .submit(
            &reporter,
            &body.reported_session_id,
            &body.room_id,
            &body.reason,
            body.details,
        )
        .await?;

    if outcome.should_auto_disconnect {
        let gateway = gateway.clone();
        let target = body.reported_session_id.clone();
        let delay = gateway.config.warn_delay;
        info!(target = %target, delay_secs = delay.as_secs(), "auto-disconnect scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let event = BusEvent::ForceDisconnect {
                reason: "removed after repeated reports".to_string(),
            };
            if let Err(e) = gateway.publish_to(&target, &event).await {
                warn!(target = %target, error = %e, "force-disconnect publish failed");
            }
        });
    }

    Ok(Json(ReportResponse {
        report_id: outcome.report_id,
        should_auto_disconnect: outcome.should_auto_disconnect,
    }))
}

/// `GET /api/reports?status=` (authenticated)
///
/// The most recent 100 reports, optionally filtered by status.
pub async fn get_reports(
    State(gateway): State<SharedGateway>,
    Extension(_session): Extension<SessionId>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ReportListResponse>, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<ReportStatus>()
                .map_err(|_| RendezError::invalid(format!("unknown report status `{raw}`")))?,
        ),
    };
    let reports = gateway.reports.list(status).await?;
    Ok(Json(ReportListResponse { reports }))
}

/// `GET /api/stats`
pub async fn get_stats(
    State(gateway): State<SharedGateway>,
) -> Result<Json<StatsSnapshot>, ApiError> {
    let snapshot = gateway
        .stats
        .snapshot(&gateway.store, gateway.online())
        .await?;
    Ok(Json(snapshot))
}

/// `GET /health`
pub async fn get_health(State(gateway): State<SharedGateway>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: gateway.uptime_secs(),
    })
}

/// `GET /metrics`
///
/// Prometheus text format, when metrics are enabled.
pub async fn get_metrics(State(gateway): State<SharedGateway>) -> Response {
    match &gateway.config.prometheus_render {
        Some(render) => render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
