//! REST API handlers.
//!
//! Each handler reads from the registry, the store, or the alert engine and
//! returns JSON wrapped in [`ApiResponse`].

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::warn;

use pulse_core::{epoch_millis, Alert, CheckResult};
use pulse_health::SchedulerError;

use crate::ApiState;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn service_not_found(id: &str) -> axum::response::Response {
    error_response(&format!("service \"{id}\" not found"), StatusCode::NOT_FOUND).into_response()
}

// ── Liveness ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    /// Unix timestamp (milliseconds).
    pub timestamp: u64,
    pub uptime_secs: f64,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(HealthStatus {
        status: "healthy",
        timestamp: epoch_millis(),
        uptime_secs: state.started_at.elapsed().as_secs_f64(),
    })
}

// ── Services ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
    pub url: String,
    pub strategy: String,
    pub interval_ms: u64,
    pub last_check: Option<CheckResult>,
}

/// GET /api/v1/services
pub async fn list_services(State(state): State<ApiState>) -> impl IntoResponse {
    let mut latest = state.store.get_all_latest().await;
    let services: Vec<ServiceSummary> = state
        .registry
        .list()
        .into_iter()
        .map(|svc| ServiceSummary {
            last_check: latest.remove(&svc.id),
            id: svc.id,
            name: svc.name,
            url: svc.url,
            strategy: svc.strategy,
            interval_ms: svc.interval_ms,
        })
        .collect();
    ApiResponse::ok(services)
}

/// Query string for the history endpoint. Missing, unparsable, or zero
/// limits fall back to the default.
#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

#[derive(Serialize)]
pub struct ServiceHistory {
    pub service_id: String,
    /// Healthy share over the last 24h, as a percentage with two decimals.
    pub uptime: f64,
    pub history: Vec<CheckResult>,
}

/// GET /api/v1/services/{id}/history
pub async fn service_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    if !state.registry.contains(&id) {
        return service_not_found(&id);
    }

    let history = state.store.get_results(&id, Some(query.limit())).await;
    let uptime = state.store.get_uptime(&id, None).await;

    ApiResponse::ok(ServiceHistory {
        service_id: id,
        uptime: uptime_percentage(uptime),
        history,
    })
    .into_response()
}

fn uptime_percentage(fraction: f64) -> f64 {
    (fraction * 10_000.0).round() / 100.0
}

/// POST /api/v1/services/{id}/check
pub async fn run_check(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    let Some(service) = state.registry.get(&id) else {
        return service_not_found(&id);
    };

    match state.scheduler.run_check(&service).await {
        Ok(result) => ApiResponse::ok(result).into_response(),
        Err(e @ SchedulerError::UnknownStrategy(_)) => {
            warn!(service_id = %id, error = %e, "on-demand check rejected");
            error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Alerts ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AlertList {
    pub count: usize,
    pub alerts: Vec<Alert>,
}

impl From<Vec<Alert>> for AlertList {
    fn from(alerts: Vec<Alert>) -> Self {
        Self {
            count: alerts.len(),
            alerts,
        }
    }
}

/// GET /api/v1/alerts
pub async fn active_alerts(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(AlertList::from(state.alerts.active_alerts()))
}

/// GET /api/v1/alerts/all
pub async fn all_alerts(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(AlertList::from(state.alerts.all_alerts()))
}
