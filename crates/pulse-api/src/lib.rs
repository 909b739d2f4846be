//! pulse-api: REST API for Pulse.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Process liveness |
//! | GET | `/api/v1/services` | Registered services with their latest check |
//! | GET | `/api/v1/services/{id}/history` | Check history and 24h uptime |
//! | POST | `/api/v1/services/{id}/check` | Run a check now |
//! | GET | `/api/v1/alerts` | Active alerts |
//! | GET | `/api/v1/alerts/all` | Every alert ever raised |

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};

use pulse_alert::AlertEngine;
use pulse_core::ServiceRegistry;
use pulse_health::CheckScheduler;
use pulse_store::TimeSeriesStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<ServiceRegistry>,
    pub store: Arc<TimeSeriesStore>,
    pub scheduler: Arc<CheckScheduler>,
    pub alerts: Arc<AlertEngine>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        store: Arc<TimeSeriesStore>,
        scheduler: Arc<CheckScheduler>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            registry,
            store,
            scheduler,
            alerts,
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/services", get(handlers::list_services))
        .route("/services/{id}/history", get(handlers::service_history))
        .route("/services/{id}/check", post(handlers::run_check))
        .route("/alerts", get(handlers::active_alerts))
        .route("/alerts/all", get(handlers::all_alerts))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::health).with_state(state))
}
