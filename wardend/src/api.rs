//! HTTP gateway.
//!
//! Thin intake over the planner, supervisor, and store:
//! - `POST /positions` — open a managed position
//! - `GET /positions/:id` — store snapshot
//! - `GET /positions?status=` — list; default hides stale Pending records
//! - `DELETE /positions/:id` — manual close
//! - `GET /health` — liveness

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use warden_broker::{BrokerError, BrokerPort};
use warden_domain::{ManagedPosition, OpenPositionRequest, PositionStatus};
use warden_store::PositionStore;

use crate::error::DaemonError;
use crate::planner::Planner;
use crate::supervisor::Supervisor;

// =============================================================================
// API state
// =============================================================================

/// Shared state for the gateway handlers.
pub struct ApiState<B: BrokerPort + 'static, S: PositionStore + 'static> {
    /// Lifecycle planner (open)
    pub planner: Arc<Planner<B, S>>,
    /// Supervisor (adopt, close)
    pub supervisor: Arc<Supervisor<B, S>>,
    /// Store (read snapshots)
    pub store: Arc<S>,
    /// Freshness window for hiding stale Pending records from lists
    pub stale_window: chrono::Duration,
}

// =============================================================================
// Request/response types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" when the process answers
    pub status: String,
    /// Crate version
    pub version: String,
}

/// List query parameters.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Status filter; empty hides stale Pending, "all" includes everything
    pub status: Option<String>,
}

/// List response.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Number of records returned
    pub count: usize,
    /// The records, newest first
    pub positions: Vec<ManagedPosition>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Build the gateway router.
pub fn create_router<B, S>(state: Arc<ApiState<B, S>>) -> Router
where
    B: BrokerPort + 'static,
    S: PositionStore + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/positions", post(open_handler))
        .route("/positions", get(list_handler))
        .route("/positions/:id", get(get_handler))
        .route("/positions/:id", delete(close_handler))
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn open_handler<B, S>(
    State(state): State<Arc<ApiState<B, S>>>,
    Json(request): Json<OpenPositionRequest>,
) -> Result<(StatusCode, Json<ManagedPosition>), (StatusCode, Json<ErrorResponse>)>
where
    B: BrokerPort + 'static,
    S: PositionStore + 'static,
{
    let position = state.planner.open(request).await.map_err(to_error_response)?;

    // The supervisor takes over from here; the gateway never mutates.
    state.supervisor.adopt(position.clone()).await;

    Ok((StatusCode::CREATED, Json(position)))
}

async fn get_handler<B, S>(
    State(state): State<Arc<ApiState<B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ManagedPosition>, (StatusCode, Json<ErrorResponse>)>
where
    B: BrokerPort + 'static,
    S: PositionStore + 'static,
{
    let position = state
        .store
        .get(id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(DaemonError::PositionNotFound(id)))?;

    Ok(Json(position))
}

async fn list_handler<B, S>(
    State(state): State<Arc<ApiState<B, S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, (StatusCode, Json<ErrorResponse>)>
where
    B: BrokerPort + 'static,
    S: PositionStore + 'static,
{
    let (filter, include_stale) = match params.status.as_deref() {
        None | Some("") => (None, false),
        Some("all") | Some("ALL") => (None, true),
        Some(other) => {
            let status: PositionStatus = other.parse().map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse { error: format!("unknown status filter: {other}") }),
                )
            })?;
            (Some(status), false)
        }
    };

    let now = chrono::Utc::now();
    let positions: Vec<ManagedPosition> = state
        .store
        .list(filter)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .into_iter()
        .filter(|p| include_stale || !p.is_stale(now, state.stale_window))
        .collect();

    Ok(Json(ListResponse { count: positions.len(), positions }))
}

async fn close_handler<B, S>(
    State(state): State<Arc<ApiState<B, S>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)>
where
    B: BrokerPort + 'static,
    S: PositionStore + 'static,
{
    state.supervisor.close(id).await.map_err(to_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        DaemonError::AllocationBelowPrice { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DaemonError::PositionNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::Broker(BrokerError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
        DaemonError::Broker(BrokerError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
        DaemonError::Broker(BrokerError::NotFound(_)) => StatusCode::BAD_GATEWAY,
        DaemonError::Store(_) | DaemonError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: error.to_string() }))
}
