//! HTTP API for health checks, Prometheus metrics and device management

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use telemetry_lib::{
    health::{ComponentStatus, HealthRegistry},
    Device, DeviceFilter, DeviceService, DeviceSpec, DeviceStatus, DeviceType, Reading,
    RegistryError,
};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub service: Arc<DeviceService>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, service: Arc<DeviceService>) -> Self {
        Self {
            health_registry,
            service,
        }
    }
}

/// Handler error rendered as a JSON body
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Registry(RegistryError::DeviceNotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            }
            ApiError::Registry(RegistryError::InvalidFilter(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_FILTER", self.to_string())
            }
            ApiError::InvalidBody(rejection) => {
                (rejection.status(), "INVALID_BODY", self.to_string())
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Query parameters for listing devices
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub device_type: Option<DeviceType>,
    pub status: Option<DeviceStatus>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub limit: Option<usize>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> ApiResult<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Device>>> {
    let filter = DeviceFilter::from_parts(
        query.device_type,
        query.status,
        query.lat,
        query.lon,
        query.radius_km,
    )?;
    Ok(Json(state.service.list(&filter)))
}

async fn register_device(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeviceSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    let Json(spec) = payload?;
    let device = state.service.register(spec);
    Ok((StatusCode::CREATED, Json(device)))
}

async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Device>> {
    Ok(Json(state.service.get(&device_id)?))
}

async fn remove_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.deregister(&device_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn device_readings(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    Query(query): Query<ReadingsQuery>,
) -> ApiResult<Json<Vec<Reading>>> {
    Ok(Json(state.service.readings(&device_id, query.limit)?))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/devices", get(list_devices).post(register_device))
        .route(
            "/api/v1/devices/:id",
            get(get_device).delete(remove_device),
        )
        .route("/api/v1/devices/:id/readings", get(device_readings))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
