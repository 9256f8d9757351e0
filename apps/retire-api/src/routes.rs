//! HTTP routes.
//!
//! `POST /api/fetch-data` resolves serials across all registries. The three
//! `POST /api/delete-*` routes run a single registry stage, and
//! `POST /api/retire` runs the whole gated pipeline server-side.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use retire_engine::{
    DeletionReport, DeletionRequest, DeviceSelection, MergedDeviceView, RegistryKind,
    SerialBatch, StageReport,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/fetch-data", post(fetch_data))
        .route("/api/delete-intune", post(delete_intune))
        .route("/api/delete-autopilot", post(delete_autopilot))
        .route("/api/delete-entra", post(delete_entra))
        .route("/api/retire", post(retire))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        version: state.version,
    })
}

/// Serials as pasted by the operator (one per line) or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SerialsInput {
    Text(String),
    List(Vec<String>),
}

impl SerialsInput {
    fn into_batch(self) -> SerialBatch {
        match self {
            SerialsInput::Text(text) => SerialBatch::parse(&text),
            SerialsInput::List(list) => SerialBatch::parse(&list.join("\n")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub serials: SerialsInput,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub results: Vec<MergedDeviceView>,
}

#[instrument(skip_all)]
async fn fetch_data(
    State(state): State<AppState>,
    Json(request): Json<FetchRequest>,
) -> ApiResult<Json<FetchResponse>> {
    let batch = request.serials.into_batch();
    if batch.is_empty() {
        return Err(ApiError::BadRequest("no serial numbers supplied".into()));
    }

    let results = state.resolver.resolve(&batch).await?;
    let found = results.iter().filter(|v| v.found_anywhere()).count();
    info!(serials = batch.len(), found, "Resolved batch");

    Ok(Json(FetchResponse { results }))
}

/// Native ids for one registry stage.
#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub devices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub success: bool,
    pub results: StageReport,
}

impl From<StageReport> for StageResponse {
    fn from(results: StageReport) -> Self {
        Self {
            success: results.is_confirmed(),
            results,
        }
    }
}

/// Normalizes ids the same way a full retire request does.
fn stage_targets(state: &AppState, kind: RegistryKind, ids: Vec<String>) -> ApiResult<Vec<String>> {
    if state.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }
    let ids: Vec<String> = ids.into_iter().map(|id| id.trim().to_string()).collect();
    Ok(DeletionRequest::for_registry(kind, ids)
        .targets(kind)
        .to_vec())
}

#[instrument(skip_all)]
async fn delete_intune(
    State(state): State<AppState>,
    Json(request): Json<StageRequest>,
) -> ApiResult<Json<StageResponse>> {
    let ids = stage_targets(&state, RegistryKind::ManagedDevice, request.devices)?;
    let report = state
        .orchestrator
        .delete_managed_devices(&ids, &state.shutdown)
        .await;
    Ok(Json(report.into()))
}

#[instrument(skip_all)]
async fn delete_autopilot(
    State(state): State<AppState>,
    Json(request): Json<StageRequest>,
) -> ApiResult<Json<StageResponse>> {
    let ids = stage_targets(&state, RegistryKind::Provisioning, request.devices)?;
    let report = state
        .orchestrator
        .delete_provisioning_devices(&ids, &state.shutdown)
        .await;
    Ok(Json(report.into()))
}

#[instrument(skip_all)]
async fn delete_entra(
    State(state): State<AppState>,
    Json(request): Json<StageRequest>,
) -> ApiResult<Json<StageResponse>> {
    let ids = stage_targets(&state, RegistryKind::Directory, request.devices)?;
    let report = state
        .orchestrator
        .delete_directory_devices(&ids, &state.shutdown)
        .await;
    Ok(Json(report.into()))
}

/// Devices picked from a previous `fetch-data` response.
#[derive(Debug, Deserialize)]
pub struct RetireRequest {
    pub devices: Vec<DeviceSelection>,
}

/// `success` is false when any stage aborted or any device was rejected.
#[derive(Debug, Serialize)]
pub struct RetireResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: DeletionReport,
}

impl From<DeletionReport> for RetireResponse {
    fn from(report: DeletionReport) -> Self {
        Self {
            success: report.succeeded(),
            report,
        }
    }
}

#[instrument(skip_all)]
async fn retire(
    State(state): State<AppState>,
    Json(request): Json<RetireRequest>,
) -> ApiResult<Json<RetireResponse>> {
    if request.devices.is_empty() {
        return Err(ApiError::BadRequest("no devices selected".into()));
    }
    if state.is_shutting_down() {
        return Err(ApiError::ShuttingDown);
    }

    info!(devices = request.devices.len(), "Retire requested");
    let deletion = DeletionRequest::from_selections(request.devices);
    let report = state.orchestrator.execute(&deletion, &state.shutdown).await;
    Ok(Json(report.into()))
}
