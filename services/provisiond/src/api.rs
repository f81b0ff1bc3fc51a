//! HTTP API
//!
//! JSON endpoints over the lifecycle engines. Handlers run the engines
//! synchronously, so a provisioning request holds its connection for the
//! duration of the saga and a formation request for the duration of the
//! poll; callers that cannot wait should poll the status endpoints instead.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use lifecycle::{
    CleanupValidation, ClusterFormationCoordinator, CompensationEngine, DeploymentStatus,
    NodeSpec, OrphanSweepReport, PhaseReport, ProvisionReceipt, ProvisioningOrchestrator,
    StatusMachine,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state: the engines, explicitly constructed in main
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ProvisioningOrchestrator>,
    pub compensation: Arc<CompensationEngine>,
    pub status: Arc<StatusMachine>,
    pub formation: Arc<ClusterFormationCoordinator>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/nodes", post(provision_node))
        .route("/v1/phase-reports", post(report_phase))
        .route("/v1/deployments/{address}/status", get(deployment_status))
        .route("/v1/cleanup/nodes/{name}", post(cleanup_node))
        .route("/v1/cleanup/nodes/{name}/validation", get(validate_cleanup))
        .route("/v1/cleanup/deployments/{id}", post(cleanup_deployment))
        .route("/v1/cleanup/orphaned", post(cleanup_orphaned))
        .route("/v1/clusters/{name}/formation", post(form_cluster))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn provision_node(
    State(state): State<AppState>,
    Json(spec): Json<NodeSpec>,
) -> Result<Json<ProvisionReceipt>, ApiError> {
    let receipt = state.orchestrator.provision(spec).await?;
    Ok(Json(receipt))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Ack {
    accepted: bool,
}

async fn report_phase(
    State(state): State<AppState>,
    Json(report): Json<PhaseReport>,
) -> Result<Json<Ack>, ApiError> {
    state.status.report_phase(report).await?;
    Ok(Json(Ack { accepted: true }))
}

async fn deployment_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<DeploymentStatus>, ApiError> {
    let status = state
        .status
        .deployment_status(&address)
        .await
        .map_err(ApiError::not_found_on_validation)?;
    Ok(Json(status))
}

async fn cleanup_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let report = state.compensation.cleanup_node(&name).await;
    // A sub-threshold ratio is the one cleanup outcome surfaced as an error
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}

async fn validate_cleanup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CleanupValidation>, ApiError> {
    Ok(Json(
        state.compensation.validate_cleanup_completion(&name).await?,
    ))
}

async fn cleanup_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let report = state.compensation.cleanup_deployment(&id).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrphanParams {
    #[serde(default = "default_max_age_hours")]
    max_age_hours: u64,
}

fn default_max_age_hours() -> u64 {
    24
}

async fn cleanup_orphaned(
    State(state): State<AppState>,
    Query(params): Query<OrphanParams>,
) -> Result<Json<OrphanSweepReport>, ApiError> {
    Ok(Json(
        state.compensation.cleanup_orphaned(params.max_age_hours).await,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormationRequest {
    seed_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormationResponse {
    cluster: String,
    status: ledger::ClusterStatus,
}

async fn form_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<FormationRequest>,
) -> Result<Json<FormationResponse>, ApiError> {
    let cluster = state
        .formation
        .form_cluster(&name, &request.seed_address)
        .await
        .map_err(ApiError::not_found_on_validation)?;
    Ok(Json(FormationResponse {
        cluster: cluster.name,
        status: cluster.status,
    }))
}
