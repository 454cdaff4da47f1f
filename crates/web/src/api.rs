//! JSON API routes and handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use multiserver_common::{ManagedService, NewService, ServiceDetail, ServiceId, ServiceUpdate};
use multiserver_controller::{Cascade, Outcome, Panel};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Query string accepted by every lifecycle action
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub cascade: Cascade,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub changed: bool,
    pub cascaded: bool,
    pub message: String,
    pub service: ManagedService,
}

impl ActionResponse {
    fn from_outcome(outcome: Outcome, message: String) -> Self {
        Self {
            changed: outcome.changed,
            cascaded: outcome.cascaded,
            message,
            service: outcome.service,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplyAllResponse {
    pub changed: bool,
    pub cascaded: bool,
    pub systemd: bool,
    pub nginx: bool,
    pub message: String,
    pub service: ManagedService,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: ServiceId,
    pub message: String,
}

/// Build the API router over a panel
pub fn router(panel: Panel) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/services",
            get(list_services_handler).post(create_service_handler),
        )
        .route(
            "/api/services/:id",
            get(get_service_handler)
                .put(update_service_handler)
                .delete(delete_service_handler),
        )
        .route("/api/services/:id/initialize", post(initialize_handler))
        .route("/api/services/:id/apply-systemd", post(apply_systemd_handler))
        .route("/api/services/:id/apply-nginx", post(apply_nginx_handler))
        .route("/api/services/:id/apply-all", post(apply_all_handler))
        .route("/api/services/:id/enable", post(enable_handler))
        .route("/api/services/:id/disable", post(disable_handler))
        .fallback(not_found_handler)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(panel)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "multiserver-web",
        "version": multiserver_common::VERSION,
    }))
}

async fn not_found_handler() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "no such route")
}

async fn list_services_handler(State(panel): State<Panel>) -> ApiResult<Json<Vec<ManagedService>>> {
    Ok(Json(panel.registry().list()?))
}

async fn create_service_handler(
    State(panel): State<Panel>,
    Json(new): Json<NewService>,
) -> ApiResult<(StatusCode, Json<ManagedService>)> {
    let service = panel.registry().create(new).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

async fn get_service_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
) -> ApiResult<Json<ServiceDetail>> {
    Ok(Json(panel.registry().detail(id).await?))
}

async fn update_service_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Json(update): Json<ServiceUpdate>,
) -> ApiResult<Json<ManagedService>> {
    Ok(Json(panel.registry().update(id, update).await?))
}

async fn delete_service_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
) -> ApiResult<Json<DeleteResponse>> {
    let service = panel.registry().delete(id).await?;
    Ok(Json(DeleteResponse {
        id: service.id,
        message: format!("{} deleted.", service.name),
    }))
}

async fn initialize_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = panel.controller().initialize(id).await?;
    let message = format!("{} initialized.", outcome.service.name);
    Ok(Json(ActionResponse::from_outcome(outcome, message)))
}

async fn apply_systemd_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = panel.controller().apply_systemd(id, query.cascade).await?;
    let message = format!("Systemd config applied for {}.", outcome.service.name);
    Ok(Json(ActionResponse::from_outcome(outcome, message)))
}

async fn apply_nginx_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = panel.controller().apply_nginx(id, query.cascade).await?;
    let message = format!("Nginx config applied for {}.", outcome.service.name);
    Ok(Json(ActionResponse::from_outcome(outcome, message)))
}

async fn apply_all_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<ApplyAllResponse>> {
    let report = panel.controller().apply_changes(id, query.cascade).await?;
    Ok(Json(ApplyAllResponse {
        changed: report.changed(),
        cascaded: report.cascaded,
        systemd: report.systemd,
        nginx: report.nginx,
        message: format!("Configs applied for {}.", report.service.name),
        service: report.service,
    }))
}

async fn enable_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = panel.controller().enable(id, query.cascade).await?;
    let message = format!("{} enabled.", outcome.service.name);
    Ok(Json(ActionResponse::from_outcome(outcome, message)))
}

async fn disable_handler(
    State(panel): State<Panel>,
    Path(id): Path<ServiceId>,
    Query(query): Query<ActionQuery>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = panel.controller().disable(id, query.cascade).await?;
    let message = format!("{} disabled.", outcome.service.name);
    Ok(Json(ActionResponse::from_outcome(outcome, message)))
}
