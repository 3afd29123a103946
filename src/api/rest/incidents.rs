use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::session::Session;
use crate::api::rest::{parse_filter, parse_page};
use crate::engine::incidents::{
    self, IncidentFilter, IncidentStats, NewIncident, ValidationOutcome, ZoneBacklog,
};
use crate::error::AppError;
use crate::models::incident::{GeoPoint, Incident, IncidentKind, IncidentStatus};
use crate::models::zone::Zone;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/incidencias", post(report_incident).get(list_incidents))
        .route("/api/incidencias/", post(report_incident).get(list_incidents))
        .route("/api/incidencias/stats", get(incident_stats))
        .route("/api/incidencias/zona/:zona/umbral", get(zone_backlog))
        .route(
            "/api/incidencias/:id",
            get(get_incident).patch(update_incident_status),
        )
        .route("/api/incidencias/:id/validate", post(validate_incident))
}

#[derive(Deserialize)]
pub struct ReportIncidentRequest {
    #[serde(rename = "tipo")]
    pub kind: IncidentKind,
    #[serde(rename = "gravedad")]
    pub severity: Option<u32>,
    #[serde(rename = "zona")]
    pub zone: Option<Zone>,
    #[serde(rename = "ubicacion")]
    pub location: Option<GeoPoint>,
    pub foto_url: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ListIncidentsQuery {
    pub estado: Option<String>,
    pub zona: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateIncidentStatusRequest {
    pub estado: String,
    pub motivo: Option<String>,
}

async fn report_incident(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReportIncidentRequest>,
) -> Result<(StatusCode, Json<Incident>), AppError> {
    let incident = incidents::report_incident(
        &state,
        NewIncident {
            kind: payload.kind,
            severity: payload.severity,
            zone: payload.zone,
            location: payload.location,
            photo_url: payload.foto_url,
            description: payload.description,
        },
    )?;

    Ok((StatusCode::CREATED, Json(incident)))
}

async fn list_incidents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListIncidentsQuery>,
) -> Result<Json<Vec<Incident>>, AppError> {
    let filter = IncidentFilter {
        status: parse_filter(query.estado.as_deref())?,
        zone: parse_filter(query.zona.as_deref())?,
    };
    let page = parse_page(query.skip.as_deref(), query.limit.as_deref())?;

    Ok(Json(incidents::list_incidents(&state, filter, page)))
}

async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Incident>, AppError> {
    Ok(Json(incidents::get_incident(&state, id)?))
}

async fn incident_stats(State(state): State<Arc<AppState>>) -> Json<IncidentStats> {
    Json(incidents::incident_stats(&state))
}

async fn zone_backlog(
    State(state): State<Arc<AppState>>,
    Path(zona): Path<String>,
) -> Result<Json<ZoneBacklog>, AppError> {
    let zone: Zone = zona.parse()?;
    Ok(Json(incidents::zone_backlog(&state, zone)))
}

async fn validate_incident(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
) -> Result<Json<ValidationOutcome>, AppError> {
    Ok(Json(incidents::validate_incident(&state, id).await?))
}

/// Only `cancelada` is accepted here; every other status is reached through
/// validation or route completion.
async fn update_incident_status(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateIncidentStatusRequest>,
) -> Result<Json<Incident>, AppError> {
    let requested: IncidentStatus = payload.estado.trim().parse()?;
    if requested != IncidentStatus::Cancelled {
        return Err(AppError::InvalidTransition(format!(
            "incident status {requested} cannot be set directly"
        )));
    }

    Ok(Json(
        incidents::reject_incident(&state, id, payload.motivo).await?,
    ))
}
