use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::rest::parse_filter;
use crate::api::rest::session::Session;
use crate::engine::assignment::{self, AssignmentRequest};
use crate::engine::registry::{self, DriverFilter, NewDriver};
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::driver::{Driver, DriverStatus, LicenseClass, PreferredZone, Truck};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conductores", post(register_driver).get(list_drivers))
        .route("/api/conductores/", post(register_driver).get(list_drivers))
        .route("/api/conductores/disponibles", get(available_drivers))
        .route("/api/conductores/camiones", get(list_trucks))
        .route(
            "/api/conductores/:id",
            get(get_driver).patch(update_driver_status),
        )
        .route("/api/conductores/asignaciones", post(create_assignment))
        .route("/api/conductores/asignaciones/", post(create_assignment))
        .route("/api/conductores/asignaciones/:id", patch(advance_assignment))
        .route(
            "/api/conductores/asignaciones/ruta/:ruta_id",
            get(assignments_for_route),
        )
        .route(
            "/api/conductores/asignaciones/conductor/:conductor_id",
            get(assignments_for_driver),
        )
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    pub cedula: String,
    pub nombre_completo: String,
    pub telefono: Option<String>,
    pub licencia_tipo: LicenseClass,
    pub zona_preferida: Option<PreferredZone>,
}

#[derive(Deserialize)]
pub struct DriverQuery {
    pub estado: Option<String>,
    pub zona: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateDriverStatusRequest {
    pub estado: DriverStatus,
}

#[derive(Deserialize)]
pub struct CreateAssignmentRequest {
    pub ruta_id: u64,
    pub conductor_id: u64,
    pub camion_id: String,
    pub camion_tipo: String,
    pub fecha_inicio: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct AdvanceAssignmentRequest {
    pub estado: String,
}

#[derive(Deserialize)]
pub struct AssignmentQuery {
    pub estado: Option<String>,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    let driver = registry::register_driver(
        &state,
        NewDriver {
            national_id: payload.cedula,
            full_name: payload.nombre_completo,
            phone: payload.telefono,
            license_class: payload.licencia_tipo,
            preferred_zone: payload.zona_preferida,
        },
    )?;

    Ok((StatusCode::CREATED, Json(driver)))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Query(query): Query<DriverQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let filter = DriverFilter {
        status: parse_filter(query.estado.as_deref())?,
        zone: parse_filter(query.zona.as_deref())?,
    };

    Ok(Json(registry::list_drivers(&state, filter)))
}

async fn available_drivers(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Query(query): Query<DriverQuery>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let zone = parse_filter(query.zona.as_deref())?;
    Ok(Json(registry::available_drivers(&state, zone)))
}

async fn list_trucks(
    State(state): State<Arc<AppState>>,
    _session: Session,
) -> Json<Vec<Truck>> {
    Json(registry::list_trucks(&state))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(registry::get_driver(&state, id)?))
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateDriverStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    Ok(Json(
        registry::set_driver_status(&state, id, payload.estado).await?,
    ))
}

async fn create_assignment(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<(StatusCode, Json<Assignment>), AppError> {
    let assignment = assignment::create_assignment(
        &state,
        AssignmentRequest {
            route_id: payload.ruta_id,
            driver_id: payload.conductor_id,
            truck_id: payload.camion_id,
            truck_type: payload.camion_tipo,
            start_time: payload.fecha_inicio,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn advance_assignment(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
    Json(payload): Json<AdvanceAssignmentRequest>,
) -> Result<Json<Assignment>, AppError> {
    let next: AssignmentStatus = payload.estado.trim().parse()?;
    Ok(Json(assignment::advance_assignment(&state, id, next).await?))
}

async fn assignments_for_route(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(route_id): Path<u64>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(assignment::assignments_for_route(&state, route_id)?))
}

async fn assignments_for_driver(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(driver_id): Path<u64>,
    Query(query): Query<AssignmentQuery>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    let status = parse_filter(query.estado.as_deref())?;
    Ok(Json(assignment::assignments_for_driver(
        &state, driver_id, status,
    )?))
}
