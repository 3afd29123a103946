use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::api::rest::session::Session;
use crate::api::rest::{parse_filter, parse_page};
use crate::engine::routes::{self, RouteFilter};
use crate::engine::Page;
use crate::error::AppError;
use crate::models::route::{Route, RouteDetail, RouteStatus};
use crate::models::zone::Zone;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rutas", get(list_routes))
        .route("/api/rutas/", get(list_routes))
        .route("/api/rutas/zona/:zona", get(routes_by_zone))
        .route("/api/rutas/:id", get(get_route))
        .route("/api/rutas/:id/estado", patch(update_route_status))
}

#[derive(Deserialize)]
pub struct ListRoutesQuery {
    pub zona: Option<String>,
    pub estado: Option<String>,
    pub skip: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize)]
pub struct ZoneRoutesQuery {
    pub estado: Option<String>,
}

#[derive(Serialize)]
pub struct ZoneRoutesResponse {
    pub zona: Zone,
    pub total: usize,
    pub rutas: Vec<Route>,
}

#[derive(Deserialize)]
pub struct UpdateRouteStatusRequest {
    pub estado: String,
    pub motivo: Option<String>,
}

async fn list_routes(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Query(query): Query<ListRoutesQuery>,
) -> Result<Json<Vec<Route>>, AppError> {
    let filter = RouteFilter {
        zone: parse_filter(query.zona.as_deref())?,
        status: parse_filter(query.estado.as_deref())?,
    };
    let page = parse_page(query.skip.as_deref(), query.limit.as_deref())?;

    Ok(Json(routes::list_routes(&state, filter, page)))
}

async fn routes_by_zone(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(zona): Path<String>,
    Query(query): Query<ZoneRoutesQuery>,
) -> Result<Json<ZoneRoutesResponse>, AppError> {
    let zone: Zone = zona
        .parse()
        .map_err(|_| AppError::NotFound(format!("zone {zona} not found")))?;
    let filter = RouteFilter {
        zone: Some(zone),
        status: parse_filter(query.estado.as_deref())?,
    };

    let rutas = routes::list_routes(
        &state,
        filter,
        Page {
            skip: 0,
            limit: usize::MAX,
        },
    );

    Ok(Json(ZoneRoutesResponse {
        zona: zone,
        total: rutas.len(),
        rutas,
    }))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
) -> Result<Json<RouteDetail>, AppError> {
    Ok(Json(routes::get_route(&state, id)?))
}

/// Forward progress happens through assignments; operators can only cancel.
async fn update_route_status(
    State(state): State<Arc<AppState>>,
    _session: Session,
    Path(id): Path<u64>,
    Json(payload): Json<UpdateRouteStatusRequest>,
) -> Result<Json<Route>, AppError> {
    let requested: RouteStatus = payload.estado.trim().parse()?;
    if requested != RouteStatus::Cancelled {
        return Err(AppError::InvalidTransition(format!(
            "route status {requested} cannot be set directly"
        )));
    }

    Ok(Json(routes::cancel_route(&state, id, payload.motivo).await?))
}
