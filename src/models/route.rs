use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::incident::GeoPoint;
use crate::models::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    #[serde(rename = "planeada")]
    Planned,
    #[serde(rename = "asignada")]
    Assigned,
    #[serde(rename = "en_ejecucion")]
    InExecution,
    #[serde(rename = "completada")]
    Completed,
    #[serde(rename = "cancelada")]
    Cancelled,
}

impl RouteStatus {
    pub const ALL: [RouteStatus; 5] = [
        RouteStatus::Planned,
        RouteStatus::Assigned,
        RouteStatus::InExecution,
        RouteStatus::Completed,
        RouteStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStatus::Planned => "planeada",
            RouteStatus::Assigned => "asignada",
            RouteStatus::InExecution => "en_ejecucion",
            RouteStatus::Completed => "completada",
            RouteStatus::Cancelled => "cancelada",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        RouteStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("unknown route status: {raw}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    #[serde(rename = "deposito")]
    Depot,
    #[serde(rename = "incidencia")]
    Incident,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    #[serde(rename = "secuencia")]
    pub sequence: u32,
    #[serde(rename = "tipo_punto")]
    pub kind: StopKind,
    #[serde(rename = "incidencia_id")]
    pub incident_id: Option<u64>,
    #[serde(rename = "ubicacion")]
    pub location: Option<GeoPoint>,
    #[serde(rename = "carga_acumulada")]
    pub cumulative_load: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: u64,
    #[serde(rename = "zona")]
    pub zone: Zone,
    #[serde(rename = "estado")]
    pub status: RouteStatus,
    #[serde(rename = "puntos")]
    pub stops: Vec<Stop>,
    #[serde(rename = "suma_gravedad")]
    pub total_severity: u32,
    #[serde(rename = "camiones_usados")]
    pub trucks_used: u32,
    #[serde(rename = "costo_total_metros")]
    pub total_distance_meters: f64,
    #[serde(rename = "duracion_estimada_segundos")]
    pub estimated_duration_secs: Option<u64>,
    #[serde(rename = "notas")]
    pub notes: Option<String>,
    /// Set when a recalculation folded this route into a newer one.
    #[serde(rename = "reemplazada_por", default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<u64>,
    #[serde(rename = "fecha_generacion")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "actualizado_en")]
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn incident_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.stops.iter().filter_map(|stop| stop.incident_id)
    }
}

/// A route together with every assignment ever made for it.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub route: Route,
    #[serde(rename = "asignaciones")]
    pub assignments: Vec<Assignment>,
}
