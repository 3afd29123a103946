use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentKind {
    #[serde(rename = "acopio")]
    CollectionPoint,
    #[serde(rename = "zona_critica")]
    CriticalZone,
    #[serde(rename = "animal_muerto")]
    DeadAnimal,
}

/// Highest weight an incident may carry; the heaviest default kind.
pub const MAX_SEVERITY: u32 = 5;

impl IncidentKind {
    pub const ALL: [IncidentKind; 3] = [
        IncidentKind::CollectionPoint,
        IncidentKind::CriticalZone,
        IncidentKind::DeadAnimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::CollectionPoint => "acopio",
            IncidentKind::CriticalZone => "zona_critica",
            IncidentKind::DeadAnimal => "animal_muerto",
        }
    }

    pub fn default_severity(&self) -> u32 {
        match self {
            IncidentKind::CollectionPoint => 1,
            IncidentKind::CriticalZone => 3,
            IncidentKind::DeadAnimal => 5,
        }
    }

    /// How long after the report the incident should be attended.
    pub fn attention_window(&self) -> Duration {
        match self {
            IncidentKind::CollectionPoint => Duration::hours(24),
            IncidentKind::CriticalZone => Duration::hours(8),
            IncidentKind::DeadAnimal => Duration::hours(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "validada")]
    Validated,
    #[serde(rename = "cancelada")]
    Cancelled,
    #[serde(rename = "completada")]
    Completed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 4] = [
        IncidentStatus::Pending,
        IncidentStatus::Validated,
        IncidentStatus::Cancelled,
        IncidentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pendiente",
            IncidentStatus::Validated => "validada",
            IncidentStatus::Cancelled => "cancelada",
            IncidentStatus::Completed => "completada",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Cancelled | IncidentStatus::Completed)
    }

    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        matches!(
            (self, next),
            (IncidentStatus::Pending, IncidentStatus::Validated)
                | (IncidentStatus::Pending, IncidentStatus::Cancelled)
                | (IncidentStatus::Validated, IncidentStatus::Completed)
        )
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        IncidentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("unknown incident status: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    #[serde(rename = "tipo")]
    pub kind: IncidentKind,
    #[serde(rename = "gravedad")]
    pub severity: u32,
    #[serde(rename = "zona")]
    pub zone: Zone,
    #[serde(rename = "ubicacion")]
    pub location: Option<GeoPoint>,
    pub foto_url: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "estado")]
    pub status: IncidentStatus,
    /// Owning route while validated and consumed by a non-cancelled route.
    #[serde(rename = "ruta_id")]
    pub route_id: Option<u64>,
    #[serde(rename = "motivo_rechazo")]
    pub rejection_reason: Option<String>,
    #[serde(rename = "ventana_fin")]
    pub attention_deadline: DateTime<Utc>,
    #[serde(rename = "reportado_en")]
    pub reported_at: DateTime<Utc>,
    #[serde(rename = "actualizado_en")]
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    /// Validated and not yet consumed by a route.
    pub fn is_unrouted(&self) -> bool {
        self.status == IncidentStatus::Validated && self.route_id.is_none()
    }
}

/// `None` when the total does not fit in a `u32`.
pub fn severity_sum<'a>(incidents: impl IntoIterator<Item = &'a Incident>) -> Option<u32> {
    incidents
        .into_iter()
        .try_fold(0u32, |total, incident| total.checked_add(incident.severity))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{severity_sum, Incident, IncidentKind, IncidentStatus, MAX_SEVERITY};
    use crate::models::zone::Zone;

    fn weighted(id: u64, severity: u32) -> Incident {
        let now = Utc::now();
        Incident {
            id,
            kind: IncidentKind::CollectionPoint,
            severity,
            zone: Zone::Eastern,
            location: None,
            foto_url: None,
            description: String::new(),
            status: IncidentStatus::Validated,
            route_id: None,
            rejection_reason: None,
            attention_deadline: now,
            reported_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn severity_sum_reports_overflow_instead_of_wrapping() {
        let small = [weighted(1, 2), weighted(2, MAX_SEVERITY)];
        assert_eq!(severity_sum(&small), Some(7));

        let huge = [weighted(1, 10), weighted(2, u32::MAX)];
        assert_eq!(severity_sum(&huge), None);
    }

    #[test]
    fn every_default_severity_is_within_bounds() {
        for kind in IncidentKind::ALL {
            assert!((1..=MAX_SEVERITY).contains(&kind.default_severity()));
        }
    }

    #[test]
    fn transitions_form_a_dag_with_terminal_sinks() {
        for from in IncidentStatus::ALL {
            for to in IncidentStatus::ALL {
                if from.is_terminal() {
                    assert!(!from.can_transition_to(to));
                }
                if from.can_transition_to(to) {
                    assert!(!to.can_transition_to(from));
                }
            }
        }
    }

    #[test]
    fn validated_cannot_be_cancelled() {
        assert!(!IncidentStatus::Validated.can_transition_to(IncidentStatus::Cancelled));
    }

    #[test]
    fn dead_animals_are_most_urgent() {
        assert_eq!(IncidentKind::DeadAnimal.default_severity(), 5);
        assert!(
            IncidentKind::DeadAnimal.attention_window()
                < IncidentKind::CollectionPoint.attention_window()
        );
    }

    #[test]
    fn status_parses_from_wire_name() {
        assert_eq!(
            "cancelada".parse::<IncidentStatus>().unwrap(),
            IncidentStatus::Cancelled
        );
        assert!("asignada".parse::<IncidentStatus>().is_err());
    }
}
