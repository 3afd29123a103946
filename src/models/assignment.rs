use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    #[serde(rename = "asignado")]
    Assigned,
    #[serde(rename = "iniciado")]
    Started,
    #[serde(rename = "completado")]
    Completed,
    /// Only reached when the owning route is cancelled.
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 4] = [
        AssignmentStatus::Assigned,
        AssignmentStatus::Started,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "asignado",
            AssignmentStatus::Started => "iniciado",
            AssignmentStatus::Completed => "completado",
            AssignmentStatus::Cancelled => "cancelado",
        }
    }

    /// Open assignments bind both their route and their driver.
    pub fn is_open(&self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::Started)
    }

    /// The single status an operator may advance to from here.
    pub fn next(&self) -> Option<AssignmentStatus> {
        match self {
            AssignmentStatus::Assigned => Some(AssignmentStatus::Started),
            AssignmentStatus::Started => Some(AssignmentStatus::Completed),
            AssignmentStatus::Completed | AssignmentStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        AssignmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| AppError::Validation(format!("unknown assignment status: {raw}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: u64,
    #[serde(rename = "ruta_id")]
    pub route_id: u64,
    #[serde(rename = "conductor_id")]
    pub driver_id: u64,
    #[serde(rename = "camion_id")]
    pub truck_id: String,
    #[serde(rename = "camion_tipo")]
    pub truck_type: String,
    /// Scheduled start; absent means the route awaits manual dispatch.
    #[serde(rename = "fecha_inicio")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "estado")]
    pub status: AssignmentStatus,
    #[serde(rename = "fecha_asignacion")]
    pub assigned_at: DateTime<Utc>,
    #[serde(rename = "iniciado_en")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "fecha_finalizacion")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::AssignmentStatus;

    #[test]
    fn advances_monotonically_to_completion() {
        assert_eq!(AssignmentStatus::Assigned.next(), Some(AssignmentStatus::Started));
        assert_eq!(AssignmentStatus::Started.next(), Some(AssignmentStatus::Completed));
        assert_eq!(AssignmentStatus::Completed.next(), None);
        assert_eq!(AssignmentStatus::Cancelled.next(), None);
    }

    #[test]
    fn only_assigned_and_started_are_open() {
        let open: Vec<_> = AssignmentStatus::ALL
            .into_iter()
            .filter(AssignmentStatus::is_open)
            .collect();
        assert_eq!(open, vec![AssignmentStatus::Assigned, AssignmentStatus::Started]);
    }
}
