use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::route::RouteStatus;
use crate::models::zone::Zone;

/// State changes pushed to dashboard subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum DispatchEvent {
    RouteGenerated {
        route_id: u64,
        zone: Zone,
        total_severity: u32,
        trucks_used: u32,
        incidents: usize,
        replaced_routes: Vec<u64>,
        at: DateTime<Utc>,
    },
    CriticalIncident {
        incident_id: u64,
        zone: Zone,
        severity: u32,
        at: DateTime<Utc>,
    },
    RouteCancelled {
        route_id: u64,
        zone: Zone,
        reason: Option<String>,
        released_incidents: usize,
        replaced_by: Option<u64>,
        at: DateTime<Utc>,
    },
    RouteStatusChanged {
        route_id: u64,
        status: RouteStatus,
        at: DateTime<Utc>,
    },
    AssignmentCreated {
        assignment: Assignment,
    },
    AssignmentAdvanced {
        assignment_id: u64,
        route_id: u64,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    },
}
