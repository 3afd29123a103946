use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::engine::builder::RoutePlan;
use crate::engine::Page;
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::event::DispatchEvent;
use crate::models::incident::{Incident, IncidentStatus};
use crate::models::route::{Route, RouteDetail, RouteStatus, Stop};
use crate::models::zone::Zone;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteFilter {
    pub zone: Option<Zone>,
    pub status: Option<RouteStatus>,
}

impl RouteFilter {
    pub fn matches(&self, route: &Route) -> bool {
        self.zone.is_none_or(|zone| route.zone == zone)
            && self.status.is_none_or(|status| route.status == status)
    }
}

/// Turns a verified plan into a `planeada` route with a fresh id. The route is
/// not stored; the caller commits it together with the incident bindings.
pub fn materialize(
    state: &AppState,
    zone: Zone,
    batch: &[Incident],
    plan: RoutePlan,
    now: DateTime<Utc>,
) -> Route {
    let severities: HashMap<u64, u32> = batch
        .iter()
        .map(|incident| (incident.id, incident.severity))
        .collect();

    let mut load: u32 = 0;
    let stops = plan
        .stops
        .into_iter()
        .enumerate()
        .map(|(idx, planned)| {
            if let Some(id) = planned.incident_id {
                let severity = severities.get(&id).copied().unwrap_or(0);
                load = load.saturating_add(severity);
            }
            Stop {
                sequence: idx as u32 + 1,
                kind: planned.kind,
                incident_id: planned.incident_id,
                location: planned.location,
                cumulative_load: load,
            }
        })
        .collect::<Vec<_>>();

    Route {
        id: state.route_ids.next(),
        zone,
        status: RouteStatus::Planned,
        stops,
        total_severity: plan.total_severity,
        trucks_used: plan.trucks_used,
        total_distance_meters: plan.total_distance_meters,
        estimated_duration_secs: plan.estimated_duration_secs,
        notes: None,
        replaced_by: None,
        generated_at: now,
        updated_at: now,
    }
}

pub fn get_route(state: &AppState, id: u64) -> Result<RouteDetail, AppError> {
    let route = state
        .routes
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;

    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| entry.route_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by_key(|assignment| assignment.id);

    Ok(RouteDetail { route, assignments })
}

/// Newest first.
pub fn list_routes(state: &AppState, filter: RouteFilter, page: Page) -> Vec<Route> {
    let mut routes: Vec<Route> = state
        .routes
        .iter()
        .filter(|entry| filter.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    routes.sort_by(|a, b| b.id.cmp(&a.id));

    page.apply(routes)
}

/// Compare-and-set on the route status. Callers hold the dispatch lock.
pub(crate) fn transition_route(
    state: &AppState,
    id: u64,
    from: RouteStatus,
    to: RouteStatus,
    now: DateTime<Utc>,
) -> Result<Route, AppError> {
    let mut entry = state
        .routes
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;

    if entry.status != from {
        return Err(AppError::InvalidState(format!(
            "route {id} is {}, expected {from}",
            entry.status
        )));
    }

    entry.status = to;
    entry.updated_at = now;
    Ok(entry.clone())
}

/// Marks every still-validated incident of the route `completada`.
pub(crate) fn complete_incidents(state: &AppState, route: &Route, now: DateTime<Utc>) -> usize {
    let mut completed = 0;
    for incident_id in route.incident_ids() {
        if let Some(mut incident) = state.incidents.get_mut(&incident_id) {
            if incident.status.can_transition_to(IncidentStatus::Completed) {
                incident.status = IncidentStatus::Completed;
                incident.updated_at = now;
                completed += 1;
            }
        }
    }
    completed
}

/// Retires `planeada` routes whose incidents now belong to `replacement`.
/// Callers hold the zone lock and rebind the incidents themselves.
pub(crate) fn supersede_routes(
    state: &AppState,
    ids: &[u64],
    replacement: u64,
    now: DateTime<Utc>,
) -> Vec<u64> {
    let mut superseded = Vec::with_capacity(ids.len());
    for &id in ids {
        let Some(mut entry) = state.routes.get_mut(&id) else {
            continue;
        };
        if entry.status != RouteStatus::Planned {
            continue;
        }
        entry.status = RouteStatus::Cancelled;
        entry.replaced_by = Some(replacement);
        entry.updated_at = now;
        let zone = entry.zone;
        let moved = entry.incident_ids().count();
        drop(entry);

        state.publish(DispatchEvent::RouteCancelled {
            route_id: id,
            zone,
            reason: None,
            released_incidents: moved,
            replaced_by: Some(replacement),
            at: now,
        });
        superseded.push(id);
    }
    superseded
}

/// Escape hatch from any non-terminal state. Open assignments are cancelled
/// and the route's validated incidents go back to the unrouted pool.
pub async fn cancel_route(
    state: &AppState,
    id: u64,
    reason: Option<String>,
) -> Result<Route, AppError> {
    let _dispatch_guard = state.dispatch_lock.lock().await;

    let zone = state
        .routes
        .get(&id)
        .map(|entry| entry.zone)
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;
    let _zone_guard = state.zone_locks.for_zone(zone).lock().await;

    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());
    let now = Utc::now();

    let route = {
        let mut entry = state
            .routes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;

        if entry.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "route {id} is {} and cannot be cancelled",
                entry.status
            )));
        }

        entry.status = RouteStatus::Cancelled;
        entry.updated_at = now;
        if reason.is_some() {
            entry.notes = reason.clone();
        }
        entry.clone()
    };

    let open: Vec<u64> = state
        .assignments
        .iter()
        .filter(|entry| entry.route_id == id && entry.status.is_open())
        .map(|entry| entry.id)
        .collect();
    for assignment_id in &open {
        if let Some(mut assignment) = state.assignments.get_mut(assignment_id) {
            assignment.status = AssignmentStatus::Cancelled;
        }
        state.metrics.open_assignments.dec();
    }

    let mut released = 0;
    for incident_id in route.incident_ids() {
        if let Some(mut incident) = state.incidents.get_mut(&incident_id) {
            if incident.status == IncidentStatus::Validated && incident.route_id == Some(id) {
                incident.route_id = None;
                incident.updated_at = now;
                released += 1;
            }
        }
    }

    state.publish(DispatchEvent::RouteCancelled {
        route_id: id,
        zone,
        reason,
        released_incidents: released,
        replaced_by: None,
        at: now,
    });

    info!(
        route_id = id,
        zone = %zone,
        cancelled_assignments = open.len(),
        released_incidents = released,
        "route cancelled"
    );

    Ok(route)
}
