use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::engine::registry::{check_truck, record_truck};
use crate::engine::routes::{complete_incidents, transition_route};
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::driver::DriverStatus;
use crate::models::event::DispatchEvent;
use crate::models::route::RouteStatus;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub route_id: u64,
    pub driver_id: u64,
    pub truck_id: String,
    pub truck_type: String,
    pub start_time: Option<DateTime<Utc>>,
}

pub async fn create_assignment(
    state: &AppState,
    request: AssignmentRequest,
) -> Result<Assignment, AppError> {
    let result = {
        let _dispatch_guard = state.dispatch_lock.lock().await;
        let zone = state.routes.get(&request.route_id).map(|entry| entry.zone);
        match zone {
            Some(zone) => {
                // Validation may be folding this route into a recalculated one.
                let _zone_guard = state.zone_locks.for_zone(zone).lock().await;
                create_locked(state, request)
            }
            None => Err(AppError::NotFound(format!(
                "route {} not found",
                request.route_id
            ))),
        }
    };

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    match &result {
        Ok(assignment) => {
            state.metrics.open_assignments.inc();
            state.publish(DispatchEvent::AssignmentCreated {
                assignment: assignment.clone(),
            });
            state.publish(DispatchEvent::RouteStatusChanged {
                route_id: assignment.route_id,
                status: RouteStatus::Assigned,
                at: assignment.assigned_at,
            });
            info!(
                assignment_id = assignment.id,
                route_id = assignment.route_id,
                driver_id = assignment.driver_id,
                truck_id = %assignment.truck_id,
                "route assigned"
            );
        }
        Err(err) => warn!(error = %err, kind = err.kind(), "assignment rejected"),
    }

    result
}

fn create_locked(state: &AppState, request: AssignmentRequest) -> Result<Assignment, AppError> {
    let route_status = state
        .routes
        .get(&request.route_id)
        .map(|entry| entry.status)
        .ok_or_else(|| AppError::NotFound(format!("route {} not found", request.route_id)))?;

    let driver_status = state
        .drivers
        .get(&request.driver_id)
        .map(|entry| entry.status)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", request.driver_id)))?;

    if route_status != RouteStatus::Planned {
        return Err(AppError::InvalidState(format!(
            "route {} is {route_status}, only planeada routes can be assigned",
            request.route_id
        )));
    }
    if let Some(open) = open_assignment_for_route(state, request.route_id) {
        return Err(AppError::InvalidState(format!(
            "route {} already has open assignment {}",
            request.route_id, open.id
        )));
    }

    if driver_status != DriverStatus::Active {
        return Err(AppError::DriverUnavailable(format!(
            "driver {} is {driver_status}",
            request.driver_id
        )));
    }
    if let Some(open) = open_assignment_for_driver(state, request.driver_id) {
        return Err(AppError::DriverUnavailable(format!(
            "driver {} is already on route {}",
            request.driver_id, open.route_id
        )));
    }

    let (truck_id, truck_type) = check_truck(state, &request.truck_id, &request.truck_type)?;

    let now = Utc::now();
    transition_route(
        state,
        request.route_id,
        RouteStatus::Planned,
        RouteStatus::Assigned,
        now,
    )?;
    record_truck(state, &truck_id, &truck_type, now);

    let assignment = Assignment {
        id: state.assignment_ids.next(),
        route_id: request.route_id,
        driver_id: request.driver_id,
        truck_id,
        truck_type,
        start_time: request.start_time,
        status: AssignmentStatus::Assigned,
        assigned_at: now,
        started_at: None,
        completed_at: None,
    };
    state.assignments.insert(assignment.id, assignment.clone());

    Ok(assignment)
}

/// Moves an assignment one step forward and cascades the route status:
/// `iniciado` puts the route `en_ejecucion`, `completado` completes the route
/// and its incidents.
pub async fn advance_assignment(
    state: &AppState,
    id: u64,
    next: AssignmentStatus,
) -> Result<Assignment, AppError> {
    let _dispatch_guard = state.dispatch_lock.lock().await;

    let current = state
        .assignments
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("assignment {id} not found")))?;

    if current.status.next() != Some(next) {
        return Err(AppError::InvalidTransition(format!(
            "assignment {id} cannot move from {} to {next}",
            current.status
        )));
    }

    let now = Utc::now();
    let (from, to) = match next {
        AssignmentStatus::Started => (RouteStatus::Assigned, RouteStatus::InExecution),
        AssignmentStatus::Completed => (RouteStatus::InExecution, RouteStatus::Completed),
        AssignmentStatus::Assigned | AssignmentStatus::Cancelled => {
            return Err(AppError::InvalidTransition(format!(
                "assignment {id} cannot move to {next}"
            )));
        }
    };
    let route = transition_route(state, current.route_id, from, to, now)?;

    let completed_incidents = if next == AssignmentStatus::Completed {
        complete_incidents(state, &route, now)
    } else {
        0
    };

    let assignment = {
        let mut entry = state
            .assignments
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal(format!("assignment {id} vanished")))?;
        entry.status = next;
        match next {
            AssignmentStatus::Started => entry.started_at = Some(now),
            AssignmentStatus::Completed => entry.completed_at = Some(now),
            _ => {}
        }
        entry.clone()
    };

    if next == AssignmentStatus::Completed {
        state.metrics.open_assignments.dec();
    }

    state.publish(DispatchEvent::AssignmentAdvanced {
        assignment_id: id,
        route_id: route.id,
        status: next,
        at: now,
    });
    state.publish(DispatchEvent::RouteStatusChanged {
        route_id: route.id,
        status: route.status,
        at: now,
    });

    info!(
        assignment_id = id,
        route_id = route.id,
        status = %next,
        route_status = %route.status,
        completed_incidents,
        "assignment advanced"
    );

    Ok(assignment)
}

pub fn assignments_for_route(state: &AppState, route_id: u64) -> Result<Vec<Assignment>, AppError> {
    if !state.routes.contains_key(&route_id) {
        return Err(AppError::NotFound(format!("route {route_id} not found")));
    }

    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| entry.route_id == route_id)
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by_key(|assignment| assignment.id);

    Ok(assignments)
}

pub fn assignments_for_driver(
    state: &AppState,
    driver_id: u64,
    status: Option<AssignmentStatus>,
) -> Result<Vec<Assignment>, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .filter(|entry| entry.driver_id == driver_id)
        .filter(|entry| status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| b.id.cmp(&a.id));

    Ok(assignments)
}

pub(crate) fn open_assignment_for_route(state: &AppState, route_id: u64) -> Option<Assignment> {
    state
        .assignments
        .iter()
        .find(|entry| entry.route_id == route_id && entry.status.is_open())
        .map(|entry| entry.value().clone())
}

pub(crate) fn open_assignment_for_driver(state: &AppState, driver_id: u64) -> Option<Assignment> {
    state
        .assignments
        .iter()
        .find(|entry| entry.driver_id == driver_id && entry.status.is_open())
        .map(|entry| entry.value().clone())
}

#[cfg(test)]
mod tests {
    use super::{advance_assignment, assignments_for_driver, create_assignment, AssignmentRequest};
    use crate::config::Config;
    use crate::engine::incidents::{get_incident, report_incident, validate_incident, NewIncident};
    use crate::engine::registry::{register_driver, set_driver_status, NewDriver};
    use crate::engine::routes::get_route;
    use crate::error::AppError;
    use crate::models::assignment::AssignmentStatus;
    use crate::models::driver::{DriverStatus, LicenseClass};
    use crate::models::incident::{IncidentKind, IncidentStatus};
    use crate::models::route::RouteStatus;
    use crate::models::zone::Zone;
    use crate::state::AppState;

    async fn planned_route(state: &AppState, zone: Zone) -> (u64, u64) {
        let incident = report_incident(
            state,
            NewIncident {
                kind: IncidentKind::DeadAnimal,
                severity: None,
                zone: Some(zone),
                location: None,
                photo_url: None,
                description: None,
            },
        )
        .unwrap();
        let outcome = validate_incident(state, incident.id).await.unwrap();
        (incident.id, outcome.route_id.unwrap())
    }

    fn driver(state: &AppState, national_id: &str) -> u64 {
        register_driver(
            state,
            NewDriver {
                national_id: national_id.to_string(),
                full_name: "Maria Lopez Vega".to_string(),
                phone: None,
                license_class: LicenseClass::D,
                preferred_zone: None,
            },
        )
        .unwrap()
        .id
    }

    fn request(route_id: u64, driver_id: u64, truck_id: &str) -> AssignmentRequest {
        AssignmentRequest {
            route_id,
            driver_id,
            truck_id: truck_id.to_string(),
            truck_type: "compactor".to_string(),
            start_time: None,
        }
    }

    fn eager_state() -> AppState {
        AppState::new(Config {
            route_severity_threshold: 0,
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn inactive_driver_is_unavailable_and_route_stays_planned() {
        let state = eager_state();
        let (_, route_id) = planned_route(&state, Zone::Western).await;
        let driver_id = driver(&state, "0102030405");
        set_driver_status(&state, driver_id, DriverStatus::Inactive)
            .await
            .unwrap();

        let err = create_assignment(&state, request(route_id, driver_id, "T-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DriverUnavailable(_)));
        assert_eq!(get_route(&state, route_id).unwrap().route.status, RouteStatus::Planned);
        assert!(state.assignments.is_empty());
    }

    #[tokio::test]
    async fn second_assignment_for_same_route_is_rejected() {
        let state = eager_state();
        let (_, route_id) = planned_route(&state, Zone::Western).await;
        let first = driver(&state, "0102030405");
        let second = driver(&state, "0102030406");

        create_assignment(&state, request(route_id, first, "T-1"))
            .await
            .unwrap();
        let err = create_assignment(&state, request(route_id, second, "T-2"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn driver_cannot_hold_two_open_assignments() {
        let state = eager_state();
        let (_, first_route) = planned_route(&state, Zone::Western).await;
        let (_, second_route) = planned_route(&state, Zone::Eastern).await;
        let driver_id = driver(&state, "0102030405");

        create_assignment(&state, request(first_route, driver_id, "T-1"))
            .await
            .unwrap();
        let err = create_assignment(&state, request(second_route, driver_id, "T-2"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DriverUnavailable(_)));
        assert_eq!(
            get_route(&state, second_route).unwrap().route.status,
            RouteStatus::Planned
        );
    }

    #[tokio::test]
    async fn advancing_cascades_to_route_and_incidents() {
        let state = eager_state();
        let (incident_id, route_id) = planned_route(&state, Zone::Western).await;
        let driver_id = driver(&state, "0102030405");
        let assignment = create_assignment(&state, request(route_id, driver_id, "T-1"))
            .await
            .unwrap();
        assert_eq!(get_route(&state, route_id).unwrap().route.status, RouteStatus::Assigned);

        let started = advance_assignment(&state, assignment.id, AssignmentStatus::Started)
            .await
            .unwrap();
        assert!(started.started_at.is_some());
        assert_eq!(
            get_route(&state, route_id).unwrap().route.status,
            RouteStatus::InExecution
        );

        let done = advance_assignment(&state, assignment.id, AssignmentStatus::Completed)
            .await
            .unwrap();
        assert!(done.completed_at.is_some());
        assert_eq!(get_route(&state, route_id).unwrap().route.status, RouteStatus::Completed);
        assert_eq!(
            get_incident(&state, incident_id).unwrap().status,
            IncidentStatus::Completed
        );
        assert_eq!(state.metrics.open_assignments.get(), 0);

        let err = advance_assignment(&state, assignment.id, AssignmentStatus::Assigned)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn cannot_skip_straight_to_completion() {
        let state = eager_state();
        let (_, route_id) = planned_route(&state, Zone::Western).await;
        let driver_id = driver(&state, "0102030405");
        let assignment = create_assignment(&state, request(route_id, driver_id, "T-1"))
            .await
            .unwrap();

        let err = advance_assignment(&state, assignment.id, AssignmentStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn deactivating_a_busy_driver_is_refused() {
        let state = eager_state();
        let (_, route_id) = planned_route(&state, Zone::Western).await;
        let driver_id = driver(&state, "0102030405");
        create_assignment(&state, request(route_id, driver_id, "T-1"))
            .await
            .unwrap();

        let err = set_driver_status(&state, driver_id, DriverStatus::Inactive)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let open = assignments_for_driver(&state, driver_id, Some(AssignmentStatus::Assigned)).unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn truck_reused_with_other_class_is_rejected() {
        let state = eager_state();
        let (_, first_route) = planned_route(&state, Zone::Western).await;
        let (_, second_route) = planned_route(&state, Zone::Eastern).await;
        let first = driver(&state, "0102030405");
        let second = driver(&state, "0102030406");

        create_assignment(&state, request(first_route, first, "T-1"))
            .await
            .unwrap();
        let mut other = request(second_route, second, "T-1");
        other.truck_type = "lateral".to_string();

        let err = create_assignment(&state, other).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(state.trucks.len(), 1);
    }
}
