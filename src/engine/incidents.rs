use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::engine::builder::{verify_plan, RoutePlan};
use crate::engine::routes;
use crate::engine::Page;
use crate::error::AppError;
use crate::geo::classify_zone;
use crate::models::event::DispatchEvent;
use crate::models::incident::{
    severity_sum, GeoPoint, Incident, IncidentKind, IncidentStatus, MAX_SEVERITY,
};
use crate::models::route::RouteStatus;
use crate::models::zone::Zone;
use crate::state::AppState;

/// Validated incidents at or above this severity are announced to dispatchers
/// and force a recalculation of the zone's planned routes.
const CRITICAL_SEVERITY: u32 = 5;

/// A zone pool above `threshold * 3 / 2` also forces a recalculation.
const RECALCULATION_NUMERATOR: u64 = 3;
const RECALCULATION_DENOMINATOR: u64 = 2;

#[derive(Debug, Clone)]
pub struct NewIncident {
    pub kind: IncidentKind,
    pub severity: Option<u32>,
    pub zone: Option<Zone>,
    pub location: Option<GeoPoint>,
    pub photo_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub zone: Option<Zone>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.status.is_none_or(|status| incident.status == status)
            && self.zone.is_none_or(|zone| incident.zone == zone)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    #[serde(rename = "incidencia_id")]
    pub incident_id: u64,
    #[serde(rename = "estado")]
    pub status: IncidentStatus,
    #[serde(rename = "ruta_generada_id", skip_serializing_if = "Option::is_none")]
    pub route_id: Option<u64>,
    #[serde(rename = "rutas_reemplazadas", skip_serializing_if = "Vec::is_empty")]
    pub replaced_route_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentStats {
    pub total: usize,
    #[serde(rename = "por_estado")]
    pub by_status: BTreeMap<&'static str, usize>,
    #[serde(rename = "por_tipo")]
    pub by_kind: BTreeMap<&'static str, usize>,
    #[serde(rename = "por_zona")]
    pub by_zone: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneBacklog {
    #[serde(rename = "zona")]
    pub zone: Zone,
    #[serde(rename = "suma_gravedad")]
    pub severity_sum: u32,
    #[serde(rename = "umbral_configurado")]
    pub threshold: u32,
    #[serde(rename = "debe_generar_ruta")]
    pub would_generate_route: bool,
    #[serde(rename = "incidencias_validadas")]
    pub unrouted_incidents: usize,
}

pub fn report_incident(state: &AppState, new: NewIncident) -> Result<Incident, AppError> {
    if let Some(location) = &new.location {
        if classify_zone(location).is_none() {
            return Err(AppError::Validation(format!(
                "location ({}, {}) is outside the service area",
                location.lat, location.lon
            )));
        }
    }

    let zone = match (new.zone, new.location.as_ref().and_then(classify_zone)) {
        (Some(zone), _) => zone,
        (None, Some(zone)) => zone,
        (None, None) => {
            return Err(AppError::Validation(
                "either zona or ubicacion is required".to_string(),
            ));
        }
    };

    let severity = new.severity.unwrap_or_else(|| new.kind.default_severity());
    if !(1..=MAX_SEVERITY).contains(&severity) {
        return Err(AppError::Validation(format!(
            "gravedad must be between 1 and {MAX_SEVERITY}"
        )));
    }

    let now = Utc::now();
    let incident = Incident {
        id: state.incident_ids.next(),
        kind: new.kind,
        severity,
        zone,
        location: new.location,
        foto_url: new.photo_url.filter(|url| !url.trim().is_empty()),
        description: new.description.unwrap_or_default().trim().to_string(),
        status: IncidentStatus::Pending,
        route_id: None,
        rejection_reason: None,
        attention_deadline: now + new.kind.attention_window(),
        reported_at: now,
        updated_at: now,
    };

    state.incidents.insert(incident.id, incident.clone());

    info!(
        incident_id = incident.id,
        zone = %incident.zone,
        kind = incident.kind.as_str(),
        severity = incident.severity,
        "incident reported"
    );

    Ok(incident)
}

pub fn get_incident(state: &AppState, id: u64) -> Result<Incident, AppError> {
    state
        .incidents
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("incident {id} not found")))
}

/// Id-ordered so that paging never repeats or skips an entry.
pub fn list_incidents(state: &AppState, filter: IncidentFilter, page: Page) -> Vec<Incident> {
    let mut incidents: Vec<Incident> = state
        .incidents
        .iter()
        .filter(|entry| filter.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    incidents.sort_by_key(|incident| incident.id);

    page.apply(incidents)
}

/// Validates a pending incident and hands the zone's unrouted batch to the
/// route builder. Either the incident ends `validada` (bound to the new route
/// when one was produced) or it stays `pendiente` and nothing changes.
pub async fn validate_incident(state: &AppState, id: u64) -> Result<ValidationOutcome, AppError> {
    let zone = get_incident(state, id)?.zone;
    let _zone_guard = state.zone_locks.for_zone(zone).lock().await;

    let result = validate_locked(state, id, zone).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .incident_validations_total
        .with_label_values(&[outcome])
        .inc();

    if let Err(err) = &result {
        warn!(incident_id = id, zone = %zone, error = %err, "incident validation failed");
    }

    result
}

async fn validate_locked(
    state: &AppState,
    id: u64,
    zone: Zone,
) -> Result<ValidationOutcome, AppError> {
    let incident = get_incident(state, id)?;
    if incident.status != IncidentStatus::Pending {
        return Err(AppError::InvalidState(format!(
            "incident {id} is {}, only pendiente incidents can be validated",
            incident.status
        )));
    }

    let mut batch = unrouted_in_zone(state, zone);
    let mut candidate = incident.clone();
    candidate.status = IncidentStatus::Validated;
    batch.push(candidate);

    // Assignment and cancellation take this zone's lock, so `planned` holds
    // until the commit below.
    let planned = planned_in_zone(state, zone);
    let held = held_by(state, &planned);
    let pool = severity_sum(batch.iter().chain(&held)).ok_or_else(|| {
        AppError::Validation(format!("severity pool of zone {zone} overflows"))
    })?;
    let threshold = state.config.route_severity_threshold;
    let recalculate =
        !planned.is_empty() && needs_recalculation(incident.severity, pool, threshold);
    if recalculate {
        batch.extend(held);
    }
    batch.sort_by_key(|incident| incident.id);

    let plan = run_builder(state, zone, &batch).await?;
    if let Some(plan) = &plan {
        verify_plan(&batch, plan)?;
    }

    // Commit. Nothing below awaits or fails.
    let now = Utc::now();

    if let Some(mut entry) = state.incidents.get_mut(&id) {
        entry.status = IncidentStatus::Validated;
        entry.updated_at = now;
    }

    let mut replaced_route_ids = Vec::new();
    let route_id = plan.map(|plan| {
        let route = routes::materialize(state, zone, &batch, plan, now);
        let route_id = route.id;
        let total_severity = route.total_severity;
        let trucks_used = route.trucks_used;

        if recalculate {
            replaced_route_ids = routes::supersede_routes(state, &planned, route_id, now);
        }
        state.routes.insert(route_id, route);

        for member in &batch {
            if let Some(mut entry) = state.incidents.get_mut(&member.id) {
                entry.route_id = Some(route_id);
                entry.updated_at = now;
            }
        }

        state
            .metrics
            .routes_generated_total
            .with_label_values(&[zone.as_str()])
            .inc();
        state.publish(DispatchEvent::RouteGenerated {
            route_id,
            zone,
            total_severity,
            trucks_used,
            incidents: batch.len(),
            replaced_routes: replaced_route_ids.clone(),
            at: now,
        });

        info!(
            route_id,
            zone = %zone,
            incidents = batch.len(),
            total_severity,
            trucks_used,
            replaced_routes = ?replaced_route_ids,
            "route generated"
        );

        route_id
    });

    if incident.severity >= CRITICAL_SEVERITY {
        state.publish(DispatchEvent::CriticalIncident {
            incident_id: id,
            zone,
            severity: incident.severity,
            at: now,
        });
    }

    info!(incident_id = id, zone = %zone, route_id = ?route_id, "incident validated");

    Ok(ValidationOutcome {
        incident_id: id,
        status: IncidentStatus::Validated,
        route_id,
        replaced_route_ids,
    })
}

fn needs_recalculation(severity: u32, pool: u32, threshold: u32) -> bool {
    severity >= CRITICAL_SEVERITY
        || u64::from(pool) * RECALCULATION_DENOMINATOR
            > u64::from(threshold) * RECALCULATION_NUMERATOR
}

/// Ids of the zone's `planeada` routes, oldest first.
fn planned_in_zone(state: &AppState, zone: Zone) -> Vec<u64> {
    let mut ids: Vec<u64> = state
        .routes
        .iter()
        .filter(|entry| entry.zone == zone && entry.status == RouteStatus::Planned)
        .map(|entry| entry.id)
        .collect();
    ids.sort_unstable();
    ids
}

fn held_by(state: &AppState, route_ids: &[u64]) -> Vec<Incident> {
    state
        .incidents
        .iter()
        .filter(|entry| {
            entry.status == IncidentStatus::Validated
                && entry.route_id.is_some_and(|route_id| route_ids.contains(&route_id))
        })
        .map(|entry| entry.value().clone())
        .collect()
}

async fn run_builder(
    state: &AppState,
    zone: Zone,
    batch: &[Incident],
) -> Result<Option<RoutePlan>, AppError> {
    let bound = state.config.builder_timeout;
    let start = Instant::now();

    let result = timeout(bound, state.builder.build(zone, batch)).await;

    let outcome = match &result {
        Err(_) => "timeout",
        Ok(Err(_)) => "error",
        Ok(Ok(_)) => "success",
    };
    state
        .metrics
        .route_builder_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Err(_) => Err(AppError::BuilderTimeout(bound.as_millis() as u64)),
        Ok(Err(err)) => Err(AppError::RouteBuild(err.to_string())),
        Ok(Ok(plan)) => Ok(plan),
    }
}

pub async fn reject_incident(
    state: &AppState,
    id: u64,
    reason: Option<String>,
) -> Result<Incident, AppError> {
    let zone = get_incident(state, id)?.zone;
    let _zone_guard = state.zone_locks.for_zone(zone).lock().await;

    let incident = {
        let mut entry = state
            .incidents
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("incident {id} not found")))?;

        if !entry.status.can_transition_to(IncidentStatus::Cancelled) {
            return Err(AppError::InvalidState(format!(
                "incident {id} is {}, only pendiente incidents can be rejected",
                entry.status
            )));
        }

        entry.status = IncidentStatus::Cancelled;
        entry.rejection_reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());
        entry.updated_at = Utc::now();
        entry.clone()
    };

    info!(incident_id = id, zone = %zone, "incident rejected");

    Ok(incident)
}

pub fn incident_stats(state: &AppState) -> IncidentStats {
    let mut by_status: BTreeMap<&'static str, usize> = IncidentStatus::ALL
        .iter()
        .map(|status| (status.as_str(), 0))
        .collect();
    let mut by_kind: BTreeMap<&'static str, usize> = IncidentKind::ALL
        .iter()
        .map(|kind| (kind.as_str(), 0))
        .collect();
    let mut by_zone: BTreeMap<&'static str, usize> =
        Zone::ALL.iter().map(|zone| (zone.as_str(), 0)).collect();

    let mut total = 0;
    for entry in state.incidents.iter() {
        total += 1;
        *by_status.entry(entry.status.as_str()).or_default() += 1;
        *by_kind.entry(entry.kind.as_str()).or_default() += 1;
        *by_zone.entry(entry.zone.as_str()).or_default() += 1;
    }

    IncidentStats {
        total,
        by_status,
        by_kind,
        by_zone,
    }
}

pub fn zone_backlog(state: &AppState, zone: Zone) -> ZoneBacklog {
    let unrouted = unrouted_in_zone(state, zone);
    let severity_sum = severity_sum(&unrouted).unwrap_or(u32::MAX);
    let threshold = state.config.route_severity_threshold;

    ZoneBacklog {
        zone,
        severity_sum,
        threshold,
        would_generate_route: severity_sum > threshold,
        unrouted_incidents: unrouted.len(),
    }
}

fn unrouted_in_zone(state: &AppState, zone: Zone) -> Vec<Incident> {
    state
        .incidents
        .iter()
        .filter(|entry| entry.zone == zone && entry.is_unrouted())
        .map(|entry| entry.value().clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{
        get_incident, list_incidents, reject_incident, report_incident, validate_incident,
        zone_backlog, IncidentFilter, NewIncident,
    };
    use crate::config::Config;
    use crate::engine::assignment::{create_assignment, AssignmentRequest};
    use crate::engine::builder::{BuildError, PlannedStop, RouteBuilder, RoutePlan};
    use crate::engine::registry::{register_driver, NewDriver};
    use crate::engine::Page;
    use crate::error::AppError;
    use crate::models::driver::LicenseClass;
    use crate::models::incident::{GeoPoint, Incident, IncidentKind, IncidentStatus};
    use crate::models::route::{RouteStatus, StopKind};
    use crate::models::zone::Zone;
    use crate::state::AppState;

    fn state_with_threshold(threshold: u32) -> AppState {
        let config = Config {
            route_severity_threshold: threshold,
            ..Config::default()
        };
        AppState::new(config)
    }

    fn report(state: &AppState, zone: Zone, severity: u32) -> Incident {
        report_incident(
            state,
            NewIncident {
                kind: IncidentKind::CriticalZone,
                severity: Some(severity),
                zone: Some(zone),
                location: None,
                photo_url: None,
                description: None,
            },
        )
        .unwrap()
    }

    struct SlowBuilder;

    #[async_trait]
    impl RouteBuilder for SlowBuilder {
        async fn build(
            &self,
            _zone: Zone,
            _incidents: &[Incident],
        ) -> Result<Option<RoutePlan>, BuildError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    struct OfflineBuilder;

    #[async_trait]
    impl RouteBuilder for OfflineBuilder {
        async fn build(
            &self,
            _zone: Zone,
            _incidents: &[Incident],
        ) -> Result<Option<RoutePlan>, BuildError> {
            Err(BuildError::Unavailable("solver down".to_string()))
        }
    }

    /// Always leaves the last incident out of the plan.
    struct LossyBuilder;

    #[async_trait]
    impl RouteBuilder for LossyBuilder {
        async fn build(
            &self,
            _zone: Zone,
            incidents: &[Incident],
        ) -> Result<Option<RoutePlan>, BuildError> {
            let depot = GeoPoint {
                lat: -0.9344,
                lon: -78.6156,
            };
            let mut stops = vec![PlannedStop::depot(depot)];
            stops.extend(
                incidents
                    .iter()
                    .take(incidents.len().saturating_sub(1))
                    .map(PlannedStop::incident),
            );
            stops.push(PlannedStop::depot(depot));

            Ok(Some(RoutePlan {
                stops,
                total_severity: incidents.iter().map(|incident| incident.severity).sum(),
                trucks_used: 1,
                total_distance_meters: 0.0,
                estimated_duration_secs: None,
            }))
        }
    }

    #[test]
    fn report_classifies_zone_from_location() {
        let state = state_with_threshold(20);
        let incident = report_incident(
            &state,
            NewIncident {
                kind: IncidentKind::DeadAnimal,
                severity: None,
                zone: None,
                location: Some(GeoPoint {
                    lat: -0.93,
                    lon: -78.60,
                }),
                photo_url: None,
                description: Some("  perro en la via ".to_string()),
            },
        )
        .unwrap();

        assert_eq!(incident.zone, Zone::Eastern);
        assert_eq!(incident.severity, 5);
        assert_eq!(incident.status, IncidentStatus::Pending);
        assert_eq!(incident.description, "perro en la via");
        assert!(incident.attention_deadline > incident.reported_at);
    }

    #[test]
    fn report_without_zone_or_location_is_rejected() {
        let state = state_with_threshold(20);
        let err = report_incident(
            &state,
            NewIncident {
                kind: IncidentKind::CollectionPoint,
                severity: None,
                zone: None,
                location: None,
                photo_url: None,
                description: None,
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn three_validations_in_one_zone_form_one_route() {
        let state = state_with_threshold(7);
        let incidents: Vec<Incident> = [2, 5, 1]
            .into_iter()
            .map(|severity| report(&state, Zone::Eastern, severity))
            .collect();

        let first = validate_incident(&state, incidents[0].id).await.unwrap();
        let second = validate_incident(&state, incidents[1].id).await.unwrap();
        assert!(first.route_id.is_none());
        assert!(second.route_id.is_none());

        let third = validate_incident(&state, incidents[2].id).await.unwrap();
        let route_id = third.route_id.expect("route generated on third validation");

        let route = state.routes.get(&route_id).unwrap().clone();
        assert_eq!(route.total_severity, 8);
        assert_eq!(route.stops.len(), 5);
        assert_eq!(route.stops.first().unwrap().kind, StopKind::Depot);
        assert_eq!(route.stops.last().unwrap().kind, StopKind::Depot);
        assert_eq!(route.incident_ids().count(), 3);

        for incident in &incidents {
            let stored = get_incident(&state, incident.id).unwrap();
            assert_eq!(stored.status, IncidentStatus::Validated);
            assert_eq!(stored.route_id, Some(route_id));
        }
    }

    #[tokio::test]
    async fn validated_incident_cannot_be_validated_or_rejected_again() {
        let state = state_with_threshold(20);
        let incident = report(&state, Zone::Western, 3);

        validate_incident(&state, incident.id).await.unwrap();

        let again = validate_incident(&state, incident.id).await.unwrap_err();
        assert!(matches!(again, AppError::InvalidState(_)));

        let reject = reject_incident(&state, incident.id, None).await.unwrap_err();
        assert!(matches!(reject, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn reject_twice_fails_the_second_time() {
        let state = state_with_threshold(20);
        let incident = report(&state, Zone::Western, 1);

        let rejected = reject_incident(&state, incident.id, Some("duplicado".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, IncidentStatus::Cancelled);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("duplicado"));

        let err = reject_incident(&state, incident.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn unknown_incident_is_not_found() {
        let state = state_with_threshold(20);
        assert!(matches!(
            validate_incident(&state, 404).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            reject_incident(&state, 404, None).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn builder_timeout_leaves_incident_pending() {
        let config = Config {
            builder_timeout: Duration::from_millis(20),
            ..Config::default()
        };
        let state = AppState::with_builder(config, Arc::new(SlowBuilder));
        let incident = report(&state, Zone::Eastern, 5);

        let err = validate_incident(&state, incident.id).await.unwrap_err();
        assert!(matches!(err, AppError::BuilderTimeout(20)));

        let stored = get_incident(&state, incident.id).unwrap();
        assert_eq!(stored.status, IncidentStatus::Pending);
        assert!(stored.route_id.is_none());
    }

    #[tokio::test]
    async fn plan_dropping_an_incident_rolls_back() {
        let state = AppState::with_builder(Config::default(), Arc::new(LossyBuilder));
        let incident = report(&state, Zone::Eastern, 3);

        let err = validate_incident(&state, incident.id).await.unwrap_err();
        assert!(matches!(err, AppError::RouteBuild(_)));

        assert_eq!(
            get_incident(&state, incident.id).unwrap().status,
            IncidentStatus::Pending
        );
        assert!(state.routes.is_empty());
    }

    #[tokio::test]
    async fn listing_filters_combine_with_and() {
        let state = state_with_threshold(20);
        let east = report(&state, Zone::Eastern, 1);
        let west = report(&state, Zone::Western, 1);
        report(&state, Zone::Western, 1);
        validate_incident(&state, west.id).await.unwrap();

        let all = list_incidents(&state, IncidentFilter::default(), Page::default());
        assert_eq!(all.len(), 3);

        let western_validated = list_incidents(
            &state,
            IncidentFilter {
                status: Some(IncidentStatus::Validated),
                zone: Some(Zone::Western),
            },
            Page::default(),
        );
        assert_eq!(western_validated.len(), 1);
        assert_eq!(western_validated[0].id, west.id);

        let pending = list_incidents(
            &state,
            IncidentFilter {
                status: Some(IncidentStatus::Pending),
                zone: None,
            },
            Page::default(),
        );
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, east.id);
    }

    #[tokio::test]
    async fn pages_do_not_overlap() {
        let state = state_with_threshold(20);
        for _ in 0..5 {
            report(&state, Zone::Eastern, 1);
        }

        let first = list_incidents(&state, IncidentFilter::default(), Page::new(Some(0), Some(3)));
        let second =
            list_incidents(&state, IncidentFilter::default(), Page::new(Some(3), Some(3)));

        let mut ids: Vec<u64> = first.iter().chain(&second).map(|incident| incident.id).collect();
        ids.dedup();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn backlog_reports_unrouted_severity() {
        let state = state_with_threshold(20);
        let incident = report(&state, Zone::Eastern, 5);
        validate_incident(&state, incident.id).await.unwrap();

        let backlog = zone_backlog(&state, Zone::Eastern);
        assert_eq!(backlog.severity_sum, 5);
        assert_eq!(backlog.unrouted_incidents, 1);
        assert!(!backlog.would_generate_route);
    }

    #[test]
    fn severity_outside_one_to_five_is_rejected() {
        let state = state_with_threshold(20);
        for severity in [0, 6, u32::MAX] {
            let err = report_incident(
                &state,
                NewIncident {
                    kind: IncidentKind::CollectionPoint,
                    severity: Some(severity),
                    zone: Some(Zone::Eastern),
                    location: None,
                    photo_url: None,
                    description: None,
                },
            )
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "severity {severity}");
        }
        assert!(state.incidents.is_empty());
    }

    #[tokio::test]
    async fn overflowing_zone_pool_fails_validation_without_side_effects() {
        let state = state_with_threshold(20);
        let mut stored = report(&state, Zone::Eastern, 1);
        stored.id = state.incident_ids.next();
        stored.severity = u32::MAX;
        stored.status = IncidentStatus::Validated;
        state.incidents.insert(stored.id, stored);

        let incident = report(&state, Zone::Eastern, 3);
        let err = validate_incident(&state, incident.id).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            get_incident(&state, incident.id).unwrap().status,
            IncidentStatus::Pending
        );
        assert!(state.routes.is_empty());
    }

    #[tokio::test]
    async fn unavailable_builder_is_a_route_build_error() {
        let state = AppState::with_builder(Config::default(), Arc::new(OfflineBuilder));
        let incident = report(&state, Zone::Western, 2);

        let err = validate_incident(&state, incident.id).await.unwrap_err();
        assert!(matches!(&err, AppError::RouteBuild(detail) if detail.contains("solver down")));
        assert_eq!(
            get_incident(&state, incident.id).unwrap().status,
            IncidentStatus::Pending
        );
    }

    #[tokio::test]
    async fn critical_incident_recalculates_the_planned_route() {
        let state = state_with_threshold(6);
        let first = report(&state, Zone::Eastern, 4);
        let second = report(&state, Zone::Eastern, 3);
        validate_incident(&state, first.id).await.unwrap();
        let old_route = validate_incident(&state, second.id)
            .await
            .unwrap()
            .route_id
            .unwrap();

        let critical = report(&state, Zone::Eastern, 5);
        let outcome = validate_incident(&state, critical.id).await.unwrap();
        let new_route = outcome.route_id.expect("recalculated route");
        assert_eq!(outcome.replaced_route_ids, vec![old_route]);

        let old = state.routes.get(&old_route).unwrap().clone();
        assert_eq!(old.status, RouteStatus::Cancelled);
        assert_eq!(old.replaced_by, Some(new_route));

        let new = state.routes.get(&new_route).unwrap().clone();
        assert_eq!(new.status, RouteStatus::Planned);
        assert_eq!(new.total_severity, 12);
        let mut ids: Vec<u64> = new.incident_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![first.id, second.id, critical.id]);

        for id in ids {
            assert_eq!(get_incident(&state, id).unwrap().route_id, Some(new_route));
        }
    }

    #[tokio::test]
    async fn pool_must_pass_one_and_a_half_thresholds_to_recalculate() {
        let state = state_with_threshold(10);
        for severity in [4, 4] {
            let incident = report(&state, Zone::Western, severity);
            validate_incident(&state, incident.id).await.unwrap();
        }
        let last = report(&state, Zone::Western, 3);
        let old_route = validate_incident(&state, last.id).await.unwrap().route_id.unwrap();

        // 11 planned + 2 = 13, not above 15.
        let small = report(&state, Zone::Western, 2);
        let outcome = validate_incident(&state, small.id).await.unwrap();
        assert!(outcome.route_id.is_none());
        assert!(outcome.replaced_route_ids.is_empty());
        assert_eq!(
            state.routes.get(&old_route).unwrap().status,
            RouteStatus::Planned
        );

        // 11 planned + 2 + 3 = 16.
        let tipping = report(&state, Zone::Western, 3);
        let outcome = validate_incident(&state, tipping.id).await.unwrap();
        let new_route = outcome.route_id.unwrap();
        assert_eq!(outcome.replaced_route_ids, vec![old_route]);
        assert_eq!(state.routes.get(&new_route).unwrap().total_severity, 16);
        assert_eq!(
            get_incident(&state, small.id).unwrap().route_id,
            Some(new_route)
        );
    }

    #[tokio::test]
    async fn assigned_routes_are_never_recalculated() {
        let state = state_with_threshold(0);
        let first = report(&state, Zone::Eastern, 5);
        let assigned = validate_incident(&state, first.id).await.unwrap().route_id.unwrap();

        let driver = register_driver(
            &state,
            NewDriver {
                national_id: "0102030405".to_string(),
                full_name: "Maria Lopez Vega".to_string(),
                phone: None,
                license_class: LicenseClass::D,
                preferred_zone: None,
            },
        )
        .unwrap();
        create_assignment(
            &state,
            AssignmentRequest {
                route_id: assigned,
                driver_id: driver.id,
                truck_id: "T-1".to_string(),
                truck_type: "posterior".to_string(),
                start_time: None,
            },
        )
        .await
        .unwrap();

        let second = report(&state, Zone::Eastern, 5);
        let outcome = validate_incident(&state, second.id).await.unwrap();
        assert!(outcome.replaced_route_ids.is_empty());
        assert_ne!(outcome.route_id, Some(assigned));

        let route = state.routes.get(&assigned).unwrap().clone();
        assert_eq!(route.status, RouteStatus::Assigned);
        assert!(route.replaced_by.is_none());
        assert_eq!(get_incident(&state, first.id).unwrap().route_id, Some(assigned));
    }
}
