//! Route Builder seam.
//!
//! The builder turns a zone's batch of validated, unrouted incidents into at
//! most one route plan. The batch policy and the ordering method belong to
//! the builder; the core only checks that what comes back honours the
//! aggregation contract (see [`verify_plan`]).

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::incident::{severity_sum, GeoPoint, Incident};
use crate::models::route::StopKind;
use crate::models::zone::Zone;

const REAR_LOADER_CAPACITY: u32 = 25;
const SIDE_LOADER_CAPACITY: u32 = 15;

const TRAVEL_SPEED_M_PER_S: f64 = 25_000.0 / 3_600.0;
const DEPOT_SERVICE_SECS: u64 = 5 * 60;
const INCIDENT_SERVICE_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStop {
    pub kind: StopKind,
    pub incident_id: Option<u64>,
    pub location: Option<GeoPoint>,
}

impl PlannedStop {
    pub fn depot(location: GeoPoint) -> Self {
        Self {
            kind: StopKind::Depot,
            incident_id: None,
            location: Some(location),
        }
    }

    pub fn incident(incident: &Incident) -> Self {
        Self {
            kind: StopKind::Incident,
            incident_id: Some(incident.id),
            location: incident.location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub stops: Vec<PlannedStop>,
    pub total_severity: u32,
    pub trucks_used: u32,
    pub total_distance_meters: f64,
    pub estimated_duration_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("incident {incident_id} cannot be routed: {reason}")]
    Unroutable { incident_id: u64, reason: String },

    #[error("batch severity does not fit in u32")]
    SeverityOverflow,

    #[error("builder unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RouteBuilder: Send + Sync {
    /// `Ok(None)` defers aggregation; the incidents stay unrouted.
    async fn build(
        &self,
        zone: Zone,
        incidents: &[Incident],
    ) -> Result<Option<RoutePlan>, BuildError>;
}

/// In-process builder: severity threshold batching, nearest-neighbour stop
/// order from the depot, first-fit truck planning.
#[derive(Debug, Clone)]
pub struct NearestNeighborBuilder {
    depot: GeoPoint,
    severity_threshold: u32,
}

impl NearestNeighborBuilder {
    pub fn new(depot: GeoPoint, severity_threshold: u32) -> Self {
        Self {
            depot,
            severity_threshold,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.depot, config.route_severity_threshold)
    }

    fn order_stops(&self, incidents: &[Incident]) -> Vec<PlannedStop> {
        let mut located: Vec<&Incident> = incidents
            .iter()
            .filter(|incident| incident.location.is_some())
            .collect();
        let mut unlocated: Vec<&Incident> = incidents
            .iter()
            .filter(|incident| incident.location.is_none())
            .collect();
        unlocated.sort_by_key(|incident| incident.id);

        let mut stops = Vec::with_capacity(incidents.len() + 2);
        stops.push(PlannedStop::depot(self.depot));

        let mut cursor = self.depot;
        while !located.is_empty() {
            let (nearest_idx, _) = located
                .iter()
                .enumerate()
                .filter_map(|(idx, incident)| {
                    incident
                        .location
                        .map(|location| (idx, haversine_m(&cursor, &location)))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));

            let next = located.remove(nearest_idx);
            if let Some(location) = next.location {
                cursor = location;
            }
            stops.push(PlannedStop::incident(next));
        }

        stops.extend(unlocated.into_iter().map(PlannedStop::incident));
        stops.push(PlannedStop::depot(self.depot));
        stops
    }
}

#[async_trait]
impl RouteBuilder for NearestNeighborBuilder {
    async fn build(
        &self,
        _zone: Zone,
        incidents: &[Incident],
    ) -> Result<Option<RoutePlan>, BuildError> {
        let total_severity = severity_sum(incidents).ok_or(BuildError::SeverityOverflow)?;
        if incidents.is_empty() || total_severity <= self.severity_threshold {
            return Ok(None);
        }

        if let Some(incident) = incidents.iter().find(|incident| incident.severity == 0) {
            return Err(BuildError::Unroutable {
                incident_id: incident.id,
                reason: "severity must be positive".to_string(),
            });
        }

        let stops = self.order_stops(incidents);
        let total_distance_meters = path_length_m(&stops);
        let travel_secs = (total_distance_meters / TRAVEL_SPEED_M_PER_S).round() as u64;
        let estimated_duration_secs =
            travel_secs + DEPOT_SERVICE_SECS + INCIDENT_SERVICE_SECS * incidents.len() as u64;

        Ok(Some(RoutePlan {
            stops,
            total_severity,
            trucks_used: plan_trucks(incidents),
            total_distance_meters,
            estimated_duration_secs: Some(estimated_duration_secs),
        }))
    }
}

/// Summed leg length between consecutive stops that have a location.
pub fn path_length_m(stops: &[PlannedStop]) -> f64 {
    let located: Vec<GeoPoint> = stops.iter().filter_map(|stop| stop.location).collect();
    located
        .windows(2)
        .map(|leg| haversine_m(&leg[0], &leg[1]))
        .sum()
}

/// First-fit by descending severity: one rear loader, then side loaders.
pub fn plan_trucks(incidents: &[Incident]) -> u32 {
    let mut severities: Vec<u32> = incidents.iter().map(|incident| incident.severity).collect();
    severities.sort_unstable_by(|a, b| b.cmp(a));

    // (capacity, load)
    let mut trucks: Vec<(u32, u32)> = Vec::new();
    for severity in severities {
        match trucks
            .iter_mut()
            .find(|(capacity, load)| load.saturating_add(severity) <= *capacity)
        {
            Some((_, load)) => *load += severity,
            None => {
                let capacity = if trucks.is_empty() {
                    REAR_LOADER_CAPACITY
                } else {
                    SIDE_LOADER_CAPACITY
                };
                trucks.push((capacity, severity));
            }
        }
    }

    trucks.len() as u32
}

/// Checks a plan against the aggregation contract for `incidents`.
pub fn verify_plan(incidents: &[Incident], plan: &RoutePlan) -> Result<(), AppError> {
    let starts_at_depot = plan
        .stops
        .first()
        .is_some_and(|stop| stop.kind == StopKind::Depot);
    let ends_at_depot = plan.stops.len() >= 2
        && plan
            .stops
            .last()
            .is_some_and(|stop| stop.kind == StopKind::Depot);
    if !starts_at_depot || !ends_at_depot {
        return Err(AppError::RouteBuild(
            "plan must start and end at the depot".to_string(),
        ));
    }

    let mut visits: HashMap<u64, usize> = incidents.iter().map(|incident| (incident.id, 0)).collect();
    for stop in &plan.stops {
        match (stop.kind, stop.incident_id) {
            (StopKind::Depot, None) => {}
            (StopKind::Incident, Some(id)) => match visits.get_mut(&id) {
                Some(count) => *count += 1,
                None => {
                    return Err(AppError::RouteBuild(format!(
                        "plan visits incident {id} which is not in the batch"
                    )));
                }
            },
            _ => {
                return Err(AppError::RouteBuild(
                    "stop kind does not match its incident reference".to_string(),
                ));
            }
        }
    }

    let mut misvisited: Vec<u64> = visits
        .into_iter()
        .filter(|(_, count)| *count != 1)
        .map(|(id, _)| id)
        .collect();
    if !misvisited.is_empty() {
        misvisited.sort_unstable();
        return Err(AppError::RouteBuild(format!(
            "plan must visit every incident exactly once; offending ids {misvisited:?}"
        )));
    }

    let expected = severity_sum(incidents)
        .ok_or_else(|| AppError::RouteBuild("batch severity overflows".to_string()))?;
    if plan.total_severity != expected {
        return Err(AppError::RouteBuild(format!(
            "plan severity {} does not match batch severity {expected}",
            plan.total_severity
        )));
    }

    if plan.trucks_used == 0 {
        return Err(AppError::RouteBuild("plan must use at least one truck".to_string()));
    }

    Ok(())
}
