use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};

use crate::config::Config;
use crate::engine::builder::{NearestNeighborBuilder, RouteBuilder};
use crate::models::assignment::Assignment;
use crate::models::driver::{Driver, Truck};
use crate::models::event::DispatchEvent;
use crate::models::incident::Incident;
use crate::models::route::Route;
use crate::models::zone::Zone;
use crate::observability::metrics::Metrics;

/// Monotonic id allocator starting at 1.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One lock per zone guarding its unrouted incidents and planned routes.
#[derive(Debug, Default)]
pub struct ZoneLocks {
    eastern: Mutex<()>,
    western: Mutex<()>,
}

impl ZoneLocks {
    pub fn for_zone(&self, zone: Zone) -> &Mutex<()> {
        match zone {
            Zone::Eastern => &self.eastern,
            Zone::Western => &self.western,
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub incidents: DashMap<u64, Incident>,
    pub routes: DashMap<u64, Route>,
    pub drivers: DashMap<u64, Driver>,
    /// National id to driver id.
    pub national_ids: DashMap<String, u64>,
    pub trucks: DashMap<String, Truck>,
    pub assignments: DashMap<u64, Assignment>,
    pub incident_ids: IdSequence,
    pub route_ids: IdSequence,
    pub driver_ids: IdSequence,
    pub assignment_ids: IdSequence,
    pub zone_locks: ZoneLocks,
    /// Serialises assignment creation/advance, route cancellation and driver
    /// status changes. Taken before any zone lock.
    pub dispatch_lock: Mutex<()>,
    pub builder: Arc<dyn RouteBuilder>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let builder = Arc::new(NearestNeighborBuilder::from_config(&config));
        Self::with_builder(config, builder)
    }

    pub fn with_builder(config: Config, builder: Arc<dyn RouteBuilder>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        Self {
            config,
            incidents: DashMap::new(),
            routes: DashMap::new(),
            drivers: DashMap::new(),
            national_ids: DashMap::new(),
            trucks: DashMap::new(),
            assignments: DashMap::new(),
            incident_ids: IdSequence::default(),
            route_ids: IdSequence::default(),
            driver_ids: IdSequence::default(),
            assignment_ids: IdSequence::default(),
            zone_locks: ZoneLocks::default(),
            dispatch_lock: Mutex::new(()),
            builder,
            events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Fire-and-forget; having no subscribers is not an error.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}
