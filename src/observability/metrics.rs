use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub incident_validations_total: IntCounterVec,
    pub routes_generated_total: IntCounterVec,
    pub route_builder_latency_seconds: HistogramVec,
    pub assignments_total: IntCounterVec,
    pub open_assignments: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let incident_validations_total = IntCounterVec::new(
            Opts::new(
                "incident_validations_total",
                "Incident validation attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid incident_validations_total metric");

        let routes_generated_total = IntCounterVec::new(
            Opts::new("routes_generated_total", "Routes produced by the builder per zone"),
            &["zone"],
        )
        .expect("valid routes_generated_total metric");

        let route_builder_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "route_builder_latency_seconds",
                "Latency of route builder calls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid route_builder_latency_seconds metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment requests by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let open_assignments =
            IntGauge::new("open_assignments", "Assignments currently assigned or started")
                .expect("valid open_assignments metric");

        registry
            .register(Box::new(incident_validations_total.clone()))
            .expect("register incident_validations_total");
        registry
            .register(Box::new(routes_generated_total.clone()))
            .expect("register routes_generated_total");
        registry
            .register(Box::new(route_builder_latency_seconds.clone()))
            .expect("register route_builder_latency_seconds");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(open_assignments.clone()))
            .expect("register open_assignments");

        Self {
            registry,
            incident_validations_total,
            routes_generated_total,
            route_builder_latency_seconds,
            assignments_total,
            open_assignments,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
