use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_transitions_total: IntCounterVec,
    pub order_transition_latency_seconds: HistogramVec,
    pub registry_sync_failures_total: IntCounterVec,
    pub reconciliation_repairs_total: IntCounterVec,
    pub open_orders: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let order_transition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "order_transition_latency_seconds",
                "Latency of order lifecycle operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid order_transition_latency_seconds metric");

        let registry_sync_failures_total = IntCounterVec::new(
            Opts::new(
                "registry_sync_failures_total",
                "Registry updates that failed after the order was committed",
            ),
            &["registry"],
        )
        .expect("valid registry_sync_failures_total metric");

        let reconciliation_repairs_total = IntCounterVec::new(
            Opts::new(
                "reconciliation_repairs_total",
                "Registry entries corrected by the reconciliation sweep",
            ),
            &["registry"],
        )
        .expect("valid reconciliation_repairs_total metric");

        let open_orders = IntGauge::new("open_orders", "Orders not yet complete or cancelled")
            .expect("valid open_orders metric");

        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(order_transition_latency_seconds.clone()))
            .expect("register order_transition_latency_seconds");
        registry
            .register(Box::new(registry_sync_failures_total.clone()))
            .expect("register registry_sync_failures_total");
        registry
            .register(Box::new(reconciliation_repairs_total.clone()))
            .expect("register reconciliation_repairs_total");
        registry
            .register(Box::new(open_orders.clone()))
            .expect("register open_orders");

        Self {
            registry,
            order_transitions_total,
            order_transition_latency_seconds,
            registry_sync_failures_total,
            reconciliation_repairs_total,
            open_orders,
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
