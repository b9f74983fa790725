use crate::health::ActiveHealthState;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(
        "gate_verdicts_total",
        "Verdicts produced by readiness gates"
    );
    describe_counter!(
        "install_probes_total",
        "Installation status probes sent to the backend"
    );
    describe_counter!(
        "install_cache_hits_total",
        "Installation state lookups answered from cache"
    );
    describe_gauge!(
        "destination_health",
        "Destination health (1=healthy, 0=unhealthy, -1=unknown)"
    );
    describe_counter!("http_requests_total", "Total number of forwarded HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "Forwarded request duration in seconds"
    );
}

/// Start Prometheus metrics server on given address
pub fn start_metrics_server(addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: std::net::SocketAddr = addr.parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    init_metrics();

    Ok(())
}

pub struct Metrics;

impl Metrics {
    #[inline]
    pub fn record_verdict(gate: &'static str, verdict: &'static str) {
        counter!("gate_verdicts_total", "gate" => gate, "verdict" => verdict).increment(1);
    }

    #[inline]
    pub fn record_install_probe(outcome: &'static str) {
        counter!("install_probes_total", "outcome" => outcome).increment(1);
    }

    #[inline]
    pub fn record_install_cache_hit() {
        counter!("install_cache_hits_total").increment(1);
    }

    pub fn set_destination_health(cluster: &str, destination: &str, state: ActiveHealthState) {
        let labels = [
            ("cluster", cluster.to_string()),
            ("destination", destination.to_string()),
        ];
        let value = match state {
            ActiveHealthState::Healthy => 1.0,
            ActiveHealthState::Unhealthy => 0.0,
            ActiveHealthState::Unknown => -1.0,
        };
        gauge!("destination_health", &labels).set(value);
    }

    #[inline]
    pub fn record_request(cluster: &str, status: u16, duration: Duration) {
        let labels = [
            ("cluster", cluster.to_string()),
            ("status", status.to_string()),
        ];

        counter!("http_requests_total", &labels).increment(1);
        histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
    }
}
