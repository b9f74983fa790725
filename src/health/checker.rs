use super::{ActiveHealthState, HealthStatus};
use crate::config::HealthCheckConfig;
use crate::metrics::Metrics;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically probes one destination and drives its `HealthStatus`
pub struct HealthChecker {
    config: HealthCheckConfig,
    cluster: String,
    destination: String,
    address: String,
    status: Arc<HealthStatus>,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        cluster: String,
        destination: String,
        address: String,
        status: Arc<HealthStatus>,
    ) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .build(HttpConnector::new());

        Self {
            config,
            cluster,
            destination,
            address,
            status,
            client,
        }
    }

    pub async fn start(self) {
        let check_timeout = self.config.timeout.as_std();
        let mut ticker = interval(self.config.interval.as_std());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let outcome = match timeout(check_timeout, self.perform_http_check()).await {
                Ok(result) => result,
                Err(_) => Err("timeout".to_string()),
            };

            let transition = match &outcome {
                Ok(()) => self.status.record_success(self.config.healthy_threshold),
                Err(_) => self.status.record_failure(self.config.unhealthy_threshold),
            };

            match transition {
                Some(ActiveHealthState::Healthy) => {
                    info!("Destination '{}' ({}) is now healthy", self.destination, self.address);
                }
                Some(state) => {
                    warn!(
                        "Destination '{}' ({}) is now {}: {}",
                        self.destination,
                        self.address,
                        state,
                        outcome.as_ref().err().map(String::as_str).unwrap_or("-")
                    );
                }
                None => {
                    if let Err(e) = &outcome {
                        debug!("Health check for '{}' failed: {}", self.destination, e);
                    }
                }
            }

            Metrics::set_destination_health(&self.cluster, &self.destination, self.status.state());
        }
    }

    fn check_uri(&self) -> Result<Uri, String> {
        let url = format!("{}{}", self.address.trim_end_matches('/'), self.config.path);
        url.parse().map_err(|e| format!("invalid health check URL '{}': {}", url, e))
    }

    async fn perform_http_check(&self) -> Result<(), String> {
        let req = Request::get(self.check_uri()?)
            .header("user-agent", "readygate-health-checker/1.0")
            .body(Empty::<Bytes>::new())
            .map_err(|e| format!("failed to build request: {}", e))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected status {}", status))
        }
    }
}
