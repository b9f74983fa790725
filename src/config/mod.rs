pub mod duration;
mod types;
pub mod watcher;

pub use duration::Duration;
pub use types::*;
pub use watcher::{watch_config_async, ConfigWatcher};

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yml::from_str(content).with_context(|| "Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Base address of a destination, as currently configured
    pub fn destination_address(&self, cluster: &str, destination: &str) -> Option<&str> {
        self.clusters
            .get(cluster)?
            .destinations
            .get(destination)
            .map(|d| d.address.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.entrypoints.is_empty() {
            anyhow::bail!("At least one entrypoint must be defined");
        }

        for (name, ep) in &self.entrypoints {
            ep.address
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("Invalid address for entrypoint '{}': {}", name, ep.address))?;
        }

        for (name, cluster) in &self.clusters {
            if cluster.destinations.is_empty() {
                anyhow::bail!("Cluster '{}' must have at least one destination", name);
            }
            for (id, dest) in &cluster.destinations {
                let url = url::Url::parse(&dest.address).with_context(|| {
                    format!("Invalid address for destination '{}' in cluster '{}': {}", id, name, dest.address)
                })?;
                // upstream clients speak plain HTTP only
                if url.scheme() != "http" {
                    anyhow::bail!(
                        "Destination '{}' in cluster '{}' must use http, got '{}'",
                        id,
                        name,
                        url.scheme()
                    );
                }
            }
            if let Some(hc) = &cluster.health_check {
                if !hc.path.starts_with('/') {
                    anyhow::bail!("Health check path for cluster '{}' must start with '/'", name);
                }
                if hc.interval.is_zero() {
                    anyhow::bail!("Health check interval for cluster '{}' must be positive", name);
                }
            }
        }

        for (name, route) in &self.routes {
            if !self.clusters.contains_key(&route.cluster) {
                anyhow::bail!("Route '{}' references non-existent cluster '{}'", name, route.cluster);
            }
            if !route.path_prefix.starts_with('/') {
                anyhow::bail!("Route '{}' path_prefix must start with '/'", name);
            }
        }

        self.validate_gate()
    }

    fn validate_gate(&self) -> Result<()> {
        let gate = &self.gate;

        let paths = [
            ("status_path", &gate.status_path),
            ("wait_path", &gate.wait_path),
            ("home_path", &gate.home_path),
            ("install_path", &gate.install_path),
        ];
        for (field, path) in paths {
            if !path.starts_with('/') {
                anyhow::bail!("gate.{} must start with '/', got '{}'", field, path);
            }
            hyper::header::HeaderValue::from_str(path)
                .with_context(|| format!("gate.{} is not a valid Location value", field))?;
        }
        for prefix in &gate.asset_prefixes {
            if !prefix.starts_with('/') {
                anyhow::bail!("gate.asset_prefixes entries must start with '/', got '{}'", prefix);
            }
        }
        if gate.cache_ttl.is_zero() {
            anyhow::bail!("gate.cache_ttl must be positive");
        }
        if gate.probe_timeout.is_zero() {
            anyhow::bail!("gate.probe_timeout must be positive");
        }

        match self.clusters.get(&gate.cluster) {
            None => warn!(
                "Gated cluster '{}' is not configured; all requests will pass through",
                gate.cluster
            ),
            Some(cluster) => {
                if cluster.health_check.is_none() {
                    warn!(
                        "Gated cluster '{}' has no health_check; its health stays unknown and clients stay in the waiting room",
                        gate.cluster
                    );
                }
                if !cluster.destinations.contains_key(&gate.destination) {
                    warn!(
                        "Gate destination '{}' not found in cluster '{}'; installation probes will fail",
                        gate.destination, gate.cluster
                    );
                }
            }
        }

        Ok(())
    }
}
