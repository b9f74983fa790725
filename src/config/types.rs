use super::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub entrypoints: HashMap<String, Entrypoint>,

    #[serde(default)]
    pub clusters: HashMap<String, ClusterConfig>,

    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrypoint {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Destinations keyed by id. Iteration order (by id) is the cluster's
    /// destination order, so "backend/d1" sorts ahead of "backend/d2".
    pub destinations: BTreeMap<String, DestinationConfig>,

    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_path")]
    pub path: String,

    #[serde(default = "default_health_interval")]
    pub interval: Duration,

    #[serde(default = "default_health_timeout")]
    pub timeout: Duration,

    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_unhealthy_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_route_prefix")]
    pub path_prefix: String,

    #[serde(default)]
    pub host: Option<String>,

    pub cluster: String,

    #[serde(default)]
    pub priority: i32,
}

fn default_route_prefix() -> String {
    "/".to_string()
}

/// Readiness gate settings. Every field has a default, so an absent `gate`
/// section gates the `backend` cluster with the stock paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_cluster")]
    pub cluster: String,

    /// Destination whose address the installation probe targets
    #[serde(default = "default_gate_destination")]
    pub destination: String,

    #[serde(default = "default_status_path")]
    pub status_path: String,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    #[serde(default = "default_wait_path")]
    pub wait_path: String,

    #[serde(default = "default_home_path")]
    pub home_path: String,

    #[serde(default = "default_install_path")]
    pub install_path: String,

    /// Paths that keep loading while the waiting room is shown
    #[serde(default = "default_asset_prefixes")]
    pub asset_prefixes: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cluster: default_gate_cluster(),
            destination: default_gate_destination(),
            status_path: default_status_path(),
            cache_ttl: default_cache_ttl(),
            probe_timeout: default_probe_timeout(),
            wait_path: default_wait_path(),
            home_path: default_home_path(),
            install_path: default_install_path(),
            asset_prefixes: default_asset_prefixes(),
        }
    }
}

fn default_gate_cluster() -> String {
    "backend".to_string()
}

fn default_gate_destination() -> String {
    "backend/d1".to_string()
}

fn default_status_path() -> String {
    "/api/v1/settings/checkInstalled".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_wait_path() -> String {
    "/wait".to_string()
}

fn default_home_path() -> String {
    "/".to_string()
}

fn default_install_path() -> String {
    "/mnt".to_string()
}

fn default_asset_prefixes() -> Vec<String> {
    vec!["/_next".to_string()]
}
