use super::{ClusterHealthView, DestinationHealthView, HealthLookup};
use crate::config::{ClusterConfig, Config};
use crate::health::{ActiveHealthState, HealthChecker, HealthStatus};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Live topology: every configured cluster with the health of its destinations
pub struct ClusterManager {
    clusters: DashMap<String, ClusterState>,
    checkers: Mutex<Vec<JoinHandle<()>>>,
}

pub struct ClusterState {
    pub config: ClusterConfig,
    pub destinations: Vec<DestinationState>,
    next: AtomicUsize,
}

pub struct DestinationState {
    pub id: String,
    pub address: String,
    pub health: Arc<HealthStatus>,
}

impl ClusterState {
    /// Destinations that keep their id and address keep their health from
    /// `previous`, so a reload does not send everyone back to Unknown.
    /// Without a health check nothing would update carried state, so it
    /// starts over.
    fn new(config: &ClusterConfig, previous: Option<&ClusterState>) -> Self {
        let previous = previous.filter(|_| config.health_check.is_some());
        let destinations = config
            .destinations
            .iter()
            .map(|(id, dest)| {
                let health = previous
                    .and_then(|p| p.destinations.iter().find(|d| &d.id == id && d.address == dest.address))
                    .map(|d| Arc::clone(&d.health))
                    .unwrap_or_else(|| Arc::new(HealthStatus::new()));

                DestinationState {
                    id: id.clone(),
                    address: dest.address.clone(),
                    health,
                }
            })
            .collect();

        Self {
            config: config.clone(),
            destinations,
            next: AtomicUsize::new(0),
        }
    }

    /// Round-robin over destinations not known to be unhealthy
    pub fn pick_destination(&self) -> Option<&DestinationState> {
        let candidates: Vec<&DestinationState> = self
            .destinations
            .iter()
            .filter(|d| d.health.state() != ActiveHealthState::Unhealthy)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx])
    }

    fn view(&self, id: &str) -> ClusterHealthView {
        ClusterHealthView {
            id: id.to_string(),
            destinations: self
                .destinations
                .iter()
                .map(|d| DestinationHealthView {
                    id: d.id.clone(),
                    address: d.address.clone(),
                    health: d.health.state(),
                })
                .collect(),
        }
    }
}

impl ClusterManager {
    pub fn new(config: &Config) -> Self {
        Self::build(config, None)
    }

    /// Topology for a reloaded config, carrying over known health
    pub fn reload(&self, config: &Config) -> Self {
        Self::build(config, Some(self))
    }

    fn build(config: &Config, previous: Option<&ClusterManager>) -> Self {
        let clusters = DashMap::new();

        for (name, cluster_config) in &config.clusters {
            let prev = previous.and_then(|p| p.clusters.get(name));
            let state = ClusterState::new(cluster_config, prev.as_deref());
            drop(prev);
            info!(
                "Registered cluster '{}' with {} destinations",
                name,
                state.destinations.len()
            );
            clusters.insert(name.clone(), state);
        }

        Self {
            clusters,
            checkers: Mutex::new(Vec::new()),
        }
    }

    pub fn get_cluster(
        &self,
        name: &str,
    ) -> Option<dashmap::mapref::one::Ref<'_, String, ClusterState>> {
        self.clusters.get(name)
    }

    /// Spawn one checker per destination of every cluster with a health_check
    pub fn start_health_checks(&self) {
        let mut checkers = self.checkers.lock();

        for entry in self.clusters.iter() {
            let cluster_name = entry.key();
            let cluster = entry.value();

            let Some(health_config) = &cluster.config.health_check else {
                continue;
            };

            for dest in &cluster.destinations {
                let checker = HealthChecker::new(
                    health_config.clone(),
                    cluster_name.clone(),
                    dest.id.clone(),
                    dest.address.clone(),
                    Arc::clone(&dest.health),
                );

                info!(
                    "Starting health checker for cluster '{}' destination '{}' ({})",
                    cluster_name, dest.id, dest.address
                );

                checkers.push(tokio::spawn(checker.start()));
            }
        }
    }

    pub fn stop_health_checks(&self) {
        for handle in self.checkers.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ClusterManager {
    fn drop(&mut self) {
        self.stop_health_checks();
    }
}

impl HealthLookup for ClusterManager {
    fn try_get_cluster(&self, cluster_id: &str) -> Option<ClusterHealthView> {
        self.clusters.get(cluster_id).map(|c| c.view(cluster_id))
    }
}
