//! Cluster topology and the health view the gates read from it.

mod manager;

pub use manager::{ClusterManager, ClusterState, DestinationState};

use crate::config::Config;
use crate::health::ActiveHealthState;
use arc_swap::ArcSwap;

/// Snapshot of one destination, taken at lookup time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationHealthView {
    pub id: String,
    pub address: String,
    pub health: ActiveHealthState,
}

/// Snapshot of a cluster's destinations in their configured order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHealthView {
    pub id: String,
    pub destinations: Vec<DestinationHealthView>,
}

impl ClusterHealthView {
    /// Health of the first destination. Only the first one is consulted;
    /// `None` when the cluster has no destinations.
    pub fn first_health(&self) -> Option<ActiveHealthState> {
        self.destinations.first().map(|d| d.health)
    }
}

/// Read access to cluster health, owned by the health prober
pub trait HealthLookup: Send + Sync {
    fn try_get_cluster(&self, cluster_id: &str) -> Option<ClusterHealthView>;
}

/// Resolves a destination's base address from the routing configuration
pub trait DestinationResolver: Send + Sync {
    fn destination_address(&self, cluster_id: &str, destination_id: &str) -> Option<String>;
}

/// Health of the first destination of `cluster_id`, or `None` when the
/// cluster is unknown or empty.
pub fn first_destination_health(
    lookup: &dyn HealthLookup,
    cluster_id: &str,
) -> Option<ActiveHealthState> {
    lookup.try_get_cluster(cluster_id)?.first_health()
}

impl HealthLookup for ArcSwap<ClusterManager> {
    fn try_get_cluster(&self, cluster_id: &str) -> Option<ClusterHealthView> {
        self.load().try_get_cluster(cluster_id)
    }
}

impl DestinationResolver for ArcSwap<Config> {
    fn destination_address(&self, cluster_id: &str, destination_id: &str) -> Option<String> {
        self.load()
            .destination_address(cluster_id, destination_id)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(states: &[ActiveHealthState]) -> ClusterHealthView {
        ClusterHealthView {
            id: "backend".into(),
            destinations: states
                .iter()
                .enumerate()
                .map(|(i, s)| DestinationHealthView {
                    id: format!("backend/d{}", i + 1),
                    address: format!("http://10.0.0.{}:8082", i + 1),
                    health: *s,
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_health_uses_first_destination_only() {
        let v = view(&[ActiveHealthState::Unhealthy, ActiveHealthState::Healthy]);
        assert_eq!(v.first_health(), Some(ActiveHealthState::Unhealthy));
    }

    #[test]
    fn test_first_health_empty_cluster() {
        assert_eq!(view(&[]).first_health(), None);
    }
}
