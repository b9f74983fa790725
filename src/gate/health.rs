use super::{path_equals, Gate, GatePaths, GateRequest, Verdict};
use crate::cluster::{first_destination_health, HealthLookup};
use async_trait::async_trait;
use std::sync::Arc;

/// Keeps clients in the waiting room until the gated cluster is healthy,
/// and sends them home once it is.
pub struct HealthGate {
    lookup: Arc<dyn HealthLookup>,
    cluster: String,
    paths: GatePaths,
}

impl HealthGate {
    pub fn new(lookup: Arc<dyn HealthLookup>, cluster: impl Into<String>, paths: GatePaths) -> Self {
        Self {
            lookup,
            cluster: cluster.into(),
            paths,
        }
    }

    pub fn check(&self, path: &str) -> Verdict {
        // unknown topology passes through rather than trapping clients
        let Some(health) = first_destination_health(self.lookup.as_ref(), &self.cluster) else {
            return Verdict::Pass;
        };

        let on_wait_page = path_equals(path, &self.paths.wait);

        if !health.is_healthy() && !on_wait_page {
            if self.paths.is_asset(path) {
                return Verdict::Pass;
            }
            return Verdict::RedirectWait;
        }

        if health.is_healthy() && on_wait_page {
            return Verdict::RedirectHome;
        }

        Verdict::Pass
    }
}

#[async_trait]
impl Gate for HealthGate {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn evaluate(&self, req: &GateRequest<'_>) -> Verdict {
        self.check(req.path)
    }
}
