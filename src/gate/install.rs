use super::{path_equals, starts_with_segments, Gate, GatePaths, GateRequest, Verdict};
use crate::cluster::{first_destination_health, HealthLookup};
use crate::install::InstallStateCache;
use async_trait::async_trait;
use std::sync::Arc;

/// Pins an uninstalled deployment to the install wizard and keeps an
/// installed one out of it. Forms no opinion until the cluster is healthy.
pub struct InstallGate {
    lookup: Arc<dyn HealthLookup>,
    cache: Arc<InstallStateCache>,
    cluster: String,
    paths: GatePaths,
}

impl InstallGate {
    pub fn new(
        lookup: Arc<dyn HealthLookup>,
        cache: Arc<InstallStateCache>,
        cluster: impl Into<String>,
        paths: GatePaths,
    ) -> Self {
        Self {
            lookup,
            cache,
            cluster: cluster.into(),
            paths,
        }
    }
}

#[async_trait]
impl Gate for InstallGate {
    fn name(&self) -> &'static str {
        "install"
    }

    async fn evaluate(&self, req: &GateRequest<'_>) -> Verdict {
        let healthy = first_destination_health(self.lookup.as_ref(), &self.cluster)
            .is_some_and(|h| h.is_healthy());
        if !healthy {
            return Verdict::Pass;
        }

        let installed = self.cache.is_installed().await;

        if !installed && path_equals(req.path, &self.paths.home) {
            return Verdict::RedirectInstall;
        }

        if installed && starts_with_segments(req.path, &self.paths.install) {
            return Verdict::RedirectHome;
        }

        Verdict::Pass
    }
}
