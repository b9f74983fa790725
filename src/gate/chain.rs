use super::{Gate, GatePaths, GateRequest, HealthGate, InstallGate, Verdict};
use crate::cluster::{DestinationResolver, HealthLookup};
use crate::config::GateConfig;
use crate::install::{HttpInstallProbe, InstallStateCache};
use crate::metrics::Metrics;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::header::{HeaderValue, CACHE_CONTROL, LOCATION};
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Gates evaluated strictly in order ahead of forwarding
pub struct GateChain {
    gates: Vec<Box<dyn Gate>>,
    paths: GatePaths,
}

impl GateChain {
    pub fn new(gates: Vec<Box<dyn Gate>>, paths: GatePaths) -> Self {
        Self { gates, paths }
    }

    /// Health gate first, install gate second. The install gate must never
    /// run ahead of the health gate, or a cached "installed" answer would
    /// let clients past the waiting room of an unhealthy backend.
    pub fn from_config(
        config: &GateConfig,
        lookup: Arc<dyn HealthLookup>,
        resolver: Arc<dyn DestinationResolver>,
    ) -> Self {
        let paths = GatePaths::from_config(config);

        let probe = HttpInstallProbe::new(
            resolver,
            config.cluster.clone(),
            config.destination.clone(),
            config.status_path.clone(),
            config.probe_timeout.as_std(),
        );
        let cache = Arc::new(InstallStateCache::new(Arc::new(probe), config.cache_ttl.as_std()));

        let gates: Vec<Box<dyn Gate>> = vec![
            Box::new(HealthGate::new(
                Arc::clone(&lookup),
                config.cluster.clone(),
                paths.clone(),
            )),
            Box::new(InstallGate::new(lookup, cache, config.cluster.clone(), paths.clone())),
        ];

        Self::new(gates, paths)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn paths(&self) -> &GatePaths {
        &self.paths
    }

    /// Run the gates until one of them returns something other than `Pass`
    pub async fn evaluate(&self, req: &GateRequest<'_>) -> Verdict {
        for gate in &self.gates {
            let verdict = gate.evaluate(req).await;
            Metrics::record_verdict(gate.name(), verdict.as_str());

            if !verdict.is_pass() {
                debug!("Gate '{}' answered {} for {}", gate.name(), verdict, req.path);
                return verdict;
            }
        }

        Verdict::Pass
    }

    /// 307 response for a redirect verdict, `None` for `Pass`
    pub fn redirect_response(&self, verdict: Verdict) -> Option<Response<BoxBody<Bytes, hyper::Error>>> {
        let location = verdict.location(&self.paths)?;
        let location = HeaderValue::from_str(location).unwrap_or(HeaderValue::from_static("/"));

        let body: BoxBody<Bytes, hyper::Error> =
            Empty::<Bytes>::new().map_err(|never| match never {}).boxed();
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
        response.headers_mut().insert(LOCATION, location);
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::testing::FakeLookup;
    use crate::health::ActiveHealthState::{Healthy, Unhealthy};
    use crate::install::{closed_addr, serve_status, ManualClock, StaticResolver, StubProbe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn chain(lookup: Arc<FakeLookup>, probe: Arc<StubProbe>) -> GateChain {
        let paths = GatePaths::default();
        let cache = InstallStateCache::with_clock(probe, Duration::from_secs(10), ManualClock::new());
        GateChain::new(
            vec![
                Box::new(HealthGate::new(lookup.clone(), "backend", paths.clone())),
                Box::new(InstallGate::new(lookup, Arc::new(cache), "backend", paths.clone())),
            ],
            paths,
        )
    }

    async fn eval(c: &GateChain, path: &str) -> Verdict {
        c.evaluate(&GateRequest::new(path)).await
    }

    struct Counting {
        verdict: Verdict,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Gate for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn evaluate(&self, _req: &GateRequest<'_>) -> Verdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    #[tokio::test]
    async fn test_first_non_pass_stops_the_chain() {
        let second = Arc::new(AtomicUsize::new(0));
        let c = GateChain::new(
            vec![
                Box::new(Counting {
                    verdict: Verdict::RedirectWait,
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Box::new(Counting {
                    verdict: Verdict::RedirectInstall,
                    calls: second.clone(),
                }),
            ],
            GatePaths::default(),
        );

        assert_eq!(eval(&c, "/").await, Verdict::RedirectWait);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_passes() {
        let c = GateChain::new(Vec::new(), GatePaths::default());
        assert_eq!(eval(&c, "/anything").await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_unknown_cluster_passes() {
        let probe = StubProbe::answering(false);
        let c = chain(FakeLookup::missing(), probe.clone());

        for path in ["/", "/wait", "/mnt", "/_next/app.js"] {
            assert_eq!(eval(&c, path).await, Verdict::Pass, "path {}", path);
        }
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_root_goes_to_wait_without_probing() {
        let probe = StubProbe::answering(true);
        let c = chain(FakeLookup::single(Unhealthy), probe.clone());

        assert_eq!(eval(&c, "/").await, Verdict::RedirectWait);
        assert_eq!(eval(&c, "/wait").await, Verdict::Pass);
        assert_eq!(eval(&c, "/_next/static/x.js").await, Verdict::Pass);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_cached_installed_does_not_bypass_waiting_room() {
        let lookup = FakeLookup::single(Healthy);
        let probe = StubProbe::answering(true);
        let c = chain(lookup.clone(), probe.clone());

        assert_eq!(eval(&c, "/mnt").await, Verdict::RedirectHome);

        lookup.set(Unhealthy);
        assert_eq!(eval(&c, "/mnt").await, Verdict::RedirectWait);
        assert_eq!(eval(&c, "/").await, Verdict::RedirectWait);
    }

    #[tokio::test]
    async fn test_healthy_wait_goes_home() {
        let c = chain(FakeLookup::single(Healthy), StubProbe::answering(false));
        assert_eq!(eval(&c, "/wait").await, Verdict::RedirectHome);
    }

    #[test]
    fn test_order_is_health_then_install() {
        let lookup = FakeLookup::missing();
        let c = GateChain::from_config(
            &GateConfig::default(),
            lookup,
            StaticResolver::backend("http://127.0.0.1:1"),
        );
        assert_eq!(c.names(), vec!["health", "install"]);
    }

    #[test]
    fn test_redirect_response() {
        let c = GateChain::new(Vec::new(), GatePaths::default());

        assert!(c.redirect_response(Verdict::Pass).is_none());

        let resp = c.redirect_response(Verdict::RedirectWait).unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[LOCATION], "/wait");

        let resp = c.redirect_response(Verdict::RedirectHome).unwrap();
        assert_eq!(resp.headers()[LOCATION], "/");

        let resp = c.redirect_response(Verdict::RedirectInstall).unwrap();
        assert_eq!(resp.headers()[LOCATION], "/mnt");
    }

    // Scenarios against a real probe endpoint

    fn http_chain(lookup: Arc<FakeLookup>, address: &str) -> GateChain {
        GateChain::from_config(&GateConfig::default(), lookup, StaticResolver::backend(address))
    }

    #[tokio::test]
    async fn test_scenario_unknown_cluster() {
        let c = http_chain(FakeLookup::missing(), "http://127.0.0.1:1");
        assert_eq!(eval(&c, "/").await, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_scenario_unhealthy_root() {
        let c = http_chain(FakeLookup::single(Unhealthy), "http://127.0.0.1:1");
        let verdict = eval(&c, "/").await;
        assert_eq!(verdict, Verdict::RedirectWait);
        assert_eq!(verdict.location(c.paths()), Some("/wait"));
    }

    #[tokio::test]
    async fn test_scenario_healthy_wait() {
        let c = http_chain(FakeLookup::single(Healthy), "http://127.0.0.1:1");
        let verdict = eval(&c, "/wait").await;
        assert_eq!(verdict, Verdict::RedirectHome);
        assert_eq!(verdict.location(c.paths()), Some("/"));
    }

    #[tokio::test]
    async fn test_scenario_probe_404_leaves_wizard() {
        let addr = serve_status(StatusCode::NOT_FOUND).await;
        let c = http_chain(FakeLookup::single(Healthy), &format!("http://{}", addr));
        assert_eq!(eval(&c, "/mnt").await, Verdict::RedirectHome);
    }

    #[tokio::test]
    async fn test_scenario_probe_200_enters_wizard() {
        let addr = serve_status(StatusCode::OK).await;
        let c = http_chain(FakeLookup::single(Healthy), &format!("http://{}", addr));
        let verdict = eval(&c, "/").await;
        assert_eq!(verdict, Verdict::RedirectInstall);
        assert_eq!(verdict.location(c.paths()), Some("/mnt"));
    }

    #[tokio::test]
    async fn test_scenario_probe_network_error_enters_wizard() {
        let addr = closed_addr().await;
        let c = http_chain(FakeLookup::single(Healthy), &format!("http://{}", addr));
        assert_eq!(eval(&c, "/").await, Verdict::RedirectInstall);
    }
}
