mod listener;

pub use listener::Listener;

use crate::cluster::{ClusterManager, DestinationResolver, HealthLookup};
use crate::config::{watch_config_async, Config};
use crate::gate::GateChain;
use crate::proxy::ProxyHandler;
use crate::router::Router;
use anyhow::Result;
use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Shared state that can be hot-reloaded
pub struct SharedState {
    pub config: Arc<ArcSwap<Config>>,
    pub clusters: Arc<ArcSwap<ClusterManager>>,
    pub router: ArcSwap<Router>,
    pub gates: ArcSwap<GateChain>,
}

impl SharedState {
    pub fn new(config: Config) -> Self {
        let clusters = Arc::new(ArcSwap::from_pointee(ClusterManager::new(&config)));
        let router = ArcSwap::from_pointee(Router::from_config(&config));
        let config = Arc::new(ArcSwap::from_pointee(config));
        let gates = ArcSwap::from_pointee(Self::build_gates(&config, &clusters));

        Self {
            config,
            clusters,
            router,
            gates,
        }
    }

    fn build_gates(config: &Arc<ArcSwap<Config>>, clusters: &Arc<ArcSwap<ClusterManager>>) -> GateChain {
        let lookup: Arc<dyn HealthLookup> = Arc::clone(clusters) as Arc<dyn HealthLookup>;
        let resolver: Arc<dyn DestinationResolver> = Arc::clone(config) as Arc<dyn DestinationResolver>;
        GateChain::from_config(&config.load().gate, lookup, resolver)
    }

    pub fn start_health_checks(&self) {
        self.clusters.load().start_health_checks();
    }

    /// Swap in a new config: topology, routes and gates
    pub fn reload(&self, config: Config) {
        let clusters = self.clusters.load().reload(&config);
        clusters.start_health_checks();
        let previous = self.clusters.swap(Arc::new(clusters));
        previous.stop_health_checks();

        self.router.store(Arc::new(Router::from_config(&config)));
        self.config.store(Arc::new(config));
        self.gates
            .store(Arc::new(Self::build_gates(&self.config, &self.clusters)));

        info!(
            "Reloaded {} routes, gate order {:?}",
            self.router.load().routes().len(),
            self.gates.load().names()
        );
    }
}

pub struct Server {
    config_path: PathBuf,
    state: Arc<SharedState>,
    proxy: Arc<ProxyHandler>,
}

impl Server {
    pub fn new(config: Config, config_path: PathBuf) -> Self {
        Self {
            config_path,
            state: Arc::new(SharedState::new(config)),
            proxy: Arc::new(ProxyHandler::new()),
        }
    }

    pub async fn run(&self) -> Result<()> {
        self.state.start_health_checks();

        let entrypoints: Vec<_> = self
            .state
            .config
            .load()
            .entrypoints
            .iter()
            .map(|(name, ep)| (name.clone(), ep.address.clone()))
            .collect();

        let mut handles = Vec::new();
        for (name, address) in entrypoints {
            let listener = Listener::new(
                name.clone(),
                address,
                Arc::clone(&self.state),
                Arc::clone(&self.proxy),
            );

            handles.push(tokio::spawn(async move {
                if let Err(e) = listener.serve().await {
                    error!("Listener '{}' error: {:#}", name, e);
                }
            }));
        }

        let state = Arc::clone(&self.state);
        let config_path = self.config_path.clone();
        let watcher_handle = tokio::spawn(async move {
            let (mut rx, _handle) = watch_config_async(config_path).await;

            while let Ok(new_config) = rx.recv().await {
                info!("Hot reloading configuration...");
                state.reload(new_config);
            }
        });

        info!(
            "Server started, gate order {:?}, waiting for shutdown signal",
            self.state.gates.load().names()
        );

        shutdown_signal().await;

        info!("Shutdown signal received, stopping server");

        watcher_handle.abort();
        for handle in handles {
            handle.abort();
        }
        self.state.clusters.load().stop_health_checks();

        info!("Server stopped");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
