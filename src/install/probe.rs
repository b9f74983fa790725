use crate::cluster::DestinationResolver;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("destination '{destination}' not found in cluster '{cluster}'")]
    UnknownDestination { cluster: String, destination: String },

    #[error("invalid probe URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: hyper::http::uri::InvalidUri,
    },

    #[error("failed to build probe request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("probe request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Asks the backend whether the application has been installed
#[async_trait]
pub trait InstallProbe: Send + Sync {
    async fn probe(&self) -> Result<bool, ProbeError>;
}

/// Queries the backend's installation status endpoint over HTTP.
///
/// The endpoint answers with a success status while setup is still
/// required, so installed means the request did *not* succeed.
pub struct HttpInstallProbe {
    resolver: Arc<dyn DestinationResolver>,
    cluster: String,
    destination: String,
    status_path: String,
    timeout: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HttpInstallProbe {
    pub fn new(
        resolver: Arc<dyn DestinationResolver>,
        cluster: impl Into<String>,
        destination: impl Into<String>,
        status_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(1)
            .build(connector);

        Self {
            resolver,
            cluster: cluster.into(),
            destination: destination.into(),
            status_path: status_path.into(),
            timeout,
            client,
        }
    }

    fn status_uri(&self) -> Result<Uri, ProbeError> {
        let base = self
            .resolver
            .destination_address(&self.cluster, &self.destination)
            .ok_or_else(|| ProbeError::UnknownDestination {
                cluster: self.cluster.clone(),
                destination: self.destination.clone(),
            })?;

        let url = format!("{}{}", base.trim_end_matches('/'), self.status_path);
        url.parse().map_err(|source| ProbeError::InvalidUrl { url, source })
    }
}

#[async_trait]
impl InstallProbe for HttpInstallProbe {
    async fn probe(&self) -> Result<bool, ProbeError> {
        let uri = self.status_uri()?;
        debug!("Probing installation status at {}", uri);

        let req = Request::get(uri)
            .header("user-agent", "readygate-install-probe/1.0")
            .body(Empty::<Bytes>::new())?;

        let response = timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        Ok(!response.status().is_success())
    }
}
