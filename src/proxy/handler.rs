use crate::cluster::ClusterManager;
use crate::metrics::Metrics;
use crate::router::Router;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_TYPE, HOST, TRANSFER_ENCODING, UPGRADE};
use hyper::{body::Incoming, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const HOP_BY_HOP: &[&str] = &[
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

pub struct ProxyHandler {
    client: Client<HttpConnector, BoxBody<Bytes, hyper::Error>>,
}

impl ProxyHandler {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(Duration::from_secs(5)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(64)
            .set_host(true)
            .build(connector);

        Self { client }
    }

    /// Forward a request that made it past the gates
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        router: &Router,
        clusters: &ClusterManager,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        let start = Instant::now();

        let host = req
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string());
        let path = req.uri().path().to_string();

        let Some(route) = router.match_request(host.as_deref(), &path) else {
            debug!("No route matched for {} {}", host.as_deref().unwrap_or("-"), path);
            return Ok(Self::error_response(StatusCode::NOT_FOUND, "Not Found"));
        };
        let cluster_name = route.cluster.clone();

        let destination = match clusters.get_cluster(&cluster_name) {
            Some(cluster) => cluster.pick_destination().map(|d| d.address.clone()),
            None => {
                error!("Cluster '{}' not found", cluster_name);
                return Ok(Self::error_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
            }
        };
        let Some(destination) = destination else {
            warn!("No available destinations in cluster '{}'", cluster_name);
            return Ok(Self::error_response(StatusCode::SERVICE_UNAVAILABLE, "No Healthy Backends"));
        };

        let backend_uri = match Self::build_backend_uri(&destination, req.uri()) {
            Ok(uri) => uri,
            Err(e) => {
                error!("Failed to build backend URI: {}", e);
                return Ok(Self::error_response(StatusCode::BAD_GATEWAY, "Bad Gateway"));
            }
        };

        debug!("Forwarding {} -> {}", path, backend_uri);

        let proxied = Self::build_proxied_request(req, backend_uri, remote_addr, host.as_deref());

        let response = match timeout(REQUEST_TIMEOUT, self.client.request(proxied)).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                for header in [CONNECTION, TRANSFER_ENCODING, UPGRADE] {
                    parts.headers.remove(header);
                }
                Response::from_parts(parts, body.boxed())
            }
            Ok(Err(e)) => {
                error!("Backend request to {} failed: {}", destination, e);
                Self::error_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            Err(_) => {
                warn!("Request to {} timed out after {:?}", destination, REQUEST_TIMEOUT);
                Self::error_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout")
            }
        };

        Metrics::record_request(&cluster_name, response.status().as_u16(), start.elapsed());

        Ok(response)
    }

    fn build_backend_uri(destination: &str, original: &Uri) -> Result<Uri, String> {
        let base: Uri = destination
            .parse()
            .map_err(|e| format!("invalid destination address '{}': {}", destination, e))?;

        let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let base_path = base.path().trim_end_matches('/');

        format!(
            "{}://{}{}{}",
            base.scheme_str().unwrap_or("http"),
            base.authority().map(|a| a.as_str()).unwrap_or(""),
            base_path,
            path_and_query,
        )
        .parse()
        .map_err(|e| format!("failed to build URI: {}", e))
    }

    fn build_proxied_request(
        req: Request<Incoming>,
        backend_uri: Uri,
        remote_addr: SocketAddr,
        original_host: Option<&str>,
    ) -> Request<BoxBody<Bytes, hyper::Error>> {
        let (mut parts, body) = req.into_parts();

        parts.uri = backend_uri;

        Self::strip_hop_by_hop(&mut parts.headers);

        let xff = match parts.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, remote_addr.ip()),
            None => remote_addr.ip().to_string(),
        };
        if let Ok(val) = HeaderValue::from_str(&xff) {
            parts.headers.insert(HeaderName::from_static("x-forwarded-for"), val);
        }

        if let Some(val) = original_host.and_then(|h| HeaderValue::from_str(h).ok()) {
            parts.headers.insert(HeaderName::from_static("x-forwarded-host"), val);
        }

        parts.headers.insert(
            HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static("http"),
        );

        // Host follows the destination; the client's host travels in X-Forwarded-Host
        if let Some(val) = parts
            .uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            parts.headers.insert(HOST, val);
        }

        Request::from_parts(parts, body.boxed())
    }

    /// Remove connection-scoped headers, including any the client listed in
    /// its `Connection` header.
    fn strip_hop_by_hop(headers: &mut HeaderMap) {
        let listed: Vec<HeaderName> = headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
            .collect();
        for header in listed {
            headers.remove(header);
        }

        for header in [CONNECTION, TRANSFER_ENCODING, UPGRADE] {
            headers.remove(header);
        }
        for header in HOP_BY_HOP {
            headers.remove(*header);
        }
    }

    fn error_response(status: StatusCode, message: &'static str) -> Response<BoxBody<Bytes, hyper::Error>> {
        let body = Full::new(Bytes::from_static(message.as_bytes()))
            .map_err(|never| match never {})
            .boxed();

        let mut response = Response::new(body);
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl Default for ProxyHandler {
    fn default() -> Self {
        Self::new()
    }
}
