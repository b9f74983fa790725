use crate::gate::{decode_path, GateRequest};
use crate::proxy::ProxyHandler;
use crate::server::SharedState;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub struct Listener {
    name: String,
    address: String,
    state: Arc<SharedState>,
    proxy: Arc<ProxyHandler>,
}

impl Listener {
    pub fn new(name: String, address: String, state: Arc<SharedState>, proxy: Arc<ProxyHandler>) -> Self {
        Self {
            name,
            address,
            state,
            proxy,
        }
    }

    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .address
            .parse()
            .with_context(|| format!("Invalid address: {}", self.address))?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        self.serve_on(listener).await
    }

    /// Accept loop on an already bound socket
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        info!(
            "Entrypoint '{}' listening on {}",
            self.name,
            listener.local_addr()?
        );

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);
            let proxy = Arc::clone(&self.proxy);

            tokio::spawn(async move {
                Self::serve_connection(TokioIo::new(stream), remote_addr, state, proxy).await;
            });
        }
    }

    async fn serve_connection<I>(io: I, remote_addr: SocketAddr, state: Arc<SharedState>, proxy: Arc<ProxyHandler>)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let service = service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            let proxy = Arc::clone(&proxy);

            async move { handle_request(req, remote_addr, &state, &proxy).await }
        });

        let builder = AutoBuilder::new(TokioExecutor::new());
        if let Err(e) = builder.serve_connection_with_upgrades(io, service).await {
            debug!("Connection error from {}: {}", remote_addr, e);
        }
    }
}

/// Gate the request, then forward whatever passes
async fn handle_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    state: &SharedState,
    proxy: &ProxyHandler,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let gates = state.gates.load_full();
    let path = decode_path(req.uri().path()).into_owned();

    let verdict = gates.evaluate(&GateRequest::new(&path)).await;
    if let Some(redirect) = gates.redirect_response(verdict) {
        debug!("{} {} from {} -> {}", req.method(), path, remote_addr, verdict);
        return Ok(redirect);
    }

    let router = state.router.load_full();
    let clusters = state.clusters.load_full();

    proxy.handle(req, remote_addr, &router, &clusters).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::HealthLookup;
    use crate::config::Config;
    use crate::health::ActiveHealthState;
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::header::LOCATION;
    use hyper::server::conn::http1;
    use hyper::StatusCode;
    use hyper_util::client::legacy::connect::HttpConnector;
    use hyper_util::client::legacy::Client;
    use std::convert::Infallible;
    use std::time::Duration;

    /// Upstream that is healthy, reports itself installed, and echoes `body`
    async fn spawn_backend(body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| async move {
                        let status = match req.uri().path() {
                            "/api/v1/settings/checkInstalled" => StatusCode::NOT_FOUND,
                            _ => StatusCode::OK,
                        };
                        let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                        *resp.status_mut() = status;
                        Ok::<_, Infallible>(resp)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        addr
    }

    async fn spawn_gateway(backend: SocketAddr, frontend: SocketAddr) -> (SocketAddr, Arc<SharedState>) {
        let config = Config::from_yaml(&format!(
            r#"
entrypoints:
  web:
    address: "127.0.0.1:0"
clusters:
  backend:
    destinations:
      backend/d1:
        address: "http://{}"
    health_check:
      path: /health
      interval: 50ms
      timeout: 1s
  frontend:
    destinations:
      frontend/d1:
        address: "http://{}"
routes:
  api:
    path_prefix: /api
    cluster: backend
  site:
    cluster: frontend
"#,
            backend, frontend
        ))
        .unwrap();

        let state = Arc::new(SharedState::new(config));
        state.start_health_checks();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let listener = Listener::new(
            "web".into(),
            addr.to_string(),
            Arc::clone(&state),
            Arc::new(ProxyHandler::new()),
        );
        tokio::spawn(async move { listener.serve_on(tcp).await });

        (addr, state)
    }

    async fn wait_until_healthy(state: &SharedState) {
        for _ in 0..100 {
            let health = state
                .clusters
                .try_get_cluster("backend")
                .and_then(|c| c.first_health());
            if health == Some(ActiveHealthState::Healthy) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("backend never became healthy");
    }

    #[tokio::test]
    async fn test_gateway_end_to_end() {
        let backend = spawn_backend("backend").await;
        let frontend = spawn_backend("frontend").await;
        let (gateway, state) = spawn_gateway(backend, frontend).await;

        let client: Client<HttpConnector, Empty<Bytes>> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let get = |path: &str| {
            let uri: hyper::Uri = format!("http://{}{}", gateway, path).parse().unwrap();
            client.get(uri)
        };

        wait_until_healthy(&state).await;

        // healthy: leave the waiting room
        let resp = get("/wait").await.unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[LOCATION], "/");

        // escapes are decoded before gating
        let resp = get("/%77ait").await.unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[LOCATION], "/");

        // installed (status endpoint 404s): leave the wizard
        let resp = get("/mnt/step").await.unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[LOCATION], "/");

        // forwarded by route
        let resp = get("/api/v1/servers").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"backend");

        let resp = get("/").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"frontend");
    }
}
