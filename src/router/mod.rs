use crate::config::Config;
use crate::gate::starts_with_segments;

/// Maps a request to the cluster that should serve it
pub struct Router {
    routes: Vec<Route>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub host: Option<String>,
    pub path_prefix: String,
    pub cluster: String,
    pub priority: i32,
}

impl Route {
    fn matches(&self, host: Option<&str>, path: &str) -> bool {
        let host_ok = match &self.host {
            Some(expected) => host.is_some_and(|h| h.eq_ignore_ascii_case(expected)),
            None => true,
        };
        host_ok && starts_with_segments(path, &self.path_prefix)
    }
}

impl Router {
    pub fn from_config(config: &Config) -> Self {
        let mut routes: Vec<Route> = config
            .routes
            .iter()
            .map(|(name, route)| Route {
                name: name.clone(),
                host: route.host.clone(),
                path_prefix: route.path_prefix.clone(),
                cluster: route.cluster.clone(),
                priority: route.priority,
            })
            .collect();

        // higher priority first, then the more specific prefix, then name for stability
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.path_prefix.len().cmp(&a.path_prefix.len()))
                .then_with(|| a.name.cmp(&b.name))
        });

        Self { routes }
    }

    pub fn match_request(&self, host: Option<&str>, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(host, path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        let config = Config::from_yaml(
            r#"
entrypoints:
  web:
    address: "127.0.0.1:8080"
clusters:
  backend:
    destinations:
      backend/d1:
        address: "http://127.0.0.1:8082"
  frontend:
    destinations:
      frontend/d1:
        address: "http://127.0.0.1:5000"
  admin:
    destinations:
      admin/d1:
        address: "http://127.0.0.1:7000"
routes:
  site:
    cluster: frontend
  api:
    path_prefix: /api
    cluster: backend
  admin:
    path_prefix: /
    host: admin.example.com
    cluster: admin
    priority: 5
"#,
        )
        .unwrap();
        Router::from_config(&config)
    }

    #[test]
    fn test_longest_prefix_wins_at_equal_priority() {
        let r = router();
        assert_eq!(r.match_request(None, "/api/v1/settings").unwrap().cluster, "backend");
        assert_eq!(r.match_request(None, "/").unwrap().cluster, "frontend");
        assert_eq!(r.match_request(None, "/apiary").unwrap().cluster, "frontend");
    }

    #[test]
    fn test_priority_beats_prefix_length() {
        let r = router();
        let route = r.match_request(Some("ADMIN.example.com"), "/api/x").unwrap();
        assert_eq!(route.cluster, "admin");
    }

    #[test]
    fn test_no_route() {
        let r = Router { routes: Vec::new() };
        assert!(r.match_request(None, "/").is_none());
    }
}
