use super::InstallProbe;
use crate::metrics::Metrics;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    is_installed: bool,
    expires_at: Instant,
}

/// Caches the backend's "is installed" answer for a fixed TTL.
///
/// Concurrent callers that miss at the same time each run their own probe;
/// whichever finishes last wins.
pub struct InstallStateCache {
    probe: Arc<dyn InstallProbe>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl InstallStateCache {
    pub fn new(probe: Arc<dyn InstallProbe>, ttl: Duration) -> Self {
        Self::with_clock(probe, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(probe: Arc<dyn InstallProbe>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            probe,
            clock,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached value if still fresh
    pub fn peek(&self) -> Option<bool> {
        let now = self.clock.now();
        let entry = *self.entry.read();
        entry
            .filter(|e| now < e.expires_at)
            .map(|e| e.is_installed)
    }

    /// Answer from cache, or probe the backend and remember the result.
    /// A failed probe counts as "not installed" and is not cached.
    pub async fn is_installed(&self) -> bool {
        if let Some(installed) = self.peek() {
            Metrics::record_install_cache_hit();
            return installed;
        }

        match self.probe.probe().await {
            Ok(is_installed) => {
                Metrics::record_install_probe(if is_installed { "installed" } else { "not_installed" });
                let expires_at = self.clock.now() + self.ttl;
                *self.entry.write() = Some(CacheEntry {
                    is_installed,
                    expires_at,
                });
                debug!("Installation state refreshed: installed={}", is_installed);
                is_installed
            }
            Err(e) => {
                Metrics::record_install_probe("error");
                warn!("Installation probe failed, assuming not installed: {}", e);
                false
            }
        }
    }
}
