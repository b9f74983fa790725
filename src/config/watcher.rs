use crate::config::Config;
use anyhow::Result;
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const DEBOUNCE: Duration = Duration::from_millis(100);
const SETTLE: Duration = Duration::from_millis(50);

/// Watches the config file and broadcasts every new config that validates
pub struct ConfigWatcher {
    path: PathBuf,
    tx: broadcast::Sender<Config>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> (Self, broadcast::Receiver<Config>) {
        let (tx, rx) = broadcast::channel(16);
        (
            Self {
                path: path.into(),
                tx,
            },
            rx,
        )
    }

    /// Blocks the calling thread; run it on a blocking task.
    pub fn watch(self) -> Result<()> {
        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = recommended_watcher(event_tx)?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        info!("Watching config file for changes: {:?}", self.path);

        let mut last_reload: Option<Instant> = None;

        for event in event_rx {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {:?}", e);
                    continue;
                }
            };

            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                continue;
            }

            if last_reload.is_some_and(|at| at.elapsed() < DEBOUNCE) {
                continue;
            }
            last_reload = Some(Instant::now());

            debug!("Config file changed: {:?}", event.kind);

            // editors often truncate then write
            std::thread::sleep(SETTLE);

            if !self.reload() {
                debug!("No config subscribers left, stopping watcher");
                break;
            }
        }

        Ok(())
    }

    /// Returns false once nobody is listening any more.
    fn reload(&self) -> bool {
        match Config::load(Path::new(&self.path)) {
            Ok(config) => {
                info!("Config reloaded from {:?}", self.path);
                self.tx.send(config).is_ok()
            }
            Err(e) => {
                warn!("Ignoring invalid config change: {:#}", e);
                true
            }
        }
    }
}

/// Spawn a watcher on the blocking pool and hand back its receiver
pub async fn watch_config_async(
    path: PathBuf,
) -> (broadcast::Receiver<Config>, tokio::task::JoinHandle<()>) {
    let (watcher, rx) = ConfigWatcher::new(path);

    let handle = tokio::task::spawn_blocking(move || {
        if let Err(e) = watcher.watch() {
            error!("Config watcher error: {}", e);
        }
    });

    (rx, handle)
}
