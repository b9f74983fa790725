pub mod cluster;
pub mod config;
pub mod gate;
pub mod health;
pub mod install;
pub mod metrics;
pub mod proxy;
pub mod router;
pub mod server;

pub use config::Config;
pub use gate::{GateChain, Verdict};
