//! Installation state of the gated backend.

mod cache;
mod probe;

pub use cache::{Clock, InstallStateCache, SystemClock};
pub use probe::{HttpInstallProbe, InstallProbe, ProbeError};

#[cfg(test)]
pub(crate) use cache::tests::{ManualClock, StubProbe};
#[cfg(test)]
pub(crate) use probe::tests::{closed_addr, serve_status, StaticResolver};
