//! Readiness gates: decide per request whether to forward, or to send the
//! client to the waiting room or the install wizard.

mod chain;
mod health;
mod install;
mod paths;

pub use chain::GateChain;
pub use health::HealthGate;
pub use install::InstallGate;
pub use paths::{decode_path, path_equals, starts_with_segments, GatePaths};

use async_trait::async_trait;
use std::fmt;

/// Outcome of evaluating a request against the gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Pass,
    RedirectWait,
    RedirectHome,
    RedirectInstall,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::RedirectWait => "redirect_wait",
            Verdict::RedirectHome => "redirect_home",
            Verdict::RedirectInstall => "redirect_install",
        }
    }

    #[inline]
    pub fn is_pass(&self) -> bool {
        *self == Verdict::Pass
    }

    /// Redirect target, `None` for `Pass`
    pub fn location<'a>(&self, paths: &'a GatePaths) -> Option<&'a str> {
        match self {
            Verdict::Pass => None,
            Verdict::RedirectWait => Some(&paths.wait),
            Verdict::RedirectHome => Some(&paths.home),
            Verdict::RedirectInstall => Some(&paths.install),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a request the gates look at
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub path: &'a str,
}

impl<'a> GateRequest<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { path }
    }
}

/// One link of the gate chain. Returning anything but `Verdict::Pass`
/// ends the chain for this request.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, req: &GateRequest<'_>) -> Verdict;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_locations() {
        let paths = GatePaths::default();
        assert_eq!(Verdict::Pass.location(&paths), None);
        assert_eq!(Verdict::RedirectWait.location(&paths), Some("/wait"));
        assert_eq!(Verdict::RedirectHome.location(&paths), Some("/"));
        assert_eq!(Verdict::RedirectInstall.location(&paths), Some("/mnt"));
    }
}
