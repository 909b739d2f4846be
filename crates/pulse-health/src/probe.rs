//! Probe strategy trait and strategy selection.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use pulse_core::{CheckResult, ServiceDescriptor};

use crate::error::SchedulerError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The closed set of probe strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Http,
    Tcp,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProbeKind::Http),
            "tcp" => Ok(ProbeKind::Tcp),
            _ => Err(SchedulerError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Executes one health probe against one service.
///
/// Implementations must finish within `service.timeout()` and encode every
/// failure (refused, reset, timed out) as an unhealthy result.
pub trait Probe: Send + Sync {
    fn kind(&self) -> ProbeKind;

    fn check<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, CheckResult>;
}
