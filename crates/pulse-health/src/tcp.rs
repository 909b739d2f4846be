//! TCP probe: bare connect, no payload.

use std::time::Instant;

use tracing::debug;

use pulse_core::{CheckResult, ServiceDescriptor};

use crate::probe::{BoxFuture, Probe, ProbeKind};
use crate::transport::Target;

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl TcpProbe {
    async fn probe(&self, service: &ServiceDescriptor) -> CheckResult {
        let start = Instant::now();

        let target = match Target::parse(&service.url) {
            Ok(target) => target,
            Err(e) => return CheckResult::unhealthy(&service.id, 0, e.to_string()),
        };

        let outcome = tokio::time::timeout(service.timeout(), target.connect()).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(stream)) => {
                drop(stream);
                CheckResult::healthy(&service.id, elapsed)
            }
            Ok(Err(e)) => {
                debug!(service_id = %service.id, addr = %target.addr(), error = %e, "tcp probe failed");
                CheckResult::unhealthy(&service.id, elapsed, e.to_string())
            }
            Err(_) => {
                debug!(service_id = %service.id, addr = %target.addr(), "tcp probe timed out");
                CheckResult::unhealthy(
                    &service.id,
                    elapsed,
                    format!("connection timed out after {}ms", service.timeout_ms),
                )
            }
        }
    }
}

impl Probe for TcpProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }

    fn check<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, CheckResult> {
        Box::pin(self.probe(service))
    }
}
