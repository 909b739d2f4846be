//! HTTP probe.
//!
//! Issues a `GET` against the service URL and classifies the response:
//! 2xx is healthy, 5xx is unhealthy, anything else is degraded. Connection
//! errors and timeouts are unhealthy.

use std::time::Instant;

use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::debug;

use pulse_core::{CheckResult, CheckStatus, ServiceDescriptor};

use crate::error::TransportError;
use crate::probe::{BoxFuture, Probe, ProbeKind};
use crate::transport::{HttpClient, Target};

pub struct HttpProbe {
    client: HttpClient,
}

impl HttpProbe {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    pub fn with_client(client: HttpClient) -> Self {
        Self { client }
    }

    async fn probe(&self, service: &ServiceDescriptor) -> CheckResult {
        let start = Instant::now();

        let target = match Target::parse(&service.url) {
            Ok(target) => target,
            Err(e) => return CheckResult::unhealthy(&service.id, 0, e.to_string()),
        };

        let outcome = tokio::time::timeout(
            service.timeout(),
            self.client.send(&target, Method::GET, Bytes::new(), None),
        )
        .await;
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(status)) => classify(&service.id, status, elapsed),
            Ok(Err(e)) => {
                debug!(service_id = %service.id, url = %service.url, error = %e, "http probe failed");
                CheckResult::unhealthy(&service.id, elapsed, e.to_string())
            }
            Err(_) => {
                debug!(service_id = %service.id, url = %service.url, "http probe timed out");
                CheckResult::unhealthy(
                    &service.id,
                    elapsed,
                    format!("timed out after {}ms", service.timeout_ms),
                )
            }
        }
    }
}

impl Probe for HttpProbe {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Http
    }

    fn check<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, CheckResult> {
        Box::pin(self.probe(service))
    }
}

/// Map an HTTP status to a check result.
pub fn classify(service_id: &str, status: StatusCode, response_time_ms: u64) -> CheckResult {
    if status.is_success() {
        return CheckResult::healthy(service_id, response_time_ms);
    }

    let label = match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    };
    let check_status = if status.is_server_error() {
        CheckStatus::Unhealthy
    } else {
        CheckStatus::Degraded
    };
    CheckResult::new(service_id, check_status, response_time_ms).with_message(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn service(url: &str, timeout_ms: u64) -> ServiceDescriptor {
        ServiceDescriptor {
            id: "web".to_string(),
            name: "Web".to_string(),
            url: url.to_string(),
            strategy: "http".to_string(),
            interval_ms: 30_000,
            timeout_ms,
            metadata: HashMap::new(),
        }
    }

    /// Serve a fixed status line to every connection.
    async fn serve_status(status_line: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn probe() -> HttpProbe {
        HttpProbe::new().unwrap()
    }

    #[test]
    fn classify_status_codes() {
        assert_eq!(classify("a", StatusCode::OK, 1).status, CheckStatus::Healthy);
        assert_eq!(classify("a", StatusCode::NO_CONTENT, 1).status, CheckStatus::Healthy);

        let unavailable = classify("a", StatusCode::SERVICE_UNAVAILABLE, 1);
        assert_eq!(unavailable.status, CheckStatus::Unhealthy);
        assert_eq!(unavailable.message.as_deref(), Some("HTTP 503 Service Unavailable"));

        let not_found = classify("a", StatusCode::NOT_FOUND, 1);
        assert_eq!(not_found.status, CheckStatus::Degraded);
        assert_eq!(not_found.message.as_deref(), Some("HTTP 404 Not Found"));

        assert_eq!(classify("a", StatusCode::MOVED_PERMANENTLY, 1).status, CheckStatus::Degraded);
    }

    #[tokio::test]
    async fn probe_2xx_is_healthy() {
        let addr = serve_status("200 OK").await;
        let result = probe().check(&service(&format!("http://{addr}/healthz"), 2000)).await;
        assert_eq!(result.status, CheckStatus::Healthy, "{result:?}");
        assert_eq!(result.service_id, "web");
    }

    #[tokio::test]
    async fn probe_5xx_is_unhealthy() {
        let addr = serve_status("503 Service Unavailable").await;
        let result = probe().check(&service(&format!("http://{addr}/"), 2000)).await;
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert_eq!(result.message.as_deref(), Some("HTTP 503 Service Unavailable"));
    }

    #[tokio::test]
    async fn probe_4xx_is_degraded() {
        let addr = serve_status("404 Not Found").await;
        let result = probe().check(&service(&format!("http://{addr}/missing"), 2000)).await;
        assert_eq!(result.status, CheckStatus::Degraded);
    }

    #[tokio::test]
    async fn probe_closed_port_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = probe().check(&service(&format!("http://{addr}/"), 1000)).await;
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn probe_times_out_when_server_hangs() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let started = std::time::Instant::now();
        let result = probe().check(&service(&format!("http://{addr}/"), 150)).await;
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert_eq!(result.error.as_deref(), Some("timed out after 150ms"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn probe_invalid_url_is_unhealthy() {
        let result = probe().check(&service("not a url", 1000)).await;
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert!(result.error.unwrap().contains("invalid url"));
    }
}
