//! Minimal HTTP/1.1 client over tokio + hyper, with rustls for `https`.
//!
//! Shared by the HTTP probe and the webhook notifier. Each request opens a
//! fresh connection; there is no pooling, which keeps a probe's latency
//! honest and makes cancellation (dropping the future) close the socket.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::Full;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::TransportError;

/// A parsed probe or webhook target.
#[derive(Debug, Clone)]
pub struct Target {
    uri: Uri,
    scheme: String,
    host: String,
    port: u16,
}

impl Target {
    /// Parse `scheme://host[:port][/path]` or bare `host:port`.
    ///
    /// A missing port defaults to 443 for `https` and 80 otherwise.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.trim().parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
        let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
        let port = uri
            .port_u16()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });

        Ok(Self {
            uri,
            scheme,
            host,
            port,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }

    /// Host without IPv6 brackets, suitable for connecting and SNI.
    pub fn host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    /// `host:port` for log fields and error messages.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn host_header(&self) -> String {
        self.uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| self.addr())
    }

    fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("/")
    }

    /// Open a plain TCP connection to the target.
    pub async fn connect(&self) -> Result<TcpStream, TransportError> {
        TcpStream::connect((self.host(), self.port))
            .await
            .map_err(|source| TransportError::Connect {
                addr: self.addr(),
                source,
            })
    }
}

/// HTTP client that speaks plain HTTP/1.1 or HTTP/1.1 over TLS.
#[derive(Clone)]
pub struct HttpClient {
    tls: TlsConnector,
    user_agent: String,
}

impl HttpClient {
    /// Create a client trusting the Mozilla root certificate store.
    pub fn new() -> Result<Self, TransportError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Tls(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
            user_agent: concat!("pulse-health/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Send one request and return the response status.
    ///
    /// The response body is not read. Callers bound the whole exchange with
    /// `tokio::time::timeout`; dropping the future tears the connection down.
    pub async fn send(
        &self,
        target: &Target,
        method: Method,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<StatusCode, TransportError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(target.path_and_query())
            .header(HOST, target.host_header())
            .header(USER_AGENT, self.user_agent.as_str());
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let req = builder.body(Full::new(body))?;

        let stream = target.connect().await?;

        if target.is_tls() {
            let server_name = ServerName::try_from(target.host().to_string())
                .map_err(|e| TransportError::Tls(format!("invalid tls server name '{}': {e}", target.host())))?;
            let tls_stream = self
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| TransportError::Tls(e.to_string()))?;
            send_over(tls_stream, req).await
        } else {
            send_over(stream, req).await
        }
    }
}

async fn send_over<IO>(io: IO, req: Request<Full<Bytes>>) -> Result<StatusCode, TransportError>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
        .await
        .map_err(TransportError::Handshake)?;

    // Drive the connection in the background; it ends when `sender` drops.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(TransportError::Request)?;
    Ok(resp.status())
}
