//! Health checker error types.

use thiserror::Error;

/// Errors that reject a check outright.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown check strategy: {0}")]
    UnknownStrategy(String),

    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors from the HTTP/TCP transport shared by probes and notifiers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("http request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),
}
