use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("duplicate alert rule id: {0}")]
    DuplicateRule(String),

    #[error("alert rule {0}: consecutive_failures must be at least 1")]
    InvalidThreshold(String),
}

pub type AlertResult<T> = Result<T, AlertError>;
