//! Domain types for Pulse.
//!
//! These types describe monitored services, the results of probing them,
//! and the alerting rules and alerts derived from those results. All types
//! are plain values, serializable to/from JSON for the route layer.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::epoch_millis;

/// Unique identifier for a monitored service.
pub type ServiceId = String;

/// Unique identifier for an alerting rule.
pub type RuleId = String;

// ── Services ──────────────────────────────────────────────────────

/// A registered service to be probed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub name: String,
    /// Target address (`https://host/healthz`, `tcp://host:5432`, ...).
    pub url: String,
    /// Probe strategy key: "http", "tcp".
    pub strategy: String,
    /// Delay between the end of one check and the start of the next.
    pub interval_ms: u64,
    /// Upper bound for a single probe.
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ServiceDescriptor {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Check results ─────────────────────────────────────────────────

/// Outcome classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

impl CheckStatus {
    pub fn is_healthy(self) -> bool {
        self == CheckStatus::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Healthy => "healthy",
            CheckStatus::Unhealthy => "unhealthy",
            CheckStatus::Degraded => "degraded",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one service once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub response_time_ms: u64,
    /// Unix timestamp (milliseconds) when the probe finished.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn healthy(service_id: impl Into<String>, response_time_ms: u64) -> Self {
        Self::new(service_id, CheckStatus::Healthy, response_time_ms)
    }

    pub fn degraded(
        service_id: impl Into<String>,
        response_time_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(service_id, CheckStatus::Degraded, response_time_ms);
        result.message = Some(message.into());
        result
    }

    pub fn unhealthy(
        service_id: impl Into<String>,
        response_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(service_id, CheckStatus::Unhealthy, response_time_ms);
        result.error = Some(error.into());
        result
    }

    pub fn new(service_id: impl Into<String>, status: CheckStatus, response_time_ms: u64) -> Self {
        Self {
            service_id: service_id.into(),
            status,
            response_time_ms,
            timestamp: epoch_millis(),
            message: None,
            error: None,
        }
    }

    /// Override the timestamp (used when replaying or in tests).
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ── Alerting ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raise an alert for `service_id` after `consecutive_failures`
/// non-healthy results in a row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub id: RuleId,
    pub service_id: ServiceId,
    pub severity: Severity,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// An alert raised by a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub rule_id: RuleId,
    pub service_id: ServiceId,
    pub severity: Severity,
    pub status: AlertStatus,
    pub message: String,
    /// Unix timestamp (milliseconds).
    pub triggered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    /// Failure streak length when the alert fired.
    pub consecutive_failures: u32,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}
