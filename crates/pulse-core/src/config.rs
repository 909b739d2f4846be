//! pulse.toml configuration parser.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::parse_duration;
use crate::types::{AlertRule, ServiceDescriptor};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub defaults: CheckDefaults,
    pub store: StoreConfig,
    pub alerts: AlertsConfig,
    pub notifiers: NotifiersConfig,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Fallbacks for services that omit `interval` or `timeout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckDefaults {
    pub interval: String,
    pub timeout: String,
}

impl Default for CheckDefaults {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Results retained per service.
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub notify_timeout: String,
    pub rules: Vec<AlertRule>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notify_timeout: "10s".to_string(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifiersConfig {
    pub console: bool,
    pub webhook_url: Option<String>,
    pub webhook_attempts: u32,
}

impl Default for NotifiersConfig {
    fn default() -> Self {
        Self {
            console: true,
            webhook_url: None,
            webhook_attempts: 3,
        }
    }
}

/// A `[[services]]` entry as written in pulse.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
    pub strategy: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl PulseConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Resolve `[[services]]` into descriptors, applying `[defaults]`.
    pub fn service_descriptors(&self) -> CoreResult<Vec<ServiceDescriptor>> {
        let default_interval = duration_field("defaults.interval", &self.defaults.interval)?;
        let default_timeout = duration_field("defaults.timeout", &self.defaults.timeout)?;

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.services.len());

        for svc in &self.services {
            if !seen.insert(svc.id.as_str()) {
                return Err(CoreError::DuplicateService(svc.id.clone()));
            }

            let interval = match &svc.interval {
                Some(raw) => duration_field(&format!("services.{}.interval", svc.id), raw)?,
                None => default_interval,
            };
            let timeout = match &svc.timeout {
                Some(raw) => duration_field(&format!("services.{}.timeout", svc.id), raw)?,
                None => default_timeout,
            };

            if interval.is_zero() {
                return Err(CoreError::InvalidService {
                    id: svc.id.clone(),
                    reason: "interval must be greater than zero".to_string(),
                });
            }

            descriptors.push(ServiceDescriptor {
                id: svc.id.clone(),
                name: svc.name.clone().unwrap_or_else(|| svc.id.clone()),
                url: svc.url.clone(),
                strategy: svc.strategy.clone().unwrap_or_else(|| "http".to_string()),
                interval_ms: millis(&svc.id, "interval", interval)?,
                timeout_ms: millis(&svc.id, "timeout", timeout)?,
                metadata: svc.metadata.clone().unwrap_or_default(),
            });
        }

        Ok(descriptors)
    }

    pub fn notify_timeout(&self) -> CoreResult<Duration> {
        duration_field("alerts.notify_timeout", &self.alerts.notify_timeout)
    }

    /// Check the whole file for errors that would only surface later.
    ///
    /// Rules that point at unknown services are logged, not rejected.
    pub fn validate(&self) -> CoreResult<()> {
        let services = self.service_descriptors()?;
        self.notify_timeout()?;

        let known: HashSet<&str> = services.iter().map(|s| s.id.as_str()).collect();
        for rule in &self.alerts.rules {
            if !known.contains(rule.service_id.as_str()) {
                warn!(rule_id = %rule.id, service_id = %rule.service_id, "alert rule targets an unknown service");
            }
        }
        Ok(())
    }
}

impl FromStr for PulseConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Ok(toml::from_str(s)?)
    }
}

fn millis(id: &str, field: &str, value: Duration) -> CoreResult<u64> {
    u64::try_from(value.as_millis()).map_err(|_| CoreError::InvalidService {
        id: id.to_string(),
        reason: format!("{field} is out of range"),
    })
}

fn duration_field(field: &str, value: &str) -> CoreResult<Duration> {
    parse_duration(value).ok_or_else(|| CoreError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
    })
}
