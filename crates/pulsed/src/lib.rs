//! Assembly of the Pulse subsystems from a [`PulseConfig`].
//!
//! The binary in `main.rs` only parses flags, installs logging, and drives
//! a [`Daemon`]; everything here is reusable from tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing::info;

use pulse_alert::{AlertEngine, ConsoleNotifier, EngineOptions, FanoutNotifier, Notifier, WebhookNotifier};
use pulse_api::ApiState;
use pulse_core::config::NotifiersConfig;
use pulse_core::{PulseConfig, ServiceDescriptor, ServiceRegistry};
use pulse_health::{CheckRunner, CheckScheduler};
use pulse_store::TimeSeriesStore;

/// How long shutdown waits for in-flight checks.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// All long-lived Pulse components, wired together.
pub struct Daemon {
    services: Vec<ServiceDescriptor>,
    pub registry: Arc<ServiceRegistry>,
    pub store: Arc<TimeSeriesStore>,
    pub scheduler: Arc<CheckScheduler>,
    pub alerts: Arc<AlertEngine>,
}

impl Daemon {
    /// Build every subsystem. Must be called within a tokio runtime.
    pub fn build(config: &PulseConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;

        let services = config.service_descriptors()?;
        let registry = Arc::new(ServiceRegistry::new());
        for service in &services {
            registry.register(service.clone())?;
        }
        info!(services = registry.len(), "service registry loaded");

        let store = Arc::new(TimeSeriesStore::with_capacity(config.store.capacity));
        let runner = Arc::new(CheckRunner::with_default_probes(store.clone())?);
        let scheduler = Arc::new(CheckScheduler::new(runner));

        let notifier = build_notifier(&config.notifiers)?;
        let options = EngineOptions {
            notify_timeout: config.notify_timeout()?,
        };
        let alerts = Arc::new(AlertEngine::with_options(
            config.alerts.rules.clone(),
            notifier,
            options,
        )?);
        scheduler.on_result(alerts.result_handler());

        Ok(Self {
            services,
            registry,
            store,
            scheduler,
            alerts,
        })
    }

    pub fn router(&self) -> Router {
        pulse_api::build_router(ApiState::new(
            self.registry.clone(),
            self.store.clone(),
            self.scheduler.clone(),
            self.alerts.clone(),
        ))
    }

    /// Start periodic checks for every configured service.
    pub async fn start_checks(&self) {
        self.scheduler.start_periodic_checks(&self.services).await;
    }

    /// Stop checks, let in-flight ones finish, then drain notifications.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown(SHUTDOWN_GRACE).await;
        self.alerts.flush().await;
        info!("pending notifications flushed");
    }
}

fn build_notifier(config: &NotifiersConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if config.console {
        notifiers.push(Arc::new(ConsoleNotifier));
    }
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookNotifier::new(url)
            .with_context(|| format!("invalid webhook url {url}"))?
            .with_attempts(config.webhook_attempts);
        notifiers.push(Arc::new(webhook));
    }

    let names: Vec<&str> = notifiers.iter().map(|n| n.name()).collect();
    info!(notifiers = ?names, "notifiers configured");

    if notifiers.len() == 1 {
        return Ok(notifiers.remove(0));
    }
    Ok(Arc::new(FanoutNotifier::new(notifiers)))
}
