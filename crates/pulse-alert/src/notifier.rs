//! Notifier trait, the ordered dispatcher, and the built-in notifiers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use pulse_core::{panic_message, Alert, AlertStatus};
use pulse_health::BoxFuture;

/// Delivers alert transitions somewhere outside the process.
///
/// `notify` receives a snapshot: the alert as it was at the transition.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, anyhow::Result<()>>;
}

enum Dispatch {
    Event(Alert),
    Flush(oneshot::Sender<()>),
}

/// Detached, ordered delivery of alert snapshots to one notifier.
///
/// Enqueueing never blocks. A single background task delivers events in
/// enqueue order, each bounded by the notify timeout. Failures, panics, and
/// timeouts are logged and dropped.
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl NotificationDispatcher {
    /// Spawn the delivery task. Must be called within a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_dispatch_loop(notifier, timeout, rx));
        Self { tx }
    }

    pub fn enqueue(&self, alert: Alert) {
        if self.tx.send(Dispatch::Event(alert)).is_err() {
            warn!("notification dispatcher is gone, dropping alert");
        }
    }

    /// Wait until everything enqueued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_dispatch_loop(
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
) {
    debug!(notifier = notifier.name(), "notification dispatcher started");

    while let Some(item) = rx.recv().await {
        match item {
            Dispatch::Event(alert) => deliver(&notifier, alert, timeout).await,
            Dispatch::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!(notifier = notifier.name(), "notification dispatcher stopped");
}

async fn deliver(notifier: &Arc<dyn Notifier>, alert: Alert, timeout: Duration) {
    let alert_id = alert.id.clone();
    let status = alert.status;
    let target = notifier.clone();

    // Run in its own task so a panic, whether raised while building the
    // future or while polling it, surfaces as a JoinError.
    let mut handle = tokio::spawn(async move { target.notify(&alert).await });

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(()))) => {
            debug!(notifier = notifier.name(), %alert_id, ?status, "notification delivered");
        }
        Ok(Ok(Err(e))) => {
            error!(notifier = notifier.name(), %alert_id, error = %e, "notification failed");
        }
        Ok(Err(join_err)) => {
            let reason = if join_err.is_panic() {
                panic_message(join_err.into_panic().as_ref())
            } else {
                join_err.to_string()
            };
            error!(notifier = notifier.name(), %alert_id, panic = %reason, "notifier panicked");
        }
        Err(_) => {
            handle.abort();
            error!(
                notifier = notifier.name(),
                %alert_id,
                timeout_ms = timeout.as_millis() as u64,
                "notification timed out"
            );
        }
    }
}

/// Writes alert transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match alert.status {
                AlertStatus::Active => warn!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    service_id = %alert.service_id,
                    consecutive_failures = alert.consecutive_failures,
                    "ALERT [{}]: {}",
                    alert.severity,
                    alert.message
                ),
                AlertStatus::Resolved => info!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    service_id = %alert.service_id,
                    "RESOLVED: {}",
                    alert.message
                ),
            }
            Ok(())
        })
    }
}

/// Delivers to several notifiers in order.
///
/// Every notifier is tried, even after another one fails or panics. Failures
/// are collected into one error.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    fn notify<'a>(&'a self, alert: &'a Alert) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut failures = Vec::new();
            for notifier in &self.notifiers {
                // Each child runs in its own task so a panic is reported as a
                // failure. Dropping the set aborts the child if we are cancelled.
                let mut child = JoinSet::new();
                let target = notifier.clone();
                let snapshot = alert.clone();
                child.spawn(async move { target.notify(&snapshot).await });

                match child.join_next().await {
                    Some(Ok(Ok(()))) | None => {}
                    Some(Ok(Err(e))) => failures.push(format!("{}: {e:#}", notifier.name())),
                    Some(Err(join_err)) => {
                        let reason = if join_err.is_panic() {
                            panic_message(join_err.into_panic().as_ref())
                        } else {
                            join_err.to_string()
                        };
                        failures.push(format!("{}: panicked: {reason}", notifier.name()));
                    }
                }
            }
            if failures.is_empty() {
                Ok(())
            } else {
                anyhow::bail!("{} notifier(s) failed: {}", failures.len(), failures.join("; "))
            }
        })
    }
}
