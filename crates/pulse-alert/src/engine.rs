//! Alert engine: failure streaks and the alert lifecycle.
//!
//! Every service named by at least one rule gets its own
//! [`ServiceAlertState`] behind a mutex, created at construction. Results
//! for one service are therefore processed strictly in arrival order, while
//! different services never contend. The alert history has its own short
//! lock, always taken after a service lock.
//!
//! Observers run outside the service lock but one transition batch at a
//! time, in the order the batches were produced. An observer must not feed
//! results back into the engine.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, error, info};

use pulse_core::{epoch_millis, panic_message, Alert, AlertRule, AlertStatus, CheckResult};
use pulse_health::ResultHandler;

use crate::error::{AlertError, AlertResult};
use crate::notifier::{NotificationDispatcher, Notifier};
use crate::observer::AlertObserver;

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound for a single notifier delivery.
    pub notify_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

struct RuleSlot {
    rule: AlertRule,
    /// The live alert, owned here until it resolves.
    active: Option<Alert>,
}

struct ServiceAlertState {
    consecutive_failures: u32,
    /// Rules for this service in declaration order.
    rules: Vec<RuleSlot>,
}

#[derive(Default)]
struct AlertHistory {
    alerts: Vec<Alert>,
    /// alert id → position in `alerts`.
    index: HashMap<String, usize>,
}

impl AlertHistory {
    fn record(&mut self, alert: Alert) {
        self.index.insert(alert.id.clone(), self.alerts.len());
        self.alerts.push(alert);
    }

    fn replace(&mut self, alert: Alert) {
        match self.index.get(&alert.id) {
            Some(&pos) => self.alerts[pos] = alert,
            None => self.record(alert),
        }
    }
}

enum Transition {
    Triggered(Alert),
    Resolved(Alert),
}

/// Evaluates check results against alert rules.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    services: HashMap<String, Mutex<ServiceAlertState>>,
    history: Mutex<AlertHistory>,
    observers: RwLock<Vec<Arc<dyn AlertObserver>>>,
    dispatcher: NotificationDispatcher,
    /// Held while observers run; taken before the service lock is released.
    emission: Mutex<()>,
    next_seq: AtomicU64,
}

impl AlertEngine {
    /// Create an engine with the default notify timeout.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(rules: Vec<AlertRule>, notifier: Arc<dyn Notifier>) -> AlertResult<Self> {
        Self::with_options(rules, notifier, EngineOptions::default())
    }

    pub fn with_options(
        rules: Vec<AlertRule>,
        notifier: Arc<dyn Notifier>,
        options: EngineOptions,
    ) -> AlertResult<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(AlertError::DuplicateRule(rule.id.clone()));
            }
            if rule.consecutive_failures == 0 {
                return Err(AlertError::InvalidThreshold(rule.id.clone()));
            }
        }

        let mut grouped: HashMap<String, Vec<RuleSlot>> = HashMap::new();
        for rule in &rules {
            grouped
                .entry(rule.service_id.clone())
                .or_default()
                .push(RuleSlot {
                    rule: rule.clone(),
                    active: None,
                });
        }
        let services = grouped
            .into_iter()
            .map(|(service_id, rules)| {
                let state = ServiceAlertState {
                    consecutive_failures: 0,
                    rules,
                };
                (service_id, Mutex::new(state))
            })
            .collect();

        info!(rules = rules.len(), notifier = notifier.name(), "alert engine ready");

        Ok(Self {
            rules,
            services,
            history: Mutex::new(AlertHistory::default()),
            observers: RwLock::new(Vec::new()),
            dispatcher: NotificationDispatcher::spawn(notifier, options.notify_timeout),
            emission: Mutex::new(()),
            next_seq: AtomicU64::new(1),
        })
    }

    /// Register an observer at construction time.
    pub fn with_observer(mut self, observer: Arc<dyn AlertObserver>) -> Self {
        self.observers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
        self
    }

    pub fn subscribe(&self, observer: Arc<dyn AlertObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Feed one check result through every rule for its service.
    ///
    /// Results for services without rules are ignored.
    pub fn process_result(&self, result: &CheckResult) {
        let Some(state) = self.services.get(&result.service_id) else {
            return;
        };

        let mut transitions = Vec::new();
        let mut guard = lock(state);
        let state = &mut *guard;

        if result.status.is_healthy() {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        }
        let failures = state.consecutive_failures;

        for slot in &mut state.rules {
            if !result.status.is_healthy() {
                if failures >= slot.rule.consecutive_failures && slot.active.is_none() {
                    let alert = self.raise(&slot.rule, failures);
                    slot.active = Some(alert.clone());
                    lock(&self.history).record(alert.clone());
                    self.dispatcher.enqueue(alert.clone());
                    transitions.push(Transition::Triggered(alert));
                }
            } else if let Some(mut alert) = slot.active.take() {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(epoch_millis());
                info!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    service_id = %alert.service_id,
                    "alert resolved"
                );
                lock(&self.history).replace(alert.clone());
                self.dispatcher.enqueue(alert.clone());
                transitions.push(Transition::Resolved(alert));
            }
        }

        debug!(
            service_id = %result.service_id,
            status = %result.status,
            consecutive_failures = failures,
            "result evaluated"
        );

        if transitions.is_empty() {
            return;
        }

        // Claim the emission turn before releasing the service, so the next
        // result for this service cannot reach observers ahead of us.
        let _emitting = lock(&self.emission);
        drop(guard);
        self.emit(&transitions);
    }

    fn raise(&self, rule: &AlertRule, failures: u32) -> Alert {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let message = rule.description.clone().unwrap_or_else(|| {
            format!("{} failed {failures} consecutive health checks", rule.service_id)
        });
        let alert = Alert {
            id: format!("{}-{seq}", rule.id),
            rule_id: rule.id.clone(),
            service_id: rule.service_id.clone(),
            severity: rule.severity,
            status: AlertStatus::Active,
            message,
            triggered_at: epoch_millis(),
            resolved_at: None,
            consecutive_failures: failures,
        };
        info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            service_id = %rule.service_id,
            severity = %rule.severity,
            consecutive_failures = failures,
            "alert triggered"
        );
        alert
    }

    fn emit(&self, transitions: &[Transition]) {
        let observers: Vec<Arc<dyn AlertObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for transition in transitions {
            for observer in &observers {
                let (outcome, alert) = match transition {
                    Transition::Triggered(alert) => (
                        catch_unwind(AssertUnwindSafe(|| observer.on_alert(alert))),
                        alert,
                    ),
                    Transition::Resolved(alert) => (
                        catch_unwind(AssertUnwindSafe(|| observer.on_resolve(alert))),
                        alert,
                    ),
                };
                if let Err(panic) = outcome {
                    error!(
                        alert_id = %alert.id,
                        panic = %panic_message(panic.as_ref()),
                        "alert observer panicked"
                    );
                }
            }
        }
    }

    /// Alerts currently active, in trigger order.
    pub fn active_alerts(&self) -> Vec<Alert> {
        lock(&self.history)
            .alerts
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// Every alert ever raised, in trigger order.
    pub fn all_alerts(&self) -> Vec<Alert> {
        lock(&self.history).alerts.clone()
    }

    pub fn active_alert_for_rule(&self, rule_id: &str) -> Option<Alert> {
        lock(&self.history)
            .alerts
            .iter()
            .rev()
            .find(|a| a.rule_id == rule_id && a.is_active())
            .cloned()
    }

    /// Current failure streak, or `None` for services without rules.
    pub fn consecutive_failures(&self, service_id: &str) -> Option<u32> {
        self.services
            .get(service_id)
            .map(|state| lock(state).consecutive_failures)
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Wait for every notification enqueued so far to be handled.
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    /// Adapt the engine into a check-result subscriber.
    pub fn result_handler(self: &Arc<Self>) -> ResultHandler {
        let engine = Arc::clone(self);
        Arc::new(move |result: &CheckResult| -> anyhow::Result<()> {
            engine.process_result(result);
            Ok(())
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
