//! Check scheduler: one background task per monitored service.
//!
//! Each task runs a check immediately, then waits `interval` after the check
//! completes before running the next one. Tasks are stopped through a
//! per-service `watch` channel; a check already in flight is allowed to
//! finish and its result still reaches the store and result handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pulse_core::{CheckResult, ServiceDescriptor};

use crate::error::SchedulerResult;
use crate::runner::{CheckRunner, ResultHandler};

/// Lower bound on the delay between two checks of one service.
const MIN_INTERVAL: Duration = Duration::from_millis(100);

struct CheckSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl CheckSlot {
    fn signal(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Runs periodic checks for a set of services.
pub struct CheckScheduler {
    runner: Arc<CheckRunner>,
    /// Active tasks: service_id → slot.
    slots: Arc<RwLock<HashMap<String, CheckSlot>>>,
}

impl CheckScheduler {
    pub fn new(runner: Arc<CheckRunner>) -> Self {
        Self {
            runner,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn runner(&self) -> &Arc<CheckRunner> {
        &self.runner
    }

    /// Run a single check outside the periodic schedule.
    pub async fn run_check(&self, service: &ServiceDescriptor) -> SchedulerResult<CheckResult> {
        self.runner.run_check(service).await
    }

    /// Subscribe to every check result, periodic or on-demand.
    pub fn on_result(&self, handler: ResultHandler) {
        self.runner.on_result(handler);
    }

    /// Start a periodic check task for each service.
    ///
    /// A service that is already scheduled has its old task stopped first.
    pub async fn start_periodic_checks(&self, services: &[ServiceDescriptor]) {
        let mut slots = self.slots.write().await;

        for service in services {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let runner = self.runner.clone();
            let owned = service.clone();

            let handle = tokio::spawn(async move {
                run_check_loop(runner, owned, shutdown_rx).await;
            });

            if let Some(old) = slots.insert(
                service.id.clone(),
                CheckSlot {
                    handle,
                    shutdown_tx,
                },
            ) {
                old.signal();
                debug!(service_id = %service.id, "replaced existing check task");
            }

            info!(
                service_id = %service.id,
                strategy = %service.strategy,
                interval_ms = service.interval_ms,
                "periodic checks started"
            );
        }
    }

    /// Stop the periodic task for one service. Returns false if none was running.
    pub async fn stop(&self, service_id: &str) -> bool {
        let mut slots = self.slots.write().await;
        match slots.remove(service_id) {
            Some(slot) => {
                slot.signal();
                info!(%service_id, "periodic checks stopped");
                true
            }
            None => false,
        }
    }

    /// Signal every task to stop. Does not wait for in-flight checks.
    pub async fn stop_all(&self) {
        let mut slots = self.slots.write().await;
        for (service_id, slot) in slots.drain() {
            slot.signal();
            debug!(%service_id, "periodic checks stopped");
        }
        info!("all periodic checks stopped");
    }

    /// Stop every task and wait up to `grace` for in-flight checks to finish.
    ///
    /// Tasks still running after the grace period are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        let drained: Vec<(String, CheckSlot)> = self.slots.write().await.drain().collect();
        for (_, slot) in &drained {
            slot.signal();
        }

        let deadline = tokio::time::Instant::now() + grace;
        for (service_id, slot) in drained {
            let mut handle = slot.handle;
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(%service_id, "check did not finish within grace period, aborting");
                handle.abort();
            }
        }
        info!("check scheduler shut down");
    }

    /// Service ids with a running periodic task.
    pub async fn scheduled_services(&self) -> Vec<String> {
        let slots = self.slots.read().await;
        slots.keys().cloned().collect()
    }

    pub async fn is_scheduled(&self, service_id: &str) -> bool {
        let slots = self.slots.read().await;
        slots.contains_key(service_id)
    }
}

/// The fixed-delay check loop for a single service.
async fn run_check_loop(
    runner: Arc<CheckRunner>,
    service: ServiceDescriptor,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = service.interval().max(MIN_INTERVAL);
    debug!(service_id = %service.id, ?interval, "check loop starting");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Not raced against shutdown: an in-flight check always completes.
        if let Err(e) = runner.run_check(&service).await {
            warn!(service_id = %service.id, error = %e, "check failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!(service_id = %service.id, "check loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeKind;
    use crate::runner::tests::{service, ScriptedProbe};
    use pulse_store::TimeSeriesStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler_with(probe: Arc<ScriptedProbe>) -> CheckScheduler {
        let runner = CheckRunner::new(Arc::new(TimeSeriesStore::new())).with_probe(probe);
        CheckScheduler::new(Arc::new(runner))
    }

    async fn stored(scheduler: &CheckScheduler, service_id: &str) -> usize {
        scheduler
            .runner()
            .store()
            .get_results(service_id, Some(1000))
            .await
            .len()
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_every_interval() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("api", "http", 1000)])
            .await;
        assert!(scheduler.is_scheduled("api").await);

        // Checks at t=0, 1000, 2000.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(probe.calls(), 3);
        assert_eq!(stored(&scheduler, "api").await, 3);

        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_halts_future_checks() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("api", "http", 1000), service("web", "http", 1000)])
            .await;
        assert_eq!(scheduler.scheduled_services().await.len(), 2);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let before = probe.calls();
        assert_eq!(before, 4);

        scheduler.stop_all().await;
        assert!(scheduler.scheduled_services().await.is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls(), before);

        // Idempotent.
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_check_completes_after_stop() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http).with_delay(Duration::from_millis(500)));
        let scheduler = scheduler_with(probe.clone());

        let handled = Arc::new(AtomicUsize::new(0));
        {
            let handled = handled.clone();
            scheduler.on_result(Arc::new(move |_: &CheckResult| -> anyhow::Result<()> {
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }

        scheduler
            .start_periodic_checks(&[service("slow", "http", 1000)])
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop_all().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(stored(&scheduler, "slow").await, 1);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_strategy_does_not_affect_other_services() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("good", "http", 1000), service("bad", "gopher", 1000)])
            .await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(stored(&scheduler, "good").await, 3);
        assert_eq!(stored(&scheduler, "bad").await, 0);
        assert!(scheduler.is_scheduled("bad").await);

        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_a_service_replaces_its_task() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("api", "http", 1000)])
            .await;
        scheduler
            .start_periodic_checks(&[service("api", "http", 1000)])
            .await;
        assert_eq!(scheduler.scheduled_services().await, vec!["api".to_string()]);

        scheduler.stop_all().await;
        assert!(!scheduler.is_scheduled("api").await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_single_service() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("api", "http", 1000), service("web", "http", 1000)])
            .await;

        assert!(scheduler.stop("api").await);
        assert!(!scheduler.stop("api").await);
        assert_eq!(scheduler.scheduled_services().await, vec!["web".to_string()]);

        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_checks() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http).with_delay(Duration::from_millis(300)));
        let scheduler = scheduler_with(probe.clone());

        scheduler
            .start_periodic_checks(&[service("api", "http", 1000)])
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        scheduler.shutdown(Duration::from_secs(2)).await;
        // The in-flight result is stored by the time shutdown returns.
        assert_eq!(stored(&scheduler, "api").await, 1);
        assert!(scheduler.scheduled_services().await.is_empty());
    }

    #[tokio::test]
    async fn on_demand_check_goes_through_runner() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http));
        let scheduler = scheduler_with(probe.clone());

        let result = scheduler.run_check(&service("api", "http", 1000)).await.unwrap();
        assert!(result.status.is_healthy());
        assert_eq!(stored(&scheduler, "api").await, 1);
    }
}
