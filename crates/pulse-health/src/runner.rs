//! Check runner: executes one check and fans the result out.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{error, info};

use pulse_core::{panic_message, CheckResult, ServiceDescriptor};
use pulse_store::TimeSeriesStore;

use crate::error::{SchedulerError, SchedulerResult};
use crate::http::HttpProbe;
use crate::probe::{Probe, ProbeKind};
use crate::tcp::TcpProbe;

/// Subscriber invoked synchronously with every stored check result.
///
/// An `Err` or a panic is logged and does not affect other handlers.
pub type ResultHandler = Arc<dyn Fn(&CheckResult) -> anyhow::Result<()> + Send + Sync>;

/// Resolves a probe for a service, runs it, persists the result, and
/// notifies subscribers.
pub struct CheckRunner {
    probes: HashMap<ProbeKind, Arc<dyn Probe>>,
    store: Arc<TimeSeriesStore>,
    handlers: RwLock<Vec<ResultHandler>>,
    /// Per-service turn for store-then-dispatch, so handlers observe results
    /// in the order they were stored.
    publish: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CheckRunner {
    /// Create a runner with no probes registered.
    pub fn new(store: Arc<TimeSeriesStore>) -> Self {
        Self {
            probes: HashMap::new(),
            store,
            handlers: RwLock::new(Vec::new()),
            publish: Mutex::new(HashMap::new()),
        }
    }

    /// Create a runner with the HTTP and TCP probes registered.
    pub fn with_default_probes(store: Arc<TimeSeriesStore>) -> SchedulerResult<Self> {
        Ok(Self::new(store)
            .with_probe(Arc::new(HttpProbe::new()?))
            .with_probe(Arc::new(TcpProbe)))
    }

    /// Register a probe, replacing any probe of the same kind.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probes.insert(probe.kind(), probe);
        self
    }

    pub fn store(&self) -> &Arc<TimeSeriesStore> {
        &self.store
    }

    /// Subscribe to check results. Handlers live as long as the runner.
    pub fn on_result(&self, handler: ResultHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Find the probe for a strategy key.
    pub fn resolve(&self, strategy: &str) -> SchedulerResult<Arc<dyn Probe>> {
        let kind: ProbeKind = strategy.parse()?;
        self.probes
            .get(&kind)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownStrategy(strategy.to_string()))
    }

    /// Run one check for `service`.
    ///
    /// Concurrent checks of one service may probe in parallel, but each
    /// result is stored and handed to the handlers before the next one is
    /// stored. Fails only when no probe is registered for the service's
    /// strategy.
    pub async fn run_check(&self, service: &ServiceDescriptor) -> SchedulerResult<CheckResult> {
        let probe = self.resolve(&service.strategy)?;

        let result = probe.check(service).await;

        let turn = self.publish_turn(&service.id);
        let _turn = turn.lock().await;
        self.store.save_result(result.clone()).await;

        info!(
            service_id = %service.id,
            status = %result.status,
            response_time_ms = result.response_time_ms,
            "check completed"
        );

        self.dispatch(&result);
        Ok(result)
    }

    fn publish_turn(&self, service_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.publish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(service_id.to_string())
            .or_default()
            .clone()
    }

    fn dispatch(&self, result: &CheckResult) {
        // Snapshot so a handler may subscribe further handlers.
        let handlers: Vec<ResultHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(result))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(service_id = %result.service_id, handler = index, error = %e, "result handler failed");
                }
                Err(panic) => {
                    error!(
                        service_id = %result.service_id,
                        handler = index,
                        panic = %panic_message(panic.as_ref()),
                        "result handler panicked"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pulse_core::CheckStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::probe::BoxFuture;

    /// Probe that replays scripted statuses (healthy once exhausted).
    pub(crate) struct ScriptedProbe {
        kind: ProbeKind,
        script: Mutex<VecDeque<CheckStatus>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedProbe {
        pub(crate) fn new(kind: ProbeKind) -> Self {
            Self {
                kind,
                script: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        pub(crate) fn with_script(self, statuses: &[CheckStatus]) -> Self {
            *self.script.lock().unwrap() = statuses.iter().copied().collect();
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Probe for ScriptedProbe {
        fn kind(&self) -> ProbeKind {
            self.kind
        }

        fn check<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, CheckResult> {
            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.calls.fetch_add(1, Ordering::SeqCst);
                let status = self
                    .script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(CheckStatus::Healthy);
                CheckResult::new(&service.id, status, 1)
            })
        }
    }

    pub(crate) fn service(id: &str, strategy: &str, interval_ms: u64) -> ServiceDescriptor {
        ServiceDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("http://{id}.internal/healthz"),
            strategy: strategy.to_string(),
            interval_ms,
            timeout_ms: 1000,
            metadata: HashMap::new(),
        }
    }

    fn runner_with(probe: Arc<ScriptedProbe>) -> CheckRunner {
        CheckRunner::new(Arc::new(TimeSeriesStore::new())).with_probe(probe)
    }

    #[tokio::test]
    async fn run_check_stores_result() {
        let probe = Arc::new(ScriptedProbe::new(ProbeKind::Http).with_script(&[CheckStatus::Unhealthy]));
        let runner = runner_with(probe.clone());

        let result = runner.run_check(&service("api", "http", 1000)).await.unwrap();
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert_eq!(probe.calls(), 1);

        let stored = runner.store().get_latest_result("api").await.unwrap();
        assert_eq!(stored, result);
    }

    #[tokio::test]
    async fn unknown_strategy_rejects_check() {
        let runner = runner_with(Arc::new(ScriptedProbe::new(ProbeKind::Http)));

        let err = runner.run_check(&service("bad", "gopher", 1000)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownStrategy(ref s) if s == "gopher"));
        assert!(runner.store().get_latest_result("bad").await.is_none());
    }

    #[tokio::test]
    async fn unregistered_kind_rejects_check() {
        // Only an HTTP probe is registered; "tcp" parses but has no probe.
        let runner = runner_with(Arc::new(ScriptedProbe::new(ProbeKind::Http)));

        let err = runner.run_check(&service("db", "tcp", 1000)).await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownStrategy(ref s) if s == "tcp"));
    }

    #[tokio::test]
    async fn handlers_receive_results_in_order() {
        let runner = runner_with(Arc::new(ScriptedProbe::new(ProbeKind::Http)));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            runner.on_result(Arc::new(move |r: &CheckResult| -> anyhow::Result<()> {
                seen.lock().unwrap().push(format!("{tag}:{}", r.service_id));
                Ok(())
            }));
        }
        assert_eq!(runner.handler_count(), 2);

        runner.run_check(&service("api", "http", 1000)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first:api", "second:api"]);
    }

    /// Tags every result with a sequence number.
    struct TaggingProbe {
        next: AtomicUsize,
    }

    impl Probe for TaggingProbe {
        fn kind(&self) -> ProbeKind {
            ProbeKind::Tcp
        }

        fn check<'a>(&'a self, service: &'a ServiceDescriptor) -> BoxFuture<'a, CheckResult> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                let n = self.next.fetch_add(1, Ordering::SeqCst);
                CheckResult::healthy(&service.id, 1).with_message(format!("#{n}"))
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handlers_observe_store_order_under_concurrency() {
        let runner = Arc::new(
            CheckRunner::new(Arc::new(TimeSeriesStore::new())).with_probe(Arc::new(TaggingProbe {
                next: AtomicUsize::new(0),
            })),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            runner.on_result(Arc::new(move |r: &CheckResult| -> anyhow::Result<()> {
                seen.lock().unwrap().push(r.message.clone());
                Ok(())
            }));
        }

        let svc = service("db", "tcp", 1000);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let runner = runner.clone();
            let svc = svc.clone();
            tasks.push(tokio::spawn(async move { runner.run_check(&svc).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored: Vec<Option<String>> = runner
            .store()
            .get_results("db", Some(100))
            .await
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(stored.len(), 32);
        assert_eq!(*seen.lock().unwrap(), stored);
    }

    #[tokio::test]
    async fn failing_handlers_are_isolated() {
        let runner = runner_with(Arc::new(ScriptedProbe::new(ProbeKind::Http)));
        let reached = Arc::new(AtomicUsize::new(0));

        runner.on_result(Arc::new(|_: &CheckResult| -> anyhow::Result<()> { anyhow::bail!("handler exploded") }));
        runner.on_result(Arc::new(|_: &CheckResult| -> anyhow::Result<()> { panic!("handler panicked") }));
        {
            let reached = reached.clone();
            runner.on_result(Arc::new(move |_: &CheckResult| -> anyhow::Result<()> {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }

        let result = runner.run_check(&service("api", "http", 1000)).await;
        assert!(result.is_ok());
        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }
}
