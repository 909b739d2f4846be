//! Time-series store: per-service check history.
//!
//! Each service gets its own mutex-protected ring buffer, so writers for
//! different services only share the brief read lock on the outer map.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use pulse_core::{epoch_millis, CheckResult};

/// Results retained per service before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Results returned by `get_results` when no limit is given.
pub const DEFAULT_RESULT_LIMIT: usize = 100;

/// Window used by `get_uptime` when none is given.
pub const DEFAULT_UPTIME_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

type Series = Mutex<VecDeque<CheckResult>>;

/// Capacity-bounded history of check results, keyed by service id.
pub struct TimeSeriesStore {
    series: RwLock<HashMap<String, Arc<Series>>>,
    capacity: usize,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a store that keeps at most `capacity` results per service.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a result, evicting the oldest entries once over capacity.
    pub async fn save_result(&self, result: CheckResult) {
        let series = self.series_for(&result.service_id).await;
        let mut history = series.lock().await;
        history.push_back(result);

        let overflow = history.len().saturating_sub(self.capacity);
        if overflow > 0 {
            history.drain(..overflow);
        }
    }

    /// The most recent `limit` results (default 100), oldest first.
    pub async fn get_results(&self, service_id: &str, limit: Option<usize>) -> Vec<CheckResult> {
        let Some(series) = self.lookup(service_id).await else {
            return Vec::new();
        };
        let limit = limit.unwrap_or(DEFAULT_RESULT_LIMIT);
        let history = series.lock().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub async fn get_latest_result(&self, service_id: &str) -> Option<CheckResult> {
        let series = self.lookup(service_id).await?;
        let history = series.lock().await;
        history.back().cloned()
    }

    /// Fraction of healthy results within `window` (default 24h) of now.
    ///
    /// Returns 0.0 when no result falls in the window.
    pub async fn get_uptime(&self, service_id: &str, window: Option<Duration>) -> f64 {
        self.uptime_at(service_id, window, epoch_millis()).await
    }

    /// `get_uptime` evaluated at an explicit `now_ms`.
    pub async fn uptime_at(&self, service_id: &str, window: Option<Duration>, now_ms: u64) -> f64 {
        let Some(series) = self.lookup(service_id).await else {
            return 0.0;
        };
        let window_ms = window.unwrap_or(DEFAULT_UPTIME_WINDOW).as_millis() as u64;
        let cutoff = now_ms.saturating_sub(window_ms);

        let history = series.lock().await;
        let (healthy, total) = history
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .fold((0usize, 0usize), |(healthy, total), r| {
                (healthy + usize::from(r.status.is_healthy()), total + 1)
            });

        if total == 0 {
            return 0.0;
        }
        healthy as f64 / total as f64
    }

    /// Latest result for every service that has one.
    pub async fn get_all_latest(&self) -> HashMap<String, CheckResult> {
        let series = self.series.read().await;
        let mut latest = HashMap::with_capacity(series.len());
        for (service_id, s) in series.iter() {
            if let Some(result) = s.lock().await.back() {
                latest.insert(service_id.clone(), result.clone());
            }
        }
        latest
    }

    /// Ids of services with stored history.
    pub async fn service_ids(&self) -> Vec<String> {
        let series = self.series.read().await;
        series.keys().cloned().collect()
    }

    async fn lookup(&self, service_id: &str) -> Option<Arc<Series>> {
        let series = self.series.read().await;
        series.get(service_id).cloned()
    }

    async fn series_for(&self, service_id: &str) -> Arc<Series> {
        if let Some(existing) = self.lookup(service_id).await {
            return existing;
        }

        let mut series = self.series.write().await;
        series
            .entry(service_id.to_string())
            .or_insert_with(|| {
                debug!(%service_id, "tracking new service history");
                Arc::new(Mutex::new(VecDeque::new()))
            })
            .clone()
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}
