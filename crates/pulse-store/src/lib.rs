//! pulse-store: volatile time-series store for check results.
//!
//! Keeps the most recent results per service in a capacity-bounded ring
//! and derives windowed uptime from them. Nothing is persisted; history
//! lives for the lifetime of the process.
//!
//! # Architecture
//!
//! ```text
//! TimeSeriesStore
//!   ├── RwLock<HashMap<service_id, Arc<Series>>>  (outer map, read-mostly)
//!   └── Series = Mutex<VecDeque<CheckResult>>      (one per service)
//! ```

pub mod store;

pub use store::{
    TimeSeriesStore, DEFAULT_CAPACITY, DEFAULT_RESULT_LIMIT, DEFAULT_UPTIME_WINDOW,
};
