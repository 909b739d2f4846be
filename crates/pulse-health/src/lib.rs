//! pulse-health: probing and check scheduling for Pulse.
//!
//! Provides HTTP and TCP probes behind a common [`Probe`] trait, a
//! [`CheckRunner`] that executes one check, stores the result, and fans it
//! out to subscribers, and a [`CheckScheduler`] that runs a background task
//! per service.
//!
//! # Architecture
//!
//! ```text
//! CheckScheduler
//!   └── Per-service background task (fixed-delay loop)
//!       └── CheckRunner::run_check()
//!           ├── Probe (http | tcp) → CheckResult
//!           ├── TimeSeriesStore::save_result()
//!           └── ResultHandler fan-out (alert engine, ...)
//! ```
//!
//! Probe failures are data, not errors: a refused connection or a timeout
//! yields an `unhealthy` [`pulse_core::CheckResult`]. The only error a check
//! can return is an unknown probe strategy.

pub mod error;
pub mod http;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod tcp;
pub mod transport;

pub use error::{SchedulerError, SchedulerResult, TransportError};
pub use http::HttpProbe;
pub use probe::{BoxFuture, Probe, ProbeKind};
pub use runner::{CheckRunner, ResultHandler};
pub use scheduler::CheckScheduler;
pub use tcp::TcpProbe;
pub use transport::{HttpClient, Target};
