//! pulse-alert: turns check results into alerts and delivers them.
//!
//! The [`AlertEngine`] tracks a consecutive-failure counter per service and
//! evaluates every [`pulse_core::AlertRule`] targeting that service. A rule
//! whose threshold is reached raises an [`pulse_core::Alert`]; the next
//! healthy result resolves it. Each transition is handed to a
//! [`Notifier`] through a detached, ordered [`NotificationDispatcher`] and
//! reported to registered [`AlertObserver`]s.
//!
//! ```text
//! CheckRunner ──ResultHandler──▶ AlertEngine::process_result()
//!                                  ├── per-service failure streak
//!                                  ├── rule evaluation → Alert
//!                                  ├── NotificationDispatcher ──▶ Notifier (console, webhook, ...)
//!                                  └── AlertObserver callbacks
//! ```

pub mod engine;
pub mod error;
pub mod notifier;
pub mod observer;
pub mod webhook;

pub use engine::{AlertEngine, EngineOptions, DEFAULT_NOTIFY_TIMEOUT};
pub use error::{AlertError, AlertResult};
pub use notifier::{ConsoleNotifier, FanoutNotifier, NotificationDispatcher, Notifier};
pub use observer::AlertObserver;
pub use webhook::WebhookNotifier;
