//! Synchronous hooks on alert transitions.

use pulse_core::Alert;

/// Receives alert lifecycle events from an [`crate::AlertEngine`].
///
/// Called after the engine has released its locks, in transition order.
/// A panicking observer is logged and does not affect other observers.
pub trait AlertObserver: Send + Sync {
    /// A rule crossed its threshold.
    fn on_alert(&self, _alert: &Alert) {}

    /// An active alert was resolved by a healthy result.
    fn on_resolve(&self, _alert: &Alert) {}
}
