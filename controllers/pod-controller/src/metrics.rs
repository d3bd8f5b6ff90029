//! Prometheus metrics.

use crate::error::ControllerError;
use crate::event::EventKind;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::fmt;

/// Outcome label for a failed reconciliation.
pub const OUTCOME_ERROR: &str = "error";

/// Controller metrics, registered in their own registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    events: IntCounterVec,
    reconciles: IntCounterVec,
    requeues: IntCounter,
    dropped: IntCounter,
    queue_depth: IntGauge,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("requeues", &self.requeues.get())
            .field("dropped", &self.dropped.get())
            .field("queue_depth", &self.queue_depth.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates and registers every controller metric.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Metrics`] if a metric cannot be registered.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let events = IntCounterVec::new(
            Opts::new("podctl_events_total", "Object changes observed by the informer"),
            &["kind"],
        )?;
        let reconciles = IntCounterVec::new(
            Opts::new("podctl_reconcile_total", "Reconciliations by outcome"),
            &["outcome"],
        )?;
        let requeues = IntCounter::new(
            "podctl_requeues_total",
            "Failed items put back with a rate-limited delay",
        )?;
        let dropped = IntCounter::new(
            "podctl_dropped_total",
            "Items dropped after exhausting their retry budget",
        )?;
        let queue_depth = IntGauge::new("podctl_queue_depth", "Items waiting in the work queue")?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(requeues.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            events,
            reconciles,
            requeues,
            dropped,
            queue_depth,
        })
    }

    /// Counts one change reported by the informer.
    pub fn observe_event(&self, kind: EventKind) {
        self.events.with_label_values(&[kind.as_str()]).inc();
    }

    /// Counts one finished reconciliation under its outcome label.
    pub fn observe_reconcile(&self, outcome: &str) {
        self.reconciles.with_label_values(&[outcome]).inc();
    }

    /// Counts one rate-limited requeue after a failure.
    pub fn observe_requeue(&self) {
        self.requeues.inc();
    }

    /// Counts one item dropped after exhausting its retries.
    pub fn observe_drop(&self) {
        self.dropped.inc();
    }

    /// Records how many items are waiting in the work queue.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Renders every metric in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Metrics`] if encoding fails.
    pub fn render(&self) -> Result<String, ControllerError> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }

    #[cfg(test)]
    pub(crate) fn reconcile_count(&self, outcome: &str) -> u64 {
        self.reconciles.with_label_values(&[outcome]).get()
    }

    #[cfg(test)]
    pub(crate) fn requeue_count(&self) -> u64 {
        self.requeues.get()
    }

    #[cfg(test)]
    pub(crate) fn drop_count(&self) -> u64 {
        self.dropped.get()
    }
}
