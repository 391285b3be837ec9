//! Reconcile counters exposed on `/metrics`
//!
//! Plain atomics rendered in the Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing reconcile activity since process start
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    /// Reconcile passes started
    pub passes_total: AtomicU64,
    /// Deployments created
    pub deployments_created_total: AtomicU64,
    /// Deployments updated to correct drift
    pub deployments_updated_total: AtomicU64,
    /// HelloApp status writes
    pub status_updates_total: AtomicU64,
    /// Passes that ended in an error
    pub errors_total: AtomicU64,
}

impl ReconcileMetrics {
    /// Create a zeroed metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a reconcile pass
    pub fn record_pass(&self) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Deployment creation
    pub fn record_created(&self) {
        self.deployments_created_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Deployment update
    pub fn record_updated(&self) {
        self.deployments_updated_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a status write
    pub fn record_status_update(&self) {
        self.status_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed pass
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Render all counters in Prometheus text format
    pub fn render(&self) -> String {
        let counters = [
            (
                "hello_operator_reconcile_passes_total",
                "Reconcile passes started",
                &self.passes_total,
            ),
            (
                "hello_operator_deployments_created_total",
                "Deployments created",
                &self.deployments_created_total,
            ),
            (
                "hello_operator_deployments_updated_total",
                "Deployments updated to correct drift",
                &self.deployments_updated_total,
            ),
            (
                "hello_operator_status_updates_total",
                "HelloApp status writes",
                &self.status_updates_total,
            ),
            (
                "hello_operator_reconcile_errors_total",
                "Reconcile passes that ended in an error",
                &self.errors_total,
            ),
        ];

        let mut out = String::new();
        for (name, help, counter) in counters {
            // writing to a String cannot fail
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", counter.load(Ordering::Relaxed));
        }
        out
    }
}
