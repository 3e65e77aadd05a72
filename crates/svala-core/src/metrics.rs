//! Global atomic counters for refinement-loop observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of an evaluation run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters.
pub struct Metrics {
    scenarios_run: AtomicU64,
    simulation_errors: AtomicU64,
    synthesis_requests: AtomicU64,
    diagnostics_requests: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scenarios_run: AtomicU64::new(0),
            simulation_errors: AtomicU64::new(0),
            synthesis_requests: AtomicU64::new(0),
            diagnostics_requests: AtomicU64::new(0),
        }
    }

    pub fn inc_scenarios_run(&self) {
        self.scenarios_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scenarios_run", "counter incremented");
    }

    pub fn inc_simulation_errors(&self) {
        self.simulation_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "simulation_errors", "counter incremented");
    }

    pub fn inc_synthesis_requests(&self) {
        self.synthesis_requests.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "synthesis_requests", "counter incremented");
    }

    pub fn inc_diagnostics_requests(&self) {
        self.diagnostics_requests.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "diagnostics_requests", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scenarios_run = self.scenarios_run(),
            simulation_errors = self.simulation_errors(),
            synthesis_requests = self.synthesis_requests(),
            diagnostics_requests = self.diagnostics_requests(),
        );
    }

    pub fn scenarios_run(&self) -> u64 {
        self.scenarios_run.load(Ordering::Relaxed)
    }

    pub fn simulation_errors(&self) -> u64 {
        self.simulation_errors.load(Ordering::Relaxed)
    }

    pub fn synthesis_requests(&self) -> u64 {
        self.synthesis_requests.load(Ordering::Relaxed)
    }

    pub fn diagnostics_requests(&self) -> u64 {
        self.diagnostics_requests.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.scenarios_run.store(0, Ordering::Relaxed);
        self.simulation_errors.store(0, Ordering::Relaxed);
        self.synthesis_requests.store(0, Ordering::Relaxed);
        self.diagnostics_requests.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_scenarios_run();
        m.inc_scenarios_run();
        m.inc_simulation_errors();
        m.inc_synthesis_requests();
        m.inc_diagnostics_requests();
        m.inc_diagnostics_requests();
        m.inc_diagnostics_requests();

        assert_eq!(m.scenarios_run(), 2);
        assert_eq!(m.simulation_errors(), 1);
        assert_eq!(m.synthesis_requests(), 1);
        assert_eq!(m.diagnostics_requests(), 3);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_scenarios_run();
        m.inc_simulation_errors();
        m.inc_synthesis_requests();
        m.reset();
        assert_eq!(m.scenarios_run(), 0);
        assert_eq!(m.simulation_errors(), 0);
        assert_eq!(m.synthesis_requests(), 0);
    }
}
