//! Structured observability hooks for the refinement loop.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: run start, synthesis,
//!   scenario completion, iteration evaluation and run finish
//!
//! Every event carries a stable `event` key so log pipelines can filter on it.

use tracing::{info, warn};

use crate::domain::run::{IterationRecord, ScenarioRunResult, TerminalReason};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id and task.
    pub fn enter(run_id: &str, task: &str) -> Self {
        let span = tracing::info_span!("svala.run", run_id = %run_id, task = %task);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, task: &str, scenarios: usize, budget: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        task = %task,
        scenarios = scenarios,
        iteration_budget = budget,
    );
}

pub fn emit_iteration_started(iteration: u32) {
    info!(event = "iteration.started", iteration = iteration);
}

pub fn emit_synthesis_completed(iteration: u32, digest: &str) {
    info!(event = "synthesis.completed", iteration = iteration, digest = %digest);
}

/// Emit event: synthesis failure (warning level; the run aborts).
pub fn emit_synthesis_failed(iteration: u32, error: &dyn std::fmt::Display) {
    warn!(event = "synthesis.failed", iteration = iteration, error = %error);
}

pub fn emit_scenario_finished(iteration: u32, result: &ScenarioRunResult) {
    let passed = result.check_results.iter().filter(|r| r.success).count();
    info!(
        event = "scenario.finished",
        iteration = iteration,
        scenario = %result.scenario_id,
        status = ?result.status,
        checks = result.check_results.len(),
        passed = passed,
    );
}

pub fn emit_iteration_evaluated(record: &IterationRecord) {
    info!(
        event = "iteration.evaluated",
        iteration = record.iteration_index,
        run_success = record.success_count,
        run_fail = record.fail_count,
        run_error = record.error_count,
        converged = record.converged(),
    );
}

pub fn emit_run_finished(run_id: &str, reason: TerminalReason, iterations: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        terminal_reason = %reason,
        iterations = iterations,
    );
}

/// Emit event: an archive write failed (warning level; the run continues).
pub fn emit_artifact_write_error(what: &str, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.write_error", artifact = %what, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id", "CAEM");
    }
}
