//! Scenario, iteration and evaluation-run records.
//!
//! The serde form of [`EvaluationRun`] is the persisted evaluation document
//! (`evaluation_data.json`); field names follow that document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check::CheckResult;

/// Outcome class of one scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Success,
    SimulationError,
}

/// Result of running one scenario against one controller artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRunResult {
    #[serde(rename = "scenario")]
    pub scenario_id: String,

    pub status: ScenarioStatus,

    /// Check results in suite order; empty for simulation errors.
    #[serde(rename = "results")]
    pub check_results: Vec<CheckResult>,

    /// Visual diagnostics report, when one was requested.
    #[serde(rename = "vision")]
    pub visual_report: Option<String>,

    /// Failure text for simulation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioRunResult {
    pub fn success(
        scenario_id: impl Into<String>,
        check_results: Vec<CheckResult>,
        visual_report: Option<String>,
    ) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            status: ScenarioStatus::Success,
            check_results,
            visual_report,
            error: None,
        }
    }

    pub fn simulation_error(scenario_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            status: ScenarioStatus::SimulationError,
            check_results: Vec::new(),
            visual_report: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ScenarioStatus::SimulationError
    }

    /// True when the simulation succeeded and every check passed.
    pub fn passed(&self) -> bool {
        !self.is_error() && self.check_results.iter().all(|r| r.success)
    }
}

/// One GENERATE/EVALUATE cycle, appended once and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    #[serde(rename = "iteration")]
    pub iteration_index: u32,

    /// SHA-256 digest of the evaluated controller source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_digest: Option<String>,

    pub static_metrics: BTreeMap<String, f64>,

    #[serde(rename = "static_analysis", default)]
    pub static_report: String,

    #[serde(rename = "run_success")]
    pub success_count: u32,

    #[serde(rename = "run_fail")]
    pub fail_count: u32,

    #[serde(rename = "run_error")]
    pub error_count: u32,

    #[serde(rename = "scenario_checks")]
    pub scenario_results: Vec<ScenarioRunResult>,
}

impl IterationRecord {
    /// The termination predicate: no failing checks and no errored scenarios.
    pub fn converged(&self) -> bool {
        self.fail_count == 0 && self.error_count == 0
    }

    /// Checks scored across all successfully simulated scenarios.
    pub fn total_checks(&self) -> u32 {
        self.success_count + self.fail_count
    }
}

/// Why an evaluation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    Converged,
    BudgetExhausted,
    SynthesisFailed,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalReason::Converged => "converged",
            TerminalReason::BudgetExhausted => "budget_exhausted",
            TerminalReason::SynthesisFailed => "synthesis_failed",
        };
        f.write_str(s)
    }
}

/// Suite-level facts carried into the evaluation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteHeader {
    pub task: String,
    pub requirement_specification: String,
    pub vision_enabled: bool,
    pub iteration_budget: u32,
}

/// Audit trail of one invocation of the refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,

    #[serde(flatten)]
    pub suite: SuiteHeader,

    iterations: Vec<IterationRecord>,

    /// Set exactly once, when the run reaches DONE.
    pub terminal_reason: Option<TerminalReason>,

    /// Failure text when the run aborted on synthesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl EvaluationRun {
    pub fn new(run_id: impl Into<String>, suite: SuiteHeader) -> Self {
        Self {
            run_id: run_id.into(),
            suite,
            iterations: Vec::new(),
            terminal_reason: None,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append the record of a completed iteration.
    pub fn push(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// Mark the run terminal. Later calls are ignored.
    pub fn finish(&mut self, reason: TerminalReason, failure: Option<String>) {
        if self.terminal_reason.is_some() {
            return;
        }
        self.terminal_reason = Some(reason);
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    pub fn latest(&self) -> Option<&IterationRecord> {
        self.iterations.last()
    }

    pub fn is_converged(&self) -> bool {
        self.terminal_reason == Some(TerminalReason::Converged)
    }

    /// Number of correction cycles after the initial generation.
    pub fn corrections_performed(&self) -> usize {
        self.iterations.len().saturating_sub(1)
    }
}
