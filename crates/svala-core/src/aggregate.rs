//! Aggregator and report assembler.
//!
//! Folds per-scenario results into suite-level tallies and the report text
//! that is embedded verbatim into the next correction prompt.

use crate::collaborators::StaticReport;
use crate::domain::artifact::ControllerArtifact;
use crate::domain::run::{IterationRecord, ScenarioRunResult, ScenarioStatus};

/// Suite-level tallies and report text for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    /// Passing checks across all successfully simulated scenarios.
    pub success_count: u32,

    /// Failing checks across all successfully simulated scenarios.
    pub fail_count: u32,

    /// Scenarios that ended in a simulation error.
    pub error_count: u32,

    pub report_text: String,
}

/// Tally `results` and render their report sections in order.
pub fn aggregate(results: &[ScenarioRunResult]) -> AggregateReport {
    let mut report = AggregateReport::default();
    let mut sections = Vec::with_capacity(results.len());

    for result in results {
        match result.status {
            ScenarioStatus::SimulationError => {
                report.error_count += 1;
                sections.push(format!(
                    "Scenario {}: attempt to use the controller file resulted in a crash. Error message: {}",
                    result.scenario_id,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            ScenarioStatus::Success => {
                let passed = result.check_results.iter().filter(|r| r.success).count() as u32;
                report.success_count += passed;
                report.fail_count += result.check_results.len() as u32 - passed;

                let lines: Vec<String> =
                    result.check_results.iter().map(|r| r.report_line()).collect();
                sections.push(format!(
                    "Log based report for scenario: {}:\n{}",
                    result.scenario_id,
                    lines.join("\n")
                ));
                if let Some(visual) = &result.visual_report {
                    sections.push(format!(
                        "Vision based report for scenario {}:\n{}",
                        result.scenario_id, visual
                    ));
                }
            }
        }
    }

    report.report_text = sections.join("\n\n");
    report
}

/// Build the immutable record of one evaluated iteration.
pub fn assemble_record(
    iteration: u32,
    artifact: &ControllerArtifact,
    static_report: &StaticReport,
    scenario_results: Vec<ScenarioRunResult>,
) -> IterationRecord {
    let tally = aggregate(&scenario_results);
    IterationRecord {
        iteration_index: iteration,
        controller_digest: Some(artifact.digest.clone()),
        static_metrics: static_report.metrics.clone(),
        static_report: static_report.text.clone(),
        success_count: tally.success_count,
        fail_count: tally.fail_count,
        error_count: tally.error_count,
        scenario_results,
    }
}
