//! Human-readable rendering of an evaluation run.

use std::fmt::Write;

use crate::aggregate::aggregate;
use crate::domain::run::{EvaluationRun, IterationRecord, TerminalReason};

/// Log section for one iteration: static analysis, then the scenario reports.
pub fn render_iteration(record: &IterationRecord) -> String {
    let mut out = String::new();
    if !record.static_report.is_empty() {
        out.push_str(record.static_report.trim_end());
        out.push_str("\n\n");
    }
    let _ = writeln!(out, "Iteration {} reports:", record.iteration_index);
    let report = aggregate(&record.scenario_results).report_text;
    if !report.is_empty() {
        out.push_str(&report);
        out.push_str("\n\n");
    }
    out
}

/// Closing sentence of the cumulative log.
pub fn final_statement(run: &EvaluationRun) -> String {
    match run.terminal_reason {
        Some(TerminalReason::SynthesisFailed) => format!(
            "The run was aborted after {} iterations of corrections: {}\n",
            run.corrections_performed(),
            run.failure.as_deref().unwrap_or("controller synthesis failed")
        ),
        None => format!(
            "Run in progress: {} iterations of corrections performed so far.\n",
            run.corrections_performed()
        ),
        Some(_) => format!(
            "{} iterations of corrections were performed. The final controller was {}.\n",
            run.corrections_performed(),
            if run.is_converged() {
                "successful"
            } else {
                "unsuccessful"
            }
        ),
    }
}

/// Full cumulative log of `run`.
pub fn render_cumulative_log(run: &EvaluationRun) -> String {
    let mut out = String::new();
    for record in run.iterations() {
        out.push_str(&render_iteration(record));
    }
    out.push_str(&final_statement(run));
    out
}

/// One line per iteration with its tallies, for terminal summaries.
pub fn render_summary(run: &EvaluationRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "run {} ({})", run.run_id, run.suite.task);
    for record in run.iterations() {
        let _ = writeln!(
            out,
            "  iteration {}: {} passed, {} failed, {} errored",
            record.iteration_index, record.success_count, record.fail_count, record.error_count
        );
    }
    match run.terminal_reason {
        Some(reason) => {
            let _ = write!(out, "terminal reason: {}", reason);
        }
        None => out.push_str("terminal reason: (still running)"),
    }
    if let Some(failure) = &run.failure {
        let _ = write!(out, "\nfailure: {}", failure);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check::CheckResult;
    use crate::domain::run::{ScenarioRunResult, SuiteHeader};
    use std::collections::BTreeMap;

    fn run_with(fails: &[u32]) -> EvaluationRun {
        let mut run = EvaluationRun::new(
            "run-1",
            SuiteHeader {
                task: "ACC".to_string(),
                requirement_specification: "keep distance".to_string(),
                vision_enabled: false,
                iteration_budget: 3,
            },
        );
        for (i, fail) in fails.iter().enumerate() {
            let check = if *fail == 0 {
                CheckResult::pass("max_ego_speed", "ok")
            } else {
                CheckResult::fail("max_ego_speed", "too fast")
            };
            run.push(IterationRecord {
                iteration_index: i as u32,
                controller_digest: None,
                static_metrics: BTreeMap::new(),
                static_report: format!("lines_of_code: {}", 10 + i),
                success_count: u32::from(*fail == 0),
                fail_count: *fail,
                error_count: 0,
                scenario_results: vec![ScenarioRunResult::success("follow", vec![check], None)],
            });
        }
        run
    }

    #[test]
    fn test_log_contains_each_iteration_in_order() {
        let mut run = run_with(&[1, 0]);
        run.finish(TerminalReason::Converged, None);
        let log = render_cumulative_log(&run);

        let first = log.find("Iteration 0 reports:").expect("iteration 0");
        let second = log.find("Iteration 1 reports:").expect("iteration 1");
        assert!(first < second);
        assert!(log.contains("lines_of_code: 11"));
        assert!(log.contains("Fail: too fast"));
        assert!(log.ends_with(
            "1 iterations of corrections were performed. The final controller was successful.\n"
        ));
    }

    #[test]
    fn test_budget_exhausted_is_unsuccessful() {
        let mut run = run_with(&[1, 1, 1, 1]);
        run.finish(TerminalReason::BudgetExhausted, None);
        assert_eq!(
            final_statement(&run),
            "3 iterations of corrections were performed. The final controller was unsuccessful.\n"
        );
    }

    #[test]
    fn test_unfinished_run_has_no_verdict() {
        let run = run_with(&[1, 1]);
        assert_eq!(
            final_statement(&run),
            "Run in progress: 1 iterations of corrections performed so far.\n"
        );
    }

    #[test]
    fn test_synthesis_failure_statement() {
        let mut run = run_with(&[1]);
        run.finish(
            TerminalReason::SynthesisFailed,
            Some("synthesis failed for iteration 1: timeout".to_string()),
        );
        let statement = final_statement(&run);
        assert!(statement.starts_with("The run was aborted after 0 iterations"));
        assert!(statement.contains("timeout"));
    }

    #[test]
    fn test_summary_lists_tallies() {
        let mut run = run_with(&[2]);
        run.finish(TerminalReason::BudgetExhausted, None);
        let summary = render_summary(&run);
        assert!(summary.contains("iteration 0: 0 passed, 2 failed, 0 errored"));
        assert!(summary.ends_with("terminal reason: budget_exhausted"));
    }
}
