//! Correction prompt construction.

use crate::aggregate::aggregate;
use crate::domain::run::IterationRecord;

pub const PLACEHOLDER_FAILED: &str = "{failed}";
pub const PLACEHOLDER_TOTAL: &str = "{total}";
pub const PLACEHOLDER_STATIC: &str = "{static_analysis}";
pub const PLACEHOLDER_REPORT: &str = "{report}";
pub const PLACEHOLDER_VERSION: &str = "{version}";

/// Placeholders every correction template must contain.
pub const REQUIRED_PLACEHOLDERS: [&str; 5] = [
    PLACEHOLDER_FAILED,
    PLACEHOLDER_TOTAL,
    PLACEHOLDER_STATIC,
    PLACEHOLDER_REPORT,
    PLACEHOLDER_VERSION,
];

/// Values substituted into a correction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionInputs<'a> {
    pub failed: u32,
    pub total: u32,
    pub static_analysis: &'a str,
    pub report: &'a str,
    pub version: u32,
}

impl<'a> CorrectionInputs<'a> {
    /// Inputs for the iteration following `previous`.
    pub fn from_record(previous: &'a IterationRecord, report: &'a str) -> Self {
        Self {
            failed: previous.fail_count,
            total: previous.total_checks(),
            static_analysis: &previous.static_report,
            report,
            version: previous.iteration_index + 1,
        }
    }
}

/// Substitute all placeholders in `template`.
///
/// The text blocks are substituted last so braces inside check messages or
/// static-analysis output are never interpreted as placeholders.
pub fn render_correction(template: &str, inputs: &CorrectionInputs<'_>) -> String {
    const STATIC_SLOT: &str = "\u{0}static\u{0}";
    const REPORT_SLOT: &str = "\u{0}report\u{0}";

    template
        .replace(PLACEHOLDER_STATIC, STATIC_SLOT)
        .replace(PLACEHOLDER_REPORT, REPORT_SLOT)
        .replace(PLACEHOLDER_FAILED, &inputs.failed.to_string())
        .replace(PLACEHOLDER_TOTAL, &inputs.total.to_string())
        .replace(PLACEHOLDER_VERSION, &inputs.version.to_string())
        .replace(STATIC_SLOT, inputs.static_analysis)
        .replace(REPORT_SLOT, inputs.report)
}

/// Build the correction prompt requesting the artifact after `previous`.
pub fn correction_prompt(template: &str, previous: &IterationRecord) -> String {
    let report = aggregate(&previous.scenario_results).report_text;
    render_correction(template, &CorrectionInputs::from_record(previous, &report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check::CheckResult;
    use crate::domain::run::ScenarioRunResult;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let inputs = CorrectionInputs {
            failed: 2,
            total: 5,
            static_analysis: "density 0.8",
            report: "Fail: too fast",
            version: 3,
        };
        let out = render_correction(
            "failed {failed}/{total}\n{static_analysis}\n{report}\nversion {version}",
            &inputs,
        );
        assert_eq!(out, "failed 2/5\ndensity 0.8\nFail: too fast\nversion 3");
    }

    #[test]
    fn test_braces_in_report_are_not_expanded() {
        let inputs = CorrectionInputs {
            failed: 1,
            total: 1,
            static_analysis: "{version}",
            report: "{failed}",
            version: 9,
        };
        let out = render_correction("{static_analysis}|{report}|{version}", &inputs);
        assert_eq!(out, "{version}|{failed}|9");
    }

    #[test]
    fn test_correction_prompt_from_record() {
        let record = IterationRecord {
            iteration_index: 0,
            controller_digest: None,
            static_metrics: BTreeMap::new(),
            static_report: "lines_of_code: 40".to_string(),
            success_count: 1,
            fail_count: 1,
            error_count: 0,
            scenario_results: vec![ScenarioRunResult::success(
                "cut-in",
                vec![
                    CheckResult::pass("a", "fine"),
                    CheckResult::fail("b", "collided"),
                ],
                None,
            )],
        };
        let prompt = correction_prompt(
            "{failed} of {total}; {static_analysis}; {report}; v{version}",
            &record,
        );
        assert_eq!(
            prompt,
            "1 of 2; lines_of_code: 40; Log based report for scenario: cut-in:\nPass: fine\nFail: collided; v1"
        );
    }
}
