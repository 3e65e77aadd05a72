//! Scenario test runner: one scenario, one artifact, one result.
//!
//! [`ScenarioTestRunner::run`] never returns an error. Engine launch
//! failures, crashes, early termination and unreadable telemetry all become a
//! [`ScenarioRunResult`] with `status = SimulationError` so the surrounding
//! scenario loop always completes. Visual diagnostics are best-effort and
//! never change a run's status.

use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::checks;
use crate::collaborators::{
    DiagnosticsRequest, SimulationEngine, SimulationOutcome, SimulationRequest, VisualDiagnostics,
};
use crate::domain::artifact::ControllerArtifact;
use crate::domain::check::CheckResult;
use crate::domain::run::ScenarioRunResult;
use crate::domain::suite::ScenarioTests;
use crate::metrics::METRICS;

/// Fewer executed steps than this means the engine or controller died early.
pub const DEFAULT_MIN_STEPS: u64 = 24;

/// Runner behaviour shared by every scenario of a suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub vision_enabled: bool,

    /// Simulator frames between captured screenshots.
    pub capture_interval: u64,

    pub min_steps: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            vision_enabled: false,
            capture_interval: 10,
            min_steps: DEFAULT_MIN_STEPS,
        }
    }
}

/// Per-invocation inputs of a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioContext<'a> {
    pub task: &'a str,
    pub iteration: u32,
    pub controller: &'a ControllerArtifact,

    /// Directory owned by this scenario run.
    pub output_dir: PathBuf,
}

/// Drives single scenarios through the simulation engine and scores them.
pub struct ScenarioTestRunner<'a> {
    engine: &'a dyn SimulationEngine,
    diagnostics: Option<&'a dyn VisualDiagnostics>,
    config: RunnerConfig,
}

impl<'a> ScenarioTestRunner<'a> {
    pub fn new(engine: &'a dyn SimulationEngine, config: RunnerConfig) -> Self {
        Self {
            engine,
            diagnostics: None,
            config,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a dyn VisualDiagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Run `scenario` against the context's controller.
    pub async fn run(&self, ctx: &ScenarioContext<'_>, scenario: &ScenarioTests) -> ScenarioRunResult {
        METRICS.inc_scenarios_run();

        let request = SimulationRequest {
            scenario_id: &scenario.id,
            controller: ctx.controller,
            capture_interval: self.config.capture_interval,
            output_dir: ctx.output_dir.clone(),
        };

        let outcome = match self.engine.simulate(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_scenario_level() {
                    warn!(scenario = %scenario.id, error = %e, "simulation failed");
                } else {
                    error!(scenario = %scenario.id, error = %e, "unexpected error while simulating");
                }
                METRICS.inc_simulation_errors();
                return ScenarioRunResult::simulation_error(&scenario.id, e.to_string());
            }
        };

        if outcome.steps < self.config.min_steps {
            warn!(
                scenario = %scenario.id,
                steps = outcome.steps,
                min_steps = self.config.min_steps,
                "simulation stopped early"
            );
            METRICS.inc_simulation_errors();
            return ScenarioRunResult::simulation_error(
                &scenario.id,
                format!(
                    "simulation closed earlier than expected after {} steps (expected at least {})",
                    outcome.steps, self.config.min_steps
                ),
            );
        }

        let results = checks::evaluate(&outcome.telemetry, &scenario.checks);
        let visual_report = self.diagnose(ctx, scenario, &outcome, &results).await;

        ScenarioRunResult::success(&scenario.id, results, visual_report)
    }

    /// Request a visual report when vision is enabled, a check failed and
    /// collision evidence exists.
    async fn diagnose(
        &self,
        ctx: &ScenarioContext<'_>,
        scenario: &ScenarioTests,
        outcome: &SimulationOutcome,
        results: &[CheckResult],
    ) -> Option<String> {
        if !self.config.vision_enabled || results.iter().all(|r| r.success) {
            return None;
        }
        let frames: Vec<u64> = results
            .iter()
            .flat_map(|r| r.evidence_frames.iter().copied())
            .collect();
        let screenshot_index = representative_screenshot(&frames, self.config.capture_interval)?;

        let Some(diagnostics) = self.diagnostics else {
            return Some("Visual diagnostics were requested but no provider is configured.".into());
        };

        METRICS.inc_diagnostics_requests();
        debug!(scenario = %scenario.id, screenshot_index, "requesting visual diagnostics");
        let request = DiagnosticsRequest {
            task: ctx.task,
            scenario_id: &scenario.id,
            iteration: ctx.iteration,
            screenshot_index,
            screenshots_dir: outcome.screenshots_dir.clone(),
        };
        match diagnostics.describe(&request).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(scenario = %scenario.id, error = %e, "visual diagnostics failed");
                Some(format!("Visual diagnostics unavailable: {}", e))
            }
        }
    }
}

/// Screenshot index of the temporal median evidence frame.
pub fn representative_screenshot(frames: &[u64], capture_interval: u64) -> Option<u64> {
    if frames.is_empty() || capture_interval == 0 {
        return None;
    }
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2] / capture_interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_representative_screenshot_uses_median() {
        assert_eq!(representative_screenshot(&[], 10), None);
        assert_eq!(representative_screenshot(&[57], 10), Some(5));
        assert_eq!(representative_screenshot(&[120, 40, 80], 10), Some(8));
        // even count takes the upper median
        assert_eq!(representative_screenshot(&[10, 20, 30, 40], 10), Some(3));
    }

    #[test]
    fn test_zero_capture_interval_yields_none() {
        assert_eq!(representative_screenshot(&[10], 0), None);
    }

    struct BrokenEngine;

    #[async_trait::async_trait]
    impl SimulationEngine for BrokenEngine {
        async fn simulate(&self, _request: &SimulationRequest<'_>) -> crate::domain::error::Result<SimulationOutcome> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "esmini not executable").into())
        }
    }

    #[tokio::test]
    async fn test_unexpected_engine_error_is_recorded_as_simulation_error() {
        let engine = BrokenEngine;
        let runner = ScenarioTestRunner::new(&engine, RunnerConfig::default());
        let controller = ControllerArtifact::new(0, "custom_controller.py", "pass");
        let ctx = ScenarioContext {
            task: "ACC",
            iteration: 0,
            controller: &controller,
            output_dir: PathBuf::from("/tmp/unused"),
        };
        let scenario = ScenarioTests::new("follow", vec![crate::domain::check::CheckSpec::detect_collisions()]);

        let result = runner.run(&ctx, &scenario).await;

        assert!(result.is_error());
        assert!(result.check_results.is_empty());
        assert!(result.error.as_deref().unwrap_or_default().contains("esmini not executable"));
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert!(!config.vision_enabled);
        assert_eq!(config.capture_interval, 10);
        assert_eq!(config.min_steps, 24);
    }
}
