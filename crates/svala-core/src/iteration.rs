//! Iteration controller: the GENERATE/EVALUATE refinement loop.
//!
//! ```text
//! GENERATE(0) -> EVALUATE(0) -> DONE(Converged)        fail == 0 && error == 0
//!                            -> DONE(BudgetExhausted)  n == iteration_budget
//!                            -> GENERATE(n + 1)        otherwise
//! GENERATE(n) -> DONE(SynthesisFailed)                 no fresh artifact for n
//! ```
//!
//! Scenarios run strictly one after another in suite order. Every evaluated
//! iteration is appended to the [`EvaluationRun`] and never rewritten. The
//! evaluation document and cumulative log are persisted after every
//! evaluated iteration and again on every terminal path, including synthesis
//! failure.
//!
//! A cancel flag set between iterations ends the run as `SynthesisFailed`
//! before the next synthesizer call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::aggregate::assemble_record;
use crate::archive::RunArchive;
use crate::collaborators::{
    ControllerSynthesizer, SimulationEngine, StaticAnalyzer, StaticReport, SynthesisRequest,
    VisualDiagnostics,
};
use crate::domain::artifact::ControllerArtifact;
use crate::domain::error::{Result, SvalaError};
use crate::domain::run::{EvaluationRun, IterationRecord, ScenarioRunResult, TerminalReason};
use crate::domain::suite::EvaluationSuite;
use crate::metrics::METRICS;
use crate::obs;
use crate::prompt::correction_prompt;
use crate::reporting::render_cumulative_log;
use crate::scenario_runner::{RunnerConfig, ScenarioContext, ScenarioTestRunner, DEFAULT_MIN_STEPS};

/// Loop state. `Evaluate` owns the artifact produced by the preceding
/// `Generate` of the same iteration.
#[derive(Debug)]
enum LoopState {
    Generate(u32),
    Evaluate(u32, ControllerArtifact),
    Done(TerminalReason, Option<String>),
}

/// Drives one evaluation suite to a terminal state.
pub struct IterationController<'a> {
    suite: &'a EvaluationSuite,
    engine: &'a dyn SimulationEngine,
    synthesizer: &'a dyn ControllerSynthesizer,
    analyzer: Option<&'a dyn StaticAnalyzer>,
    diagnostics: Option<&'a dyn VisualDiagnostics>,
    min_steps: u64,
    cancel: Arc<AtomicBool>,
}

impl<'a> IterationController<'a> {
    pub fn new(
        suite: &'a EvaluationSuite,
        engine: &'a dyn SimulationEngine,
        synthesizer: &'a dyn ControllerSynthesizer,
    ) -> Self {
        Self {
            suite,
            engine,
            synthesizer,
            analyzer: None,
            diagnostics: None,
            min_steps: DEFAULT_MIN_STEPS,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_static_analyzer(mut self, analyzer: &'a dyn StaticAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a dyn VisualDiagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Minimum simulation steps below which a scenario counts as crashed.
    pub fn with_min_steps(mut self, min_steps: u64) -> Self {
        self.min_steps = min_steps;
        self
    }

    /// Share a cancel flag with a signal handler or an HTTP synthesizer.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the loop to completion, archiving everything under `archive`.
    pub async fn run(&self, archive: &RunArchive) -> EvaluationRun {
        let run_id = Uuid::new_v4().to_string();
        let _span = obs::RunSpan::enter(&run_id, &self.suite.task);
        obs::emit_run_started(
            &run_id,
            &self.suite.task,
            self.suite.scenarios.len(),
            self.suite.iteration_budget,
        );

        let mut run = EvaluationRun::new(run_id, self.suite.header());
        let mut state = LoopState::Generate(0);

        loop {
            state = match state {
                LoopState::Generate(n) => {
                    obs::emit_iteration_started(n);
                    match self.generate(n, run.latest(), archive).await {
                        Ok(artifact) => LoopState::Evaluate(n, artifact),
                        Err(e) => {
                            obs::emit_synthesis_failed(n, &e);
                            LoopState::Done(TerminalReason::SynthesisFailed, Some(e.to_string()))
                        }
                    }
                }
                LoopState::Evaluate(n, artifact) => {
                    let record = self.evaluate(n, &artifact, archive).await;
                    let converged = record.converged();
                    run.push(record);
                    self.persist(&run, archive);
                    if converged {
                        LoopState::Done(TerminalReason::Converged, None)
                    } else if n >= self.suite.iteration_budget {
                        LoopState::Done(TerminalReason::BudgetExhausted, None)
                    } else {
                        LoopState::Generate(n + 1)
                    }
                }
                LoopState::Done(reason, failure) => {
                    run.finish(reason, failure);
                    break;
                }
            };
        }

        self.persist(&run, archive);
        if let Some(reason) = run.terminal_reason {
            obs::emit_run_finished(&run.run_id, reason, run.iterations().len());
        }
        METRICS.flush();
        run
    }

    /// GENERATE(n): obtain a fresh artifact for iteration `n`.
    async fn generate(
        &self,
        n: u32,
        previous: Option<&IterationRecord>,
        archive: &RunArchive,
    ) -> Result<ControllerArtifact> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(SvalaError::Synthesis {
                iteration: n,
                reason: "run was cancelled".to_string(),
            });
        }
        if !self.suite.synthesize {
            return self.existing_controller(n);
        }

        let prompt = match previous {
            None => self.suite.requirement_specification.clone(),
            Some(record) => correction_prompt(&self.suite.correction_template, record),
        };
        if let Err(e) = archive.archive_prompt(n, &prompt) {
            obs::emit_artifact_write_error("prompt", &e);
        }

        METRICS.inc_synthesis_requests();
        let outcome = self
            .synthesizer
            .synthesize(&SynthesisRequest {
                iteration: n,
                prompt,
            })
            .await
            .map_err(|e| match e {
                SvalaError::Synthesis { .. } => e,
                other => SvalaError::Synthesis {
                    iteration: n,
                    reason: other.to_string(),
                },
            })?;

        if let Some(transcript) = &outcome.transcript {
            if let Err(e) = archive.archive_transcript(n, transcript) {
                obs::emit_artifact_write_error("synthesizer transcript", &e);
            }
        }
        let artifact = outcome.artifact;
        if artifact.iteration != n {
            return Err(SvalaError::Synthesis {
                iteration: n,
                reason: format!(
                    "synthesizer returned the artifact of iteration {} instead of a new one",
                    artifact.iteration
                ),
            });
        }
        if artifact.source.trim().is_empty() {
            return Err(SvalaError::Synthesis {
                iteration: n,
                reason: "synthesizer returned an empty controller".to_string(),
            });
        }
        if previous.and_then(|r| r.controller_digest.as_deref()) == Some(artifact.digest.as_str()) {
            warn!(
                iteration = n,
                digest = %artifact.short_digest(),
                "synthesized controller is identical to the previous iteration"
            );
        }

        if let Err(e) = archive.archive_controller(&artifact) {
            obs::emit_artifact_write_error("controller", &e);
        }
        obs::emit_synthesis_completed(n, &artifact.digest);
        Ok(artifact)
    }

    /// Reuse the controller on disk instead of synthesizing one.
    fn existing_controller(&self, n: u32) -> Result<ControllerArtifact> {
        let path = self
            .suite
            .controller_path
            .as_deref()
            .ok_or_else(|| SvalaError::Synthesis {
                iteration: n,
                reason: "synthesis is disabled and no controller_path is set".to_string(),
            })?;
        ControllerArtifact::from_path(n, path).map_err(|e| SvalaError::Synthesis {
            iteration: n,
            reason: format!("could not read controller {}: {}", path.display(), e),
        })
    }

    /// EVALUATE(n): static analysis, then every scenario in suite order.
    async fn evaluate(
        &self,
        n: u32,
        artifact: &ControllerArtifact,
        archive: &RunArchive,
    ) -> IterationRecord {
        let static_report = match self.analyzer {
            Some(analyzer) => analyzer.analyze(artifact).await.unwrap_or_else(|e| {
                warn!(iteration = n, error = %e, "static analysis failed");
                StaticReport::unavailable(&e)
            }),
            None => StaticReport::unavailable(&"no static analyzer configured"),
        };

        let mut runner = ScenarioTestRunner::new(
            self.engine,
            RunnerConfig {
                vision_enabled: self.suite.vision_enabled,
                capture_interval: self.suite.capture_interval,
                min_steps: self.min_steps,
            },
        );
        if let Some(diagnostics) = self.diagnostics {
            runner = runner.with_diagnostics(diagnostics);
        }

        let mut results = Vec::with_capacity(self.suite.scenarios.len());
        for (position, scenario) in self.suite.scenarios.iter().enumerate() {
            let result = match archive.scenario_dir(n, position, &scenario.id) {
                Ok(output_dir) => {
                    let ctx = ScenarioContext {
                        task: &self.suite.task,
                        iteration: n,
                        controller: artifact,
                        output_dir,
                    };
                    runner.run(&ctx, scenario).await
                }
                Err(e) => ScenarioRunResult::simulation_error(
                    &scenario.id,
                    format!("could not prepare the scenario output directory: {}", e),
                ),
            };
            obs::emit_scenario_finished(n, &result);
            results.push(result);
        }

        let record = assemble_record(n, artifact, &static_report, results);
        obs::emit_iteration_evaluated(&record);
        record
    }

    fn persist(&self, run: &EvaluationRun, archive: &RunArchive) {
        if let Err(e) = archive.write_evaluation(run) {
            obs::emit_artifact_write_error("evaluation document", &e);
        }
        if let Err(e) = archive.write_log(&render_cumulative_log(run)) {
            obs::emit_artifact_write_error("cumulative log", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check::CheckSpec;
    use crate::domain::suite::ScenarioTests;
    use crate::fakes::{ScriptStep, ScriptedSimulationEngine, ScriptedSynthesizer, SynthesisStep, TelemetryBuilder};

    fn suite(budget: u32) -> EvaluationSuite {
        EvaluationSuite::new("CAEM", "Write a controller.")
            .add_scenario(ScenarioTests::new(
                "cut-in",
                vec![CheckSpec::max_ego_speed(30.0)],
            ))
            .with_iteration_budget(budget)
    }

    #[tokio::test]
    async fn test_first_prompt_is_requirement_then_correction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("archive");
        let suite = suite(1);
        let engine = ScriptedSimulationEngine::always(TelemetryBuilder::new(0.1).cruise(3, 40.0).build());
        let synth = ScriptedSynthesizer::new();

        let run = IterationController::new(&suite, &engine, &synth)
            .with_min_steps(1)
            .run(&archive)
            .await;

        assert_eq!(run.terminal_reason, Some(TerminalReason::BudgetExhausted));
        let prompts = synth.requests();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].prompt, "Write a controller.");
        assert!(prompts[1].prompt.contains("failed 1 out of 1 tests"));
        assert!(prompts[1].prompt.contains("version 1"));
        assert!(archive.root().join("1").join("prompt.txt").is_file());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_synthesis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("archive");
        let suite = suite(3);
        let engine = ScriptedSimulationEngine::always(TelemetryBuilder::new(0.1).cruise(3, 40.0).build());
        let synth = ScriptedSynthesizer::new();
        let cancel = Arc::new(AtomicBool::new(true));

        let run = IterationController::new(&suite, &engine, &synth)
            .with_cancel(Arc::clone(&cancel))
            .run(&archive)
            .await;

        assert_eq!(run.terminal_reason, Some(TerminalReason::SynthesisFailed));
        assert!(run.iterations().is_empty());
        assert!(synth.requests().is_empty());
        assert!(engine.calls().is_empty());
        assert!(run.failure.as_deref().unwrap_or_default().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_stale_artifact_aborts_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("archive");
        let suite = suite(3);
        let engine = ScriptedSimulationEngine::always(TelemetryBuilder::new(0.1).cruise(3, 40.0).build());
        let synth = ScriptedSynthesizer::new().with_script(vec![
            SynthesisStep::Source("v0".into()),
            SynthesisStep::Stale("v0".into()),
        ]);

        let run = IterationController::new(&suite, &engine, &synth)
            .with_min_steps(1)
            .run(&archive)
            .await;

        assert_eq!(run.terminal_reason, Some(TerminalReason::SynthesisFailed));
        assert_eq!(run.iterations().len(), 1);
        assert!(run
            .failure
            .as_deref()
            .unwrap_or_default()
            .contains("iteration 1"));
    }

    #[tokio::test]
    async fn test_crashing_scenario_is_counted_and_not_converged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("archive");
        let suite = suite(0);
        let engine = ScriptedSimulationEngine::new(ScriptStep::Crash("segfault".into()));
        let synth = ScriptedSynthesizer::new();

        let run = IterationController::new(&suite, &engine, &synth).run(&archive).await;

        let record = &run.iterations()[0];
        assert_eq!(record.error_count, 1);
        assert_eq!(record.total_checks(), 0);
        assert_eq!(run.terminal_reason, Some(TerminalReason::BudgetExhausted));
    }
}
