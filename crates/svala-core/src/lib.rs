//! Svala Core Library
//!
//! Scores simulator telemetry of generated vehicle controllers and drives the
//! iterative GENERATE/EVALUATE refinement loop around them.

pub mod adapters;
pub mod aggregate;
pub mod archive;
pub mod checks;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod iteration;
pub mod logging;
pub mod metrics;
pub mod obs;
pub mod prompt;
pub mod reporting;
pub mod scenario_runner;

pub use domain::{
    source_digest, CheckResult, CheckSpec, ControllerArtifact, EvaluationRun, EvaluationSuite,
    IterationRecord, Result, ScenarioRunResult, ScenarioStatus, ScenarioTests, SuiteHeader,
    SvalaError, TelemetryTable, TerminalReason, DEFAULT_SKIP_ROWS,
};

pub use adapters::{
    CommandDiagnostics, CommandSimulationEngine, CommandSynthesizer, HttpSynthesizer,
    SourceMetricsAnalyzer,
};
pub use aggregate::{aggregate, assemble_record, AggregateReport};
pub use archive::RunArchive;
pub use checks::{evaluate, evaluate_check};
pub use collaborators::{
    ControllerSynthesizer, SimulationEngine, StaticAnalyzer, StaticReport, SynthesisOutcome,
    VisualDiagnostics,
};
pub use config::SvalaConfig;
pub use iteration::IterationController;
pub use logging::init_tracing;
pub use metrics::METRICS;
pub use prompt::correction_prompt;
pub use reporting::{render_cumulative_log, render_summary};
pub use scenario_runner::{RunnerConfig, ScenarioContext, ScenarioTestRunner};

/// Svala version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
