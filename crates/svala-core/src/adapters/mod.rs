//! Process- and HTTP-backed implementations of the collaborator traits.

pub mod command;
pub mod diagnostics;
pub mod simulation;
pub mod static_analysis;
pub mod synthesizer;

pub use command::{run_command, substitute, CommandOutput};
pub use diagnostics::CommandDiagnostics;
pub use simulation::{CommandSimulationEngine, DEFAULT_TELEMETRY_FILE};
pub use static_analysis::{classify_lint_output, SourceMetrics, SourceMetricsAnalyzer};
pub use synthesizer::{
    poll_until_terminal, render_transcript, CommandSynthesizer, HttpSynthesizer, JobMessage,
    JobStatus, UnconfiguredSynthesizer, DEFAULT_CONTROLLER_FILE,
};
