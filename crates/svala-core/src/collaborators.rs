//! Narrow interfaces to the external collaborators of the refinement loop.
//!
//! The core never simulates vehicles, talks to an LLM, renders screenshots
//! or lints code itself. It drives these traits sequentially, one call at a
//! time, and only consumes their typed results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::artifact::ControllerArtifact;
use crate::domain::error::Result;
use crate::domain::telemetry::TelemetryTable;

// ---------------------------------------------------------------------------
// Simulation engine
// ---------------------------------------------------------------------------

/// One scenario run request.
#[derive(Debug, Clone)]
pub struct SimulationRequest<'a> {
    pub scenario_id: &'a str,

    pub controller: &'a ControllerArtifact,

    /// Simulator frames between captured screenshots.
    pub capture_interval: u64,

    /// Directory owned by this run; telemetry and screenshots land here.
    pub output_dir: PathBuf,
}

/// What a completed simulation hands back to the runner.
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub telemetry: TelemetryTable,

    /// Number of simulation steps actually executed.
    pub steps: u64,

    /// Where captured screenshots were written, if any.
    pub screenshots_dir: Option<PathBuf>,
}

/// Executes a scenario against a candidate controller.
///
/// Launch failures and crashes are reported as
/// [`SvalaError::Simulation`](crate::domain::SvalaError::Simulation); a
/// telemetry log that cannot be read is
/// [`SvalaError::MalformedTelemetry`](crate::domain::SvalaError::MalformedTelemetry).
#[async_trait]
pub trait SimulationEngine: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest<'_>) -> Result<SimulationOutcome>;
}

// ---------------------------------------------------------------------------
// Controller synthesizer
// ---------------------------------------------------------------------------

/// A request for a new controller artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Iteration the artifact is requested for; the returned artifact must
    /// carry the same token.
    pub iteration: u32,

    /// Base specification (iteration 0) or correction prompt.
    pub prompt: String,
}

/// What a synthesizer hands back: the artifact plus, when the backend
/// exposes one, the conversation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutcome {
    pub artifact: ControllerArtifact,
    pub transcript: Option<String>,
}

impl SynthesisOutcome {
    pub fn new(artifact: ControllerArtifact) -> Self {
        Self {
            artifact,
            transcript: None,
        }
    }

    /// Attach a transcript; blank text is dropped.
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        let transcript = transcript.into();
        self.transcript = (!transcript.trim().is_empty()).then_some(transcript);
        self
    }
}

/// Produces exactly one controller artifact per request, or fails.
#[async_trait]
pub trait ControllerSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome>;
}

// ---------------------------------------------------------------------------
// Visual diagnostics
// ---------------------------------------------------------------------------

/// A request to describe what went wrong around one captured frame.
#[derive(Debug, Clone)]
pub struct DiagnosticsRequest<'a> {
    pub task: &'a str,
    pub scenario_id: &'a str,
    pub iteration: u32,

    /// Screenshot index (evidence frame divided by the capture interval).
    pub screenshot_index: u64,

    pub screenshots_dir: Option<PathBuf>,
}

/// Produces a natural-language report for a failure frame.
#[async_trait]
pub trait VisualDiagnostics: Send + Sync {
    async fn describe(&self, request: &DiagnosticsRequest<'_>) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Static analyzer
// ---------------------------------------------------------------------------

/// Opaque static-analysis output: prompt text plus numeric metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticReport {
    pub text: String,
    pub metrics: BTreeMap<String, f64>,
}

impl StaticReport {
    /// Report used when analysis itself failed.
    pub fn unavailable(reason: &dyn std::fmt::Display) -> Self {
        Self {
            text: format!("Static analysis unavailable: {}", reason),
            metrics: BTreeMap::new(),
        }
    }
}

#[async_trait]
pub trait StaticAnalyzer: Send + Sync {
    async fn analyze(&self, artifact: &ControllerArtifact) -> Result<StaticReport>;
}
