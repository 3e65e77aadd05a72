//! Domain models for Svala.
//!
//! Canonical definitions for the core entities:
//! - `TelemetryTable`: immutable per-run kinematic log
//! - `CheckSpec` / `CheckResult`: parameterized scoring functions and their outcomes
//! - `EvaluationSuite`: scenarios, checks and prompts for one driving function
//! - `ControllerArtifact`: versioned, content-addressed controller source
//! - `ScenarioRunResult`, `IterationRecord`, `EvaluationRun`: the audit trail

pub mod artifact;
pub mod check;
pub mod error;
pub mod run;
pub mod suite;
pub mod telemetry;

// Re-export main types and errors
pub use artifact::{source_digest, ControllerArtifact};
pub use check::{CheckResult, CheckSpec, DEFAULT_COLLISION_WINDOW_S};
pub use error::{Result, SvalaError};
pub use run::{
    EvaluationRun, IterationRecord, ScenarioRunResult, ScenarioStatus, SuiteHeader,
    TerminalReason,
};
pub use suite::{EvaluationSuite, ScenarioTests, DEFAULT_CORRECTION_TEMPLATE};
pub use telemetry::{Position, Sample, TelemetryTable, VehicleState, DEFAULT_SKIP_ROWS};
