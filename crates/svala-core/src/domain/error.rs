//! Domain-level error taxonomy for Svala.

/// Svala domain errors.
#[derive(Debug, thiserror::Error)]
pub enum SvalaError {
    /// The simulation engine failed to launch, crashed, or stopped early.
    #[error("simulation error: {0}")]
    Simulation(String),

    /// The controller synthesizer did not produce exactly one new artifact.
    #[error("synthesis failed for iteration {iteration}: {reason}")]
    Synthesis { iteration: u32, reason: String },

    /// A telemetry table is empty or missing an expected column.
    #[error("malformed telemetry: {0}")]
    MalformedTelemetry(String),

    #[error("visual diagnostics error: {0}")]
    Diagnostics(String),

    #[error("static analysis error: {0}")]
    StaticAnalysis(String),

    #[error("invalid evaluation suite: {0}")]
    InvalidSuite(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvalaError {
    /// Whether this error is recovered per scenario rather than aborting the run.
    pub fn is_scenario_level(&self) -> bool {
        matches!(
            self,
            SvalaError::Simulation(_) | SvalaError::MalformedTelemetry(_)
        )
    }
}

/// Result type for Svala domain operations.
pub type Result<T> = std::result::Result<T, SvalaError>;
