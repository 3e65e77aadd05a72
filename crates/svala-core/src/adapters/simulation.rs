//! Simulation engine backed by an external simulator process.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::command::{path_arg, run_command, substitute};
use crate::collaborators::{SimulationEngine, SimulationOutcome, SimulationRequest};
use crate::domain::error::{Result, SvalaError};
use crate::domain::telemetry::{TelemetryTable, DEFAULT_SKIP_ROWS};

pub const DEFAULT_TELEMETRY_FILE: &str = "full_log.csv";
const SCREENSHOTS_DIR: &str = "screenshots";

/// Runs one simulator process per scenario.
///
/// The controller artifact is written into the run's output directory and
/// handed to the simulator by path, so generated code only ever executes in
/// the simulator's own process. Supported argument placeholders:
/// `{scenario}`, `{controller}`, `{telemetry}`, `{capture_interval}`,
/// `{screenshots}`, `{output}`.
#[derive(Debug, Clone)]
pub struct CommandSimulationEngine {
    command: Vec<String>,
    timeout_secs: u64,
    skip_rows: usize,
    telemetry_file: String,
}

impl CommandSimulationEngine {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout_secs: 600,
            skip_rows: DEFAULT_SKIP_ROWS,
            telemetry_file: DEFAULT_TELEMETRY_FILE.to_string(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    pub fn with_telemetry_file(mut self, name: impl Into<String>) -> Self {
        self.telemetry_file = name.into();
        self
    }
}

#[async_trait]
impl SimulationEngine for CommandSimulationEngine {
    async fn simulate(&self, request: &SimulationRequest<'_>) -> Result<SimulationOutcome> {
        let out_dir = &request.output_dir;
        let screenshots: PathBuf = out_dir.join(SCREENSHOTS_DIR);
        std::fs::create_dir_all(&screenshots)?;

        let controller_path = out_dir.join(&request.controller.file_name);
        std::fs::write(&controller_path, &request.controller.source)?;

        let telemetry_path = out_dir.join(&self.telemetry_file);
        if telemetry_path.exists() {
            std::fs::remove_file(&telemetry_path)?;
        }

        let argv = substitute(
            &self.command,
            &[
                ("scenario", request.scenario_id.to_string()),
                ("controller", path_arg(&controller_path)),
                ("telemetry", path_arg(&telemetry_path)),
                ("capture_interval", request.capture_interval.to_string()),
                ("screenshots", path_arg(&screenshots)),
                ("output", path_arg(out_dir)),
            ],
        );

        let output = run_command("simulation", &argv, None, self.timeout_secs)
            .await
            .map_err(|e| match e {
                SvalaError::InvalidConfig(_) => e,
                other => SvalaError::Simulation(other.to_string()),
            })?;
        if !output.success {
            return Err(SvalaError::Simulation(format!(
                "simulator failed on scenario {}: {}",
                request.scenario_id,
                output.failure_summary()
            )));
        }
        if !telemetry_path.is_file() {
            return Err(SvalaError::Simulation(format!(
                "simulator did not write telemetry to {}",
                telemetry_path.display()
            )));
        }

        let telemetry = TelemetryTable::from_csv_path(&telemetry_path, self.skip_rows)?;
        debug!(
            scenario = %request.scenario_id,
            samples = telemetry.len(),
            duration_ms = output.duration_ms,
            "simulation finished"
        );
        Ok(SimulationOutcome {
            steps: telemetry.len() as u64,
            telemetry,
            screenshots_dir: Some(screenshots),
        })
    }
}
