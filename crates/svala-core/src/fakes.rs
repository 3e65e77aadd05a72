//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `TelemetryBuilder`, `ScriptedSimulationEngine`,
//! `ScriptedSynthesizer`, `StaticDiagnostics` and `FixedStaticAnalyzer`
//! so the refinement loop can be exercised without a simulator or an LLM.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::collaborators::{
    ControllerSynthesizer, DiagnosticsRequest, SimulationEngine, SimulationOutcome,
    SimulationRequest, StaticAnalyzer, StaticReport, SynthesisOutcome, SynthesisRequest,
    VisualDiagnostics,
};
use crate::domain::artifact::ControllerArtifact;
use crate::domain::error::{Result, SvalaError};
use crate::domain::telemetry::{Sample, TelemetryTable, VehicleState};

pub const EGO_NAME: &str = "Ego";
const FAKE_LANE: i64 = 99;

// ---------------------------------------------------------------------------
// TelemetryBuilder
// ---------------------------------------------------------------------------

/// Builds telemetry tables row by row with a fixed time step.
///
/// Frame numbers equal the row index; vehicle 0 is always `Ego`, further
/// vehicles are named `Target1`, `Target2`, ...
#[derive(Debug, Clone)]
pub struct TelemetryBuilder {
    dt: f64,
    extra_vehicles: usize,
    rows: Vec<Vec<VehicleState>>,
}

impl TelemetryBuilder {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            extra_vehicles: 0,
            rows: Vec::new(),
        }
    }

    /// Add `n` parked targets (in a lane Ego never uses) to rows built with
    /// [`ego`](Self::ego) and [`collision_row`](Self::collision_row).
    pub fn with_vehicles(mut self, n: usize) -> Self {
        self.extra_vehicles = n;
        self
    }

    pub fn ego(mut self, speed: f64, lane_id: i64, s: f64, t: f64) -> Self {
        let ego = VehicleState::new(EGO_NAME, speed, lane_id, s, t);
        let row = self.with_targets(ego);
        self.rows.push(row);
        self
    }

    /// Ego row carrying a collision marker against vehicle `peer`.
    pub fn collision_row(mut self, speed: f64, peer: usize) -> Self {
        let ego = VehicleState::new(EGO_NAME, speed, -3, 0.0, 0.0).with_collision(peer);
        let row = self.with_targets(ego);
        self.rows.push(row);
        self
    }

    /// A row with explicit `(speed, lane_id, s, t)` per vehicle, ego first.
    pub fn row(mut self, vehicles: &[(f64, i64, f64, f64)]) -> Self {
        let row = vehicles
            .iter()
            .enumerate()
            .map(|(i, &(speed, lane, s, t))| {
                VehicleState::new(vehicle_name(i), speed, lane, s, t)
            })
            .collect();
        self.rows.push(row);
        self
    }

    /// Repeat an ego-only row `count` times.
    pub fn cruise(mut self, count: usize, speed: f64) -> Self {
        for _ in 0..count {
            self = self.ego(speed, -3, 0.0, 0.0);
        }
        self
    }

    pub fn build(self) -> TelemetryTable {
        let dt = self.dt;
        let samples = self
            .rows
            .into_iter()
            .enumerate()
            .map(|(i, vehicles)| Sample {
                frame: i as u64,
                time: (i as f64 * dt * 1e6).round() / 1e6,
                vehicles,
            })
            .collect();
        TelemetryTable::new(samples).expect("builder produced invalid telemetry")
    }

    fn with_targets(&self, ego: VehicleState) -> Vec<VehicleState> {
        let mut row = vec![ego];
        for i in 1..=self.extra_vehicles {
            row.push(VehicleState::new(vehicle_name(i), 0.0, FAKE_LANE, 0.0, 0.0));
        }
        row
    }
}

fn vehicle_name(index: usize) -> String {
    if index == 0 {
        EGO_NAME.to_string()
    } else {
        format!("Target{}", index)
    }
}

// ---------------------------------------------------------------------------
// ScriptedSimulationEngine
// ---------------------------------------------------------------------------

/// One scripted simulation outcome.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Run(TelemetryTable),
    Crash(String),
}

/// A recorded call to [`ScriptedSimulationEngine::simulate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationCall {
    pub scenario_id: String,
    pub iteration: u32,
    pub controller_digest: String,
    pub output_dir: PathBuf,
}

/// Simulation engine replaying per-scenario scripts.
///
/// Each call pops the next step of the scenario's script; the last step
/// repeats forever. Unscripted scenarios use the default step.
#[derive(Debug)]
pub struct ScriptedSimulationEngine {
    default: ScriptStep,
    scripts: Mutex<HashMap<String, VecDeque<ScriptStep>>>,
    calls: Mutex<Vec<SimulationCall>>,
}

impl ScriptedSimulationEngine {
    pub fn new(default: ScriptStep) -> Self {
        Self {
            default,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Engine that returns `telemetry` for every scenario.
    pub fn always(telemetry: TelemetryTable) -> Self {
        Self::new(ScriptStep::Run(telemetry))
    }

    pub fn script(self, scenario_id: &str, steps: Vec<ScriptStep>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(scenario_id.to_string(), steps.into());
        self
    }

    pub fn calls(&self) -> Vec<SimulationCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, scenario_id: &str) -> ScriptStep {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(scenario_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(self.default.clone()),
            Some(queue) => queue.front().cloned().unwrap_or(self.default.clone()),
            None => self.default.clone(),
        }
    }
}

#[async_trait]
impl SimulationEngine for ScriptedSimulationEngine {
    async fn simulate(&self, request: &SimulationRequest<'_>) -> Result<SimulationOutcome> {
        self.calls.lock().unwrap().push(SimulationCall {
            scenario_id: request.scenario_id.to_string(),
            iteration: request.controller.iteration,
            controller_digest: request.controller.digest.clone(),
            output_dir: request.output_dir.clone(),
        });

        match self.next_step(request.scenario_id) {
            ScriptStep::Run(telemetry) => Ok(SimulationOutcome {
                steps: telemetry.len() as u64,
                telemetry,
                screenshots_dir: Some(request.output_dir.join("screenshots")),
            }),
            ScriptStep::Crash(reason) => Err(SvalaError::Simulation(reason)),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedSynthesizer
// ---------------------------------------------------------------------------

/// One scripted synthesizer response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisStep {
    /// A fresh artifact for the requested iteration.
    Source(String),

    /// An artifact tagged with the wrong iteration (a stale file).
    Stale(String),

    Fail(String),
}

/// Synthesizer replaying a script; once the script is exhausted every
/// request yields a fresh artifact tagged `# version {n}`.
#[derive(Debug, Default)]
pub struct ScriptedSynthesizer {
    file_name: String,
    transcript: Option<String>,
    script: Mutex<VecDeque<SynthesisStep>>,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            file_name: "custom_controller.py".to_string(),
            ..Self::default()
        }
    }

    pub fn with_script(self, steps: Vec<SynthesisStep>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    /// Attach `transcript` to every successful response.
    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControllerSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        let artifact = match step {
            Some(SynthesisStep::Source(source)) => {
                ControllerArtifact::new(request.iteration, &self.file_name, source)
            }
            Some(SynthesisStep::Stale(source)) => ControllerArtifact::new(
                request.iteration.wrapping_sub(1),
                &self.file_name,
                source,
            ),
            Some(SynthesisStep::Fail(reason)) => {
                return Err(SvalaError::Synthesis {
                    iteration: request.iteration,
                    reason,
                })
            }
            None => ControllerArtifact::new(
                request.iteration,
                &self.file_name,
                format!("# version {}\n", request.iteration),
            ),
        };
        let outcome = SynthesisOutcome::new(artifact);
        Ok(match &self.transcript {
            Some(text) => outcome.with_transcript(text.as_str()),
            None => outcome,
        })
    }
}

// ---------------------------------------------------------------------------
// StaticDiagnostics
// ---------------------------------------------------------------------------

/// Visual diagnostics returning a fixed report (or a fixed failure).
#[derive(Debug)]
pub struct StaticDiagnostics {
    response: std::result::Result<String, String>,
    screenshots: Mutex<Vec<u64>>,
}

impl StaticDiagnostics {
    pub fn new(report: impl Into<String>) -> Self {
        Self {
            response: Ok(report.into()),
            screenshots: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            response: Err(reason.into()),
            screenshots: Mutex::new(Vec::new()),
        }
    }

    /// Screenshot indices requested so far.
    pub fn requested_screenshots(&self) -> Vec<u64> {
        self.screenshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisualDiagnostics for StaticDiagnostics {
    async fn describe(&self, request: &DiagnosticsRequest<'_>) -> Result<String> {
        self.screenshots.lock().unwrap().push(request.screenshot_index);
        self.response.clone().map_err(SvalaError::Diagnostics)
    }
}

// ---------------------------------------------------------------------------
// FixedStaticAnalyzer
// ---------------------------------------------------------------------------

/// Static analyzer returning the same report for every artifact.
#[derive(Debug, Default)]
pub struct FixedStaticAnalyzer {
    report: StaticReport,
}

impl FixedStaticAnalyzer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            report: StaticReport {
                text: text.into(),
                ..StaticReport::default()
            },
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.report.metrics.insert(name.to_string(), value);
        self
    }
}

#[async_trait]
impl StaticAnalyzer for FixedStaticAnalyzer {
    async fn analyze(&self, _artifact: &ControllerArtifact) -> Result<StaticReport> {
        Ok(self.report.clone())
    }
}
