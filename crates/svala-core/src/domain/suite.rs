//! Evaluation suite definitions loaded from TOML.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::check::CheckSpec;
use super::error::{Result, SvalaError};
use super::run::SuiteHeader;
use crate::prompt::REQUIRED_PLACEHOLDERS;

/// Feedback template used when a suite does not provide one.
pub const DEFAULT_CORRECTION_TEMPLATE: &str = "\
Unfortunately, the controller failed {failed} out of {total} tests.

Static code analysis resulted in this report:

{static_analysis}

Tests run on log data generated from simulations of the different scenarios:

{report}

Please include the tag \"version {version}\" as a comment in the new file.

You are now going to try to correct the code based on these reports.
First try to understand what has happened during the tests which were performed. Try to explicitly describe the issues that the controller might have had.
Enumerate explicit changes you will make to the controller and how they will address previous shortcomings.
Finally generate a new controller file.
";

fn default_template() -> String {
    DEFAULT_CORRECTION_TEMPLATE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_capture_interval() -> u64 {
    10
}

/// A scenario and the checks scored against its telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTests {
    /// Opaque scenario reference resolved by the simulation engine.
    pub id: String,

    pub checks: Vec<CheckSpec>,
}

impl ScenarioTests {
    pub fn new(id: impl Into<String>, checks: Vec<CheckSpec>) -> Self {
        Self {
            id: id.into(),
            checks,
        }
    }
}

/// A complete evaluation suite: what to build and how to judge it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSuite {
    /// Name of the driving function under test (e.g. `CAEM`, `ACC`).
    pub task: String,

    /// Base specification sent to the synthesizer for iteration 0.
    pub requirement_specification: String,

    /// Correction prompt template with named placeholders.
    #[serde(default = "default_template")]
    pub correction_template: String,

    /// When false, the controller at `controller_path` is evaluated as-is
    /// every iteration and the synthesizer is never called.
    #[serde(default = "default_true")]
    pub synthesize: bool,

    #[serde(default)]
    pub controller_path: Option<PathBuf>,

    #[serde(default)]
    pub vision_enabled: bool,

    /// Maximum number of correction cycles after the initial generation.
    #[serde(default)]
    pub iteration_budget: u32,

    /// Simulator frames between captured screenshots.
    #[serde(default = "default_capture_interval")]
    pub capture_interval: u64,

    /// Scenarios in evaluation order.
    pub scenarios: Vec<ScenarioTests>,
}

impl EvaluationSuite {
    pub fn new(task: impl Into<String>, requirement_specification: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            requirement_specification: requirement_specification.into(),
            correction_template: default_template(),
            synthesize: true,
            controller_path: None,
            vision_enabled: false,
            iteration_budget: 0,
            capture_interval: default_capture_interval(),
            scenarios: Vec::new(),
        }
    }

    pub fn add_scenario(mut self, scenario: ScenarioTests) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_iteration_budget(mut self, budget: u32) -> Self {
        self.iteration_budget = budget;
        self
    }

    pub fn with_vision(mut self, enabled: bool) -> Self {
        self.vision_enabled = enabled;
        self
    }

    pub fn with_existing_controller(mut self, path: impl Into<PathBuf>) -> Self {
        self.synthesize = false;
        self.controller_path = Some(path.into());
        self
    }

    /// Parse and validate a suite from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let suite: Self = toml::from_str(text)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Load and validate a suite file. A relative `controller_path` is
    /// resolved against the suite file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut suite = Self::from_toml_str(&text)?;
        if let (Some(controller), Some(dir)) = (&suite.controller_path, path.parent()) {
            if controller.is_relative() {
                suite.controller_path = Some(dir.join(controller));
            }
        }
        Ok(suite)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(SvalaError::InvalidSuite("task must not be empty".into()));
        }
        if self.scenarios.is_empty() {
            return Err(SvalaError::InvalidSuite(
                "suite must list at least one scenario".into(),
            ));
        }
        if self.capture_interval == 0 {
            return Err(SvalaError::InvalidSuite(
                "capture_interval must be greater than zero".into(),
            ));
        }
        if !self.synthesize && self.controller_path.is_none() {
            return Err(SvalaError::InvalidSuite(
                "controller_path is required when synthesize = false".into(),
            ));
        }
        for placeholder in REQUIRED_PLACEHOLDERS {
            if !self.correction_template.contains(placeholder) {
                return Err(SvalaError::InvalidSuite(format!(
                    "correction_template is missing placeholder {}",
                    placeholder
                )));
            }
        }
        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.id.trim().is_empty() {
                return Err(SvalaError::InvalidSuite("scenario id must not be empty".into()));
            }
            if !seen.insert(scenario.id.as_str()) {
                return Err(SvalaError::InvalidSuite(format!(
                    "scenario {} is listed more than once",
                    scenario.id
                )));
            }
            if scenario.checks.is_empty() {
                return Err(SvalaError::InvalidSuite(format!(
                    "scenario {} has no checks",
                    scenario.id
                )));
            }
            if let Some(check) = scenario.checks.iter().find(|c| !c.threshold().is_finite()) {
                return Err(SvalaError::InvalidSuite(format!(
                    "scenario {}: {} has a non-finite threshold",
                    scenario.id,
                    check.name()
                )));
            }
        }
        Ok(())
    }

    pub fn header(&self) -> SuiteHeader {
        SuiteHeader {
            task: self.task.clone(),
            requirement_specification: self.requirement_specification.clone(),
            vision_enabled: self.vision_enabled,
            iteration_budget: self.iteration_budget,
        }
    }
}
