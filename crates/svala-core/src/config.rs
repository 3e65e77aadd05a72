//! Collaborator wiring loaded from `svala.toml`.
//!
//! Every section is optional:
//!
//! ```toml
//! [simulation]
//! command = ["esmini-harness", "--osc", "{scenario}", "--controller", "{controller}", "--csv", "{telemetry}"]
//! timeout_secs = 600
//!
//! [synthesizer]
//! kind = "http"
//! endpoint = "http://localhost:8080"
//! api_key_env = "SVALA_SYNTH_API_KEY"
//!
//! [diagnostics]
//! command = ["describe-frame", "{screenshots}", "{frame}"]
//!
//! [static_analysis]
//! lint_command = ["flake8", "{file}"]
//! ```

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::{
    CommandDiagnostics, CommandSimulationEngine, CommandSynthesizer, HttpSynthesizer,
    SourceMetricsAnalyzer, UnconfiguredSynthesizer, DEFAULT_CONTROLLER_FILE,
    DEFAULT_TELEMETRY_FILE,
};
use crate::collaborators::ControllerSynthesizer;
use crate::domain::error::{Result, SvalaError};
use crate::domain::telemetry::DEFAULT_SKIP_ROWS;
use crate::scenario_runner::DEFAULT_MIN_STEPS;

fn default_simulation_timeout() -> u64 {
    600
}

fn default_skip_rows() -> usize {
    DEFAULT_SKIP_ROWS
}

fn default_telemetry_file() -> String {
    DEFAULT_TELEMETRY_FILE.to_string()
}

fn default_min_steps() -> u64 {
    DEFAULT_MIN_STEPS
}

fn default_synthesis_timeout() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    5
}

fn default_file_name() -> String {
    DEFAULT_CONTROLLER_FILE.to_string()
}

fn default_diagnostics_timeout() -> u64 {
    300
}

fn default_lint_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Simulator argv with placeholders.
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "default_simulation_timeout")]
    pub timeout_secs: u64,

    /// Metadata rows before the telemetry header.
    #[serde(default = "default_skip_rows")]
    pub skip_rows: usize,

    #[serde(default = "default_telemetry_file")]
    pub telemetry_file: String,

    /// Runs with fewer steps count as simulation errors.
    #[serde(default = "default_min_steps")]
    pub min_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: default_simulation_timeout(),
            skip_rows: default_skip_rows(),
            telemetry_file: default_telemetry_file(),
            min_steps: default_min_steps(),
        }
    }
}

/// Which controller synthesizer to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynthesizerConfig {
    Command {
        command: Vec<String>,
        #[serde(default = "default_synthesis_timeout")]
        timeout_secs: u64,
        #[serde(default = "default_file_name")]
        file_name: String,
    },
    Http {
        endpoint: String,
        /// Environment variable holding the bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default = "default_poll_interval")]
        poll_interval_secs: u64,
        #[serde(default = "default_synthesis_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    pub command: Vec<String>,

    #[serde(default = "default_diagnostics_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAnalysisConfig {
    #[serde(default)]
    pub lint_command: Option<Vec<String>>,

    #[serde(default = "default_lint_timeout")]
    pub timeout_secs: u64,
}

impl Default for StaticAnalysisConfig {
    fn default() -> Self {
        Self {
            lint_command: None,
            timeout_secs: default_lint_timeout(),
        }
    }
}

/// Top-level collaborator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SvalaConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub synthesizer: Option<SynthesizerConfig>,

    #[serde(default)]
    pub diagnostics: Option<DiagnosticsConfig>,

    #[serde(default)]
    pub static_analysis: StaticAnalysisConfig,
}

impl SvalaConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn simulation_engine(&self) -> Result<CommandSimulationEngine> {
        if self.simulation.command.is_empty() {
            return Err(SvalaError::InvalidConfig(
                "[simulation] command must not be empty".into(),
            ));
        }
        if !self
            .simulation
            .command
            .iter()
            .any(|arg| arg.contains("{controller}"))
        {
            return Err(SvalaError::InvalidConfig(
                "[simulation] command never passes {controller} to the simulator".into(),
            ));
        }
        Ok(CommandSimulationEngine::new(self.simulation.command.clone())
            .with_timeout_secs(self.simulation.timeout_secs)
            .with_skip_rows(self.simulation.skip_rows)
            .with_telemetry_file(self.simulation.telemetry_file.clone()))
    }

    /// The configured synthesizer, or one that fails every request.
    pub fn synthesizer(&self) -> Result<Box<dyn ControllerSynthesizer>> {
        self.synthesizer_with_cancel(Arc::new(AtomicBool::new(false)))
    }

    /// Like [`synthesizer`](Self::synthesizer), with in-flight HTTP polls
    /// aborted once `cancel` is set.
    pub fn synthesizer_with_cancel(
        &self,
        cancel: Arc<AtomicBool>,
    ) -> Result<Box<dyn ControllerSynthesizer>> {
        match &self.synthesizer {
            None => Ok(Box::new(UnconfiguredSynthesizer)),
            Some(SynthesizerConfig::Command {
                command,
                timeout_secs,
                file_name,
            }) => {
                if command.is_empty() {
                    return Err(SvalaError::InvalidConfig(
                        "[synthesizer] command must not be empty".into(),
                    ));
                }
                Ok(Box::new(
                    CommandSynthesizer::new(command.clone())
                        .with_timeout_secs(*timeout_secs)
                        .with_file_name(file_name.clone()),
                ))
            }
            Some(SynthesizerConfig::Http {
                endpoint,
                api_key_env,
                poll_interval_secs,
                timeout_secs,
            }) => {
                if endpoint.trim().is_empty() {
                    return Err(SvalaError::InvalidConfig(
                        "[synthesizer] endpoint must not be empty".into(),
                    ));
                }
                let mut synth = HttpSynthesizer::new(endpoint.clone())
                    .with_cancel_handle(cancel)
                    .with_poll_interval(Duration::from_secs(*poll_interval_secs))
                    .with_timeout(Duration::from_secs(*timeout_secs));
                if let Some(var) = api_key_env {
                    let key = std::env::var(var).map_err(|_| {
                        SvalaError::InvalidConfig(format!(
                            "environment variable {} is not set",
                            var
                        ))
                    })?;
                    synth = synth.with_api_key(key);
                }
                Ok(Box::new(synth))
            }
        }
    }

    pub fn diagnostics(&self) -> Option<CommandDiagnostics> {
        self.diagnostics.as_ref().map(|d| {
            CommandDiagnostics::new(d.command.clone()).with_timeout_secs(d.timeout_secs)
        })
    }

    pub fn static_analyzer(&self) -> SourceMetricsAnalyzer {
        let analyzer =
            SourceMetricsAnalyzer::new().with_timeout_secs(self.static_analysis.timeout_secs);
        match &self.static_analysis.lint_command {
            Some(command) => analyzer.with_lint_command(command.clone()),
            None => analyzer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SvalaConfig::from_toml_str("").expect("parse");
        assert_eq!(config, SvalaConfig::default());
        assert_eq!(config.simulation.skip_rows, 6);
        assert_eq!(config.simulation.min_steps, 24);
        assert!(config.diagnostics().is_none());
        assert!(config.simulation_engine().is_err());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
[simulation]
command = ["esmini-harness", "--osc", "{scenario}", "--controller={controller}"]
timeout_secs = 120
min_steps = 10

[synthesizer]
kind = "http"
endpoint = "http://localhost:8080/"
poll_interval_secs = 2

[diagnostics]
command = ["describe", "{frame}"]

[static_analysis]
lint_command = ["flake8", "{file}"]
"#;
        let config = SvalaConfig::from_toml_str(text).expect("parse");
        assert_eq!(config.simulation.timeout_secs, 120);
        assert_eq!(config.simulation.min_steps, 10);
        assert!(config.simulation_engine().is_ok());
        assert!(matches!(
            config.synthesizer,
            Some(SynthesizerConfig::Http {
                poll_interval_secs: 2,
                timeout_secs: 900,
                ..
            })
        ));
        assert!(config.synthesizer().is_ok());
        assert!(config.diagnostics().is_some());
        assert_eq!(
            config.static_analysis.lint_command,
            Some(vec!["flake8".to_string(), "{file}".to_string()])
        );
    }

    #[test]
    fn test_simulation_command_must_load_controller() {
        let config = SvalaConfig::from_toml_str(
            "[simulation]\ncommand = [\"esmini\", \"--osc\", \"{scenario}\"]\n",
        )
        .expect("parse");
        let err = config.simulation_engine().expect_err("controller never loaded");
        assert!(err.to_string().contains("{controller}"));
    }

    #[test]
    fn test_command_synthesizer_requires_command() {
        let config = SvalaConfig::from_toml_str(
            "[synthesizer]\nkind = \"command\"\ncommand = []\n",
        )
        .expect("parse");
        assert!(matches!(
            config.synthesizer(),
            Err(SvalaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_synthesizer_kind_rejected() {
        let err = SvalaConfig::from_toml_str("[synthesizer]\nkind = \"carrier_pigeon\"\n")
            .expect_err("unknown kind");
        assert!(matches!(err, SvalaError::Toml(_)));
    }
}
