//! On-disk archive of one evaluation run.
//!
//! Layout under `<runs_dir>/<YYYY-mm-dd_HH-MM-SS>_<task>/`:
//!
//! ```text
//! controller/<n>_<file_name>        archived controller of iteration n
//! <n>/prompt.txt                    prompt that produced iteration n
//! <n>/synthesizer_transcript.txt    synthesizer messages for iteration n
//! <n>/<NN>_<scenario>/              per-scenario simulator output (telemetry, screenshots)
//! evaluation_data.json              evaluation document
//! evaluation_data.digest            SHA-256 of evaluation_data.json
//! <timestamp>_<task>.txt            cumulative human-readable log
//! ```
//!
//! Every scenario run gets its own directory, keyed by the scenario's
//! position in the suite, so nothing is overwritten between runs even when
//! two ids sanitize to the same name.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tempfile::NamedTempFile;

use crate::domain::artifact::{source_digest, ControllerArtifact};
use crate::domain::error::{Result, SvalaError};
use crate::domain::run::EvaluationRun;

pub const EVALUATION_FILE: &str = "evaluation_data.json";
pub const EVALUATION_DIGEST_FILE: &str = "evaluation_data.digest";
pub const TRANSCRIPT_FILE: &str = "synthesizer_transcript.txt";

/// Filesystem archive rooted at one run directory.
#[derive(Debug, Clone)]
pub struct RunArchive {
    root: PathBuf,
    label: String,
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Write `data` to `path` via a temp file in the same directory and a rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        SvalaError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{:?} has no parent directory", path),
        ))
    })?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl RunArchive {
    /// Create a fresh run directory under `runs_dir`.
    pub fn create(runs_dir: &Path, task: &str) -> Result<Self> {
        std::fs::create_dir_all(runs_dir)?;
        let label = format!("{}_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"), sanitize(task));

        let mut root = runs_dir.join(&label);
        let mut suffix = 1;
        loop {
            match std::fs::create_dir(&root) {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    root = runs_dir.join(format!("{}_{}", label, suffix));
                    suffix += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self { root, label })
    }

    /// Open an existing run directory for reading.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for iteration-level files, created on demand.
    pub fn iteration_dir(&self, iteration: u32) -> Result<PathBuf> {
        let dir = self.root.join(iteration.to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Directory owned by the scenario at `position` in the suite, created
    /// on demand.
    pub fn scenario_dir(&self, iteration: u32, position: usize, scenario_id: &str) -> Result<PathBuf> {
        let dir = self
            .iteration_dir(iteration)?
            .join(format!("{:02}_{}", position, sanitize(scenario_id)));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn archive_controller(&self, artifact: &ControllerArtifact) -> Result<PathBuf> {
        let path = self.root.join("controller").join(format!(
            "{}_{}",
            artifact.iteration,
            sanitize(&artifact.file_name)
        ));
        write_atomic(&path, artifact.source.as_bytes())?;
        Ok(path)
    }

    pub fn archive_prompt(&self, iteration: u32, prompt: &str) -> Result<PathBuf> {
        let path = self.iteration_dir(iteration)?.join("prompt.txt");
        write_atomic(&path, prompt.as_bytes())?;
        Ok(path)
    }

    /// Persist what the synthesizer said while producing iteration `iteration`.
    pub fn archive_transcript(&self, iteration: u32, transcript: &str) -> Result<PathBuf> {
        let path = self.iteration_dir(iteration)?.join(TRANSCRIPT_FILE);
        write_atomic(&path, transcript.as_bytes())?;
        Ok(path)
    }

    /// Persist the evaluation document and its digest.
    pub fn write_evaluation(&self, run: &EvaluationRun) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(run)?;
        let json_text = String::from_utf8_lossy(&json);
        let digest = source_digest(&json_text);

        let path = self.root.join(EVALUATION_FILE);
        write_atomic(&path, &json)?;
        write_atomic(&self.root.join(EVALUATION_DIGEST_FILE), digest.as_bytes())?;
        Ok(path)
    }

    /// Read the evaluation document back, verifying its digest.
    pub fn read_evaluation(&self) -> Result<EvaluationRun> {
        let json = std::fs::read_to_string(self.root.join(EVALUATION_FILE))?;
        let expected = std::fs::read_to_string(self.root.join(EVALUATION_DIGEST_FILE))?;
        let actual = source_digest(&json);
        if expected.trim() != actual {
            return Err(SvalaError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_str(&json)?)
    }

    /// Persist the cumulative human-readable log.
    pub fn write_log(&self, text: &str) -> Result<PathBuf> {
        let path = self.root.join(format!("{}.txt", self.label));
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::{SuiteHeader, TerminalReason};

    fn header() -> SuiteHeader {
        SuiteHeader {
            task: "CAEM".to_string(),
            requirement_specification: "Stay in lane.".to_string(),
            vision_enabled: false,
            iteration_budget: 1,
        }
    }

    #[test]
    fn test_create_makes_unique_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = RunArchive::create(dir.path(), "CAEM").expect("create a");
        let b = RunArchive::create(dir.path(), "CAEM").expect("create b");
        assert_ne!(a.root(), b.root());
        assert!(a.root().is_dir());
        assert!(b.root().is_dir());
    }

    #[test]
    fn test_scenario_dir_is_sanitized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "ACC").expect("create");
        let scenario = archive.scenario_dir(2, 3, "../xosc/cut in.xosc").expect("dir");
        assert!(scenario.starts_with(archive.root()));
        assert!(scenario.ends_with("2/03_.._xosc_cut_in.xosc"));
        assert!(scenario.is_dir());
    }

    #[test]
    fn test_transcript_lands_next_to_prompt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("create");
        archive.archive_prompt(1, "fix it").expect("prompt");
        let path = archive.archive_transcript(1, "Message number: 0").expect("transcript");
        assert_eq!(path, archive.root().join("1").join(TRANSCRIPT_FILE));
        assert_eq!(std::fs::read_to_string(path).expect("read"), "Message number: 0");
    }

    #[test]
    fn test_colliding_sanitized_ids_get_distinct_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("create");
        let spaced = archive.scenario_dir(0, 0, "cut in.xosc").expect("dir 0");
        let underscored = archive.scenario_dir(0, 1, "cut_in.xosc").expect("dir 1");
        assert_ne!(spaced, underscored);
        assert!(spaced.ends_with("0/00_cut_in.xosc"));
        assert!(underscored.ends_with("0/01_cut_in.xosc"));
    }

    #[test]
    fn test_controller_archived_per_iteration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "AEB").expect("create");
        let first = archive
            .archive_controller(&ControllerArtifact::new(0, "custom_controller.py", "v0"))
            .expect("archive 0");
        let second = archive
            .archive_controller(&ControllerArtifact::new(1, "custom_controller.py", "v1"))
            .expect("archive 1");
        assert_eq!(std::fs::read_to_string(first).expect("read"), "v0");
        assert_eq!(std::fs::read_to_string(second).expect("read"), "v1");
    }

    #[test]
    fn test_evaluation_document_digest_verified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = RunArchive::create(dir.path(), "CAEM").expect("create");
        let mut run = EvaluationRun::new("run-1", header());
        run.finish(TerminalReason::BudgetExhausted, None);
        archive.write_evaluation(&run).expect("write");

        let loaded = RunArchive::open(archive.root())
            .read_evaluation()
            .expect("read");
        assert_eq!(loaded, run);

        std::fs::write(archive.root().join(EVALUATION_FILE), "{}").expect("tamper");
        let err = archive.read_evaluation().expect_err("tampered");
        assert!(matches!(err, SvalaError::DigestMismatch { .. }));
    }
}
