//! Svala - iterative evaluation and refinement of generated vehicle controllers
//!
//! The `svala` command drives the GENERATE/EVALUATE loop for an evaluation
//! suite and inspects its results.
//!
//! ## Commands
//!
//! - `run`: synthesize, simulate and score until convergence or budget exhaustion
//! - `check`: score an existing telemetry log offline
//! - `validate`: load and validate a suite file
//! - `show`: print the summary of a persisted run

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};

use svala_core::{
    evaluate, render_summary, EvaluationSuite, IterationController, RunArchive, SvalaConfig,
    TelemetryTable, TerminalReason, DEFAULT_SKIP_ROWS,
};

#[derive(Parser)]
#[command(name = "svala")]
#[command(author = "Svala Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Iterative evaluation and refinement of generated vehicle controllers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refinement loop for a suite
    Run {
        /// Evaluation suite (TOML)
        #[arg(short, long)]
        suite: PathBuf,

        /// Collaborator configuration (TOML)
        #[arg(short, long, env = "SVALA_CONFIG")]
        config: Option<PathBuf>,

        /// Directory that receives one sub-directory per run
        #[arg(long, env = "SVALA_RUNS_DIR", default_value = "runs")]
        runs_dir: PathBuf,
    },

    /// Score an existing telemetry log against one scenario's checks
    Check {
        /// Evaluation suite (TOML)
        #[arg(short, long)]
        suite: PathBuf,

        /// Scenario id within the suite
        #[arg(long)]
        scenario: String,

        /// Telemetry CSV written by the simulator
        #[arg(short, long)]
        telemetry: PathBuf,

        /// Metadata rows before the CSV header
        #[arg(long, default_value_t = DEFAULT_SKIP_ROWS)]
        skip_rows: usize,
    },

    /// Load and validate a suite
    Validate {
        /// Evaluation suite (TOML)
        #[arg(short, long)]
        suite: PathBuf,
    },

    /// Show the summary of a persisted run
    Show {
        /// Run directory
        #[arg(long)]
        run: PathBuf,

        /// Print the full evaluation document
        #[arg(long)]
        document: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    svala_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            suite,
            config,
            runs_dir,
        } => cmd_run(&suite, config.as_deref(), &runs_dir).await,
        Commands::Check {
            suite,
            scenario,
            telemetry,
            skip_rows,
        } => cmd_check(&suite, &scenario, &telemetry, skip_rows),
        Commands::Validate { suite } => cmd_validate(&suite),
        Commands::Show { run, document } => cmd_show(&run, document),
    }
}

fn load_suite(path: &Path) -> Result<EvaluationSuite> {
    EvaluationSuite::load(path).with_context(|| format!("Failed to load suite {:?}", path))
}

async fn cmd_run(suite_path: &Path, config_path: Option<&Path>, runs_dir: &Path) -> Result<()> {
    let suite = load_suite(suite_path)?;
    let config = match config_path {
        Some(path) => SvalaConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SvalaConfig::default(),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let engine = config.simulation_engine()?;
    let synthesizer = config.synthesizer_with_cancel(Arc::clone(&cancel))?;
    let analyzer = config.static_analyzer();
    let diagnostics = config.diagnostics();

    let archive = RunArchive::create(runs_dir, &suite.task)
        .with_context(|| format!("Failed to create run directory under {:?}", runs_dir))?;
    info!(run_dir = %archive.root().display(), "starting evaluation run");

    tokio::spawn(cancel_on_interrupt(Arc::clone(&cancel)));

    let mut controller = IterationController::new(&suite, &engine, synthesizer.as_ref())
        .with_cancel(cancel)
        .with_static_analyzer(&analyzer)
        .with_min_steps(config.simulation.min_steps);
    if let Some(diagnostics) = &diagnostics {
        controller = controller.with_diagnostics(diagnostics);
    }

    let run = controller.run(&archive).await;

    println!("{}", render_summary(&run));
    println!("Run directory: {}", archive.root().display());

    match run.terminal_reason {
        Some(TerminalReason::Converged) => Ok(()),
        Some(reason) => bail!("Run finished without converging ({})", reason),
        None => bail!("Run finished without a terminal reason"),
    }
}

/// First Ctrl+C stops the loop after the current step and keeps the
/// archive; a second one exits immediately.
async fn cancel_on_interrupt(cancel: Arc<AtomicBool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("interrupt received; finishing the current step, press Ctrl+C again to abort");
    cancel.store(true, Ordering::SeqCst);
    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}

fn cmd_check(suite_path: &Path, scenario_id: &str, telemetry: &Path, skip_rows: usize) -> Result<()> {
    let suite = load_suite(suite_path)?;
    let scenario = suite
        .scenarios
        .iter()
        .find(|s| s.id == scenario_id)
        .with_context(|| format!("Scenario '{}' is not part of suite {}", scenario_id, suite.task))?;

    let table = TelemetryTable::from_csv_path(telemetry, skip_rows)
        .with_context(|| format!("Failed to read telemetry {:?}", telemetry))?;

    let results = evaluate(&table, &scenario.checks);
    println!("Log based report for scenario: {}:", scenario.id);
    for result in &results {
        println!("{}", result.report_line());
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        bail!("{} of {} checks failed", failed, results.len());
    }
    Ok(())
}

fn cmd_validate(suite_path: &Path) -> Result<()> {
    let suite = load_suite(suite_path)?;
    let checks: usize = suite.scenarios.iter().map(|s| s.checks.len()).sum();
    println!(
        "Suite {} is valid: {} scenarios, {} checks, iteration budget {}",
        suite.task,
        suite.scenarios.len(),
        checks,
        suite.iteration_budget
    );
    Ok(())
}

fn cmd_show(run_dir: &Path, document: bool) -> Result<()> {
    let run = RunArchive::open(run_dir)
        .read_evaluation()
        .with_context(|| format!("Failed to read evaluation document in {:?}", run_dir))?;

    if document {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("{}", render_summary(&run));
    }
    Ok(())
}
