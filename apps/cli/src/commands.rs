//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde_json::Value;
use tracing::{info, warn};

use sitegen_core::{JobOutcome, PackageManager, handle_job};
use sitegen_reporter::CodePipelineReporter;
use sitegen_shared::{BuildConfig, StepConfig};
use sitegen_storage::{S3Connector, S3Options};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// sitegen: build and publish a static site for a CodePipeline job.
#[derive(Parser)]
#[command(
    name = "sitegen",
    version,
    about = "Build a static site from a CodePipeline source artifact and publish it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// AWS region (overrides AWS_REGION / AWS_DEFAULT_REGION).
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Parent directory for temporary job directories.
    #[arg(long, env = "SITEGEN_WORK_DIR", global = true)]
    pub work_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process one CodePipeline job event.
    Run {
        /// Path to the event JSON, or `-` for stdin.
        #[arg(long, default_value = "-")]
        event: String,
    },

    /// Print the package manager that would build a source directory.
    Detect {
        /// Source directory.
        dir: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitegen=info",
        1 => "sitegen=debug",
        _ => "sitegen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries command results only.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Run { event } => cmd_run(&cli, event).await,
        Command::Detect { dir } => cmd_detect(dir),
    }
}

/// Environment configuration with command-line overrides applied.
fn step_config(cli: &Cli) -> Result<StepConfig> {
    let mut config = StepConfig::from_env()?;
    if let Some(region) = &cli.region {
        config.region = region.clone();
    }
    if let Some(work_dir) = &cli.work_dir {
        config.work_dir = Some(work_dir.clone());
    }
    Ok(config)
}

async fn cmd_run(cli: &Cli, event_source: &str) -> Result<()> {
    let config = step_config(cli)?;
    let event = read_event(event_source)?;

    let connector = S3Connector::new(S3Options::from(&config));
    let reporter = CodePipelineReporter::from_config(&config)?;
    let build = BuildConfig::from(&config);

    info!(region = %config.region, "processing job event");
    match handle_job(&event, &connector, &reporter, &build).await? {
        JobOutcome::Succeeded => info!("job reported as succeeded"),
        JobOutcome::Failed { stage, .. } => warn!(%stage, "job reported as failed"),
    }

    println!("complete");
    Ok(())
}

fn cmd_detect(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(eyre!("not a directory: {}", dir.display()));
    }
    println!("{}", PackageManager::detect(dir));
    Ok(())
}

/// Read and parse the job event from a file, or stdin for `-`.
fn read_event(source: &str) -> Result<Value> {
    let raw = if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .wrap_err("failed to read event from stdin")?;
        raw
    } else {
        std::fs::read_to_string(source).wrap_err_with(|| format!("failed to read event {source}"))?
    };
    serde_json::from_str(&raw).wrap_err("event is not valid JSON")
}
