//! sitegen CLI: the static-site build step of a CodePipeline deployment.
//!
//! `sitegen run` handles one job per process. The job event is read from
//! `--event <file>`, or from stdin when the flag is omitted or `-`, so the
//! binary can sit behind any invoker that pipes the payload through.
//!
//! Runtime environment:
//! - `LAMBDA_TASK_ROOT`: when set, `<root>/node/bin` is put first on the
//!   `PATH` of npm/yarn children, so a bundled Node runtime wins.
//! - `SITEGEN_WORK_DIR` / `--work-dir`: where job directories and the
//!   throwaway build `HOME` are created. Defaults to the system temp dir.
//! - `AWS_*`: region and the host credentials used to report job results.
//!
//! Logs go to stderr. stdout carries `complete` once the job outcome (either
//! one) has been reported; a non-zero exit means it could not be reported.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
