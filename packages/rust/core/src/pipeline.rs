//! End-to-end job handling.
//!
//! `handle_job` drives one job through fetch, build and publish, and always
//! finishes with exactly one report to the orchestrator:
//!
//! ```text
//! Reading → Fetching → Building → Publishing → report success
//!    └──────────┴──────────┴───────────┴──────→ report failure
//! ```
//!
//! Scratch directories are released after the report in either case.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, instrument};

use sitegen_reporter::JobReporter;
use sitegen_shared::{BuildConfig, FailureDetails, Result, SitegenError, job_id_from_event};
use sitegen_storage::StoreConnector;

use crate::build::run_build;
use crate::descriptor::read_job;
use crate::fetch::download_source;
use crate::publish::upload_site;
use crate::workspace::JobWorkspace;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Stage a job was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Reading,
    Fetching,
    Building,
    Publishing,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "read",
            Self::Fetching => "fetch",
            Self::Building => "build",
            Self::Publishing => "publish",
        })
    }
}

/// How a job ended, as reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { stage: JobStage, message: String },
}

type StageResult<T> = std::result::Result<T, (JobStage, SitegenError)>;

trait AtStage<T> {
    fn at(self, stage: JobStage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: JobStage) -> StageResult<T> {
        self.map_err(|e| (stage, e))
    }
}

// ---------------------------------------------------------------------------
// handle_job
// ---------------------------------------------------------------------------

/// Process one CodePipeline job event.
///
/// Fetch, build and publish failures become a failure report and
/// `Ok(JobOutcome::Failed)`. `Err` means the outcome could not be reported:
/// either the reporter failed or the event carries no job id at all.
#[instrument(skip_all, fields(job_id = tracing::field::Empty))]
pub async fn handle_job<C, R>(
    event: &Value,
    connector: &C,
    reporter: &R,
    config: &BuildConfig,
) -> Result<JobOutcome>
where
    C: StoreConnector,
    R: JobReporter,
{
    let job_id = job_id_from_event(event)
        .ok_or_else(|| SitegenError::payload("job event has no `CodePipeline.job.id`"))?;
    tracing::Span::current().record("job_id", job_id.as_str());

    let start = Instant::now();
    let mut workspace = JobWorkspace::new(config.work_dir.clone());

    let outcome = match run_stages(event, connector, config, &mut workspace).await {
        Ok(()) => {
            reporter.report_success(&job_id).await?;
            info!(elapsed_ms = start.elapsed().as_millis() as u64, "job succeeded");
            JobOutcome::Succeeded
        }
        Err((stage, err)) => {
            error!(%stage, error = %err, details = ?err, "job failed");
            let details = FailureDetails::job_failed(&err);
            reporter.report_failure(&job_id, &details).await?;
            JobOutcome::Failed {
                stage,
                message: details.message,
            }
        }
    };

    workspace.cleanup();
    Ok(outcome)
}

async fn run_stages<C: StoreConnector>(
    event: &Value,
    connector: &C,
    config: &BuildConfig,
    workspace: &mut JobWorkspace,
) -> StageResult<()> {
    let job = read_job(event, connector).at(JobStage::Reading)?;
    let scratch_root: Option<&Path> = config.work_dir.as_deref();

    let source_dir = workspace.create_dir("source").at(JobStage::Fetching)?;
    download_source(&job.store, &job.descriptor.input, &source_dir, scratch_root)
        .await
        .at(JobStage::Fetching)?;

    let site_dir = workspace.create_dir("site").at(JobStage::Building)?;
    run_build(&source_dir, &site_dir, config)
        .await
        .at(JobStage::Building)?;

    upload_site(&site_dir, &job.store, &job.descriptor.output, scratch_root)
        .await
        .at(JobStage::Publishing)?;
    Ok(())
}
