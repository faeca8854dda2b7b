//! Pack and upload the built site.

use std::path::Path;

use tracing::{info, instrument};

use sitegen_artifacts::{PackSummary, create_archive};
use sitegen_shared::{Result, S3Location};
use sitegen_storage::ArtifactStore;

use crate::workspace::scratch_file;

/// Zip the contents of `site_dir` and upload the archive to `output`.
#[instrument(skip_all, fields(output = %output))]
pub async fn upload_site<S: ArtifactStore>(
    site_dir: &Path,
    store: &S,
    output: &S3Location,
    scratch_root: Option<&Path>,
) -> Result<PackSummary> {
    let archive = scratch_file(scratch_root, "site", ".zip")?;
    let summary = create_archive(site_dir, archive.path())?;
    let bytes = store.upload(output, archive.path()).await?;

    info!(bytes, files = summary.files, "site published");
    Ok(summary)
}
