//! Per-job scratch directories.
//!
//! Everything a job writes to disk lives in temporary directories owned by a
//! [`JobWorkspace`]. They are removed when the workspace is cleaned up or
//! dropped, whichever comes first, so an early return never leaks them.

use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::{debug, warn};

use sitegen_shared::{Result, SitegenError};

/// Scratch directories for one job.
#[derive(Debug, Default)]
pub struct JobWorkspace {
    parent: Option<PathBuf>,
    dirs: Vec<TempDir>,
}

impl JobWorkspace {
    /// Create a workspace whose directories live under `parent`, or under the
    /// system temp directory when `None`.
    pub fn new(parent: Option<PathBuf>) -> Self {
        Self {
            parent,
            dirs: Vec::new(),
        }
    }

    /// Create a fresh, empty directory owned by this workspace.
    pub fn create_dir(&mut self, label: &str) -> Result<PathBuf> {
        let dir = scratch_dir(self.parent.as_deref(), label)?;
        let path = dir.path().to_path_buf();
        debug!(label, path = %path.display(), "created job directory");
        self.dirs.push(dir);
        Ok(path)
    }

    /// Remove every directory, logging (not failing on) removal errors.
    pub fn cleanup(self) {
        for dir in self.dirs {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove job directory");
            }
        }
    }
}

/// A new temporary directory named `sitegen-<label>-*`.
pub(crate) fn scratch_dir(parent: Option<&Path>, label: &str) -> Result<TempDir> {
    let prefix = format!("sitegen-{label}-");
    let mut builder = Builder::new();
    builder.prefix(&prefix);
    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };
    dir.map_err(|e| SitegenError::io(scratch_root(parent), e))
}

/// A new temporary file named `sitegen-<label>-*<suffix>`.
pub(crate) fn scratch_file(parent: Option<&Path>, label: &str, suffix: &str) -> Result<NamedTempFile> {
    let prefix = format!("sitegen-{label}-");
    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(suffix);
    let file = match parent {
        Some(parent) => builder.tempfile_in(parent),
        None => builder.tempfile(),
    };
    file.map_err(|e| SitegenError::io(scratch_root(parent), e))
}

fn scratch_root(parent: Option<&Path>) -> PathBuf {
    parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir)
}
