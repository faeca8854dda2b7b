//! Test doubles: fake package managers, an in-memory store, a recording reporter.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use sitegen_reporter::JobReporter;
use sitegen_shared::{
    ArtifactCredentials, BuildConfig, FailureDetails, Result, S3Location, SitegenError,
};
use sitegen_storage::{ArtifactStore, StoreConnector};

// ---------------------------------------------------------------------------
// Fake npm / yarn
// ---------------------------------------------------------------------------

/// What the fake package manager does on `run build`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BuildBehavior {
    /// Writes `build/index.html`, `build/static/site.css` and `build/.nojekyll`.
    Succeeds,
    /// Prints the message to stderr and exits 1.
    Fails(&'static str),
    /// Prints a few hundred warning lines, then the message, and exits 1.
    FailsNoisily(&'static str),
    /// Exits 0 without writing `build/`.
    NoOutput,
    /// The install command exits 2.
    InstallFails,
}

/// A bin directory of shell scripts standing in for package managers.
pub(crate) struct FakeToolchain {
    root: TempDir,
}

impl FakeToolchain {
    /// File in the source tree where install records the `HOME` it saw.
    pub const HOME_RECORD: &'static str = ".sitegen-home";

    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("toolchain dir");
        fs::create_dir(root.path().join("bin")).expect("bin dir");
        Self { root }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    fn log_path(&self) -> PathBuf {
        self.root.path().join("calls.log")
    }

    pub fn install(&self, name: &str, behavior: BuildBehavior) {
        let install = match behavior {
            BuildBehavior::InstallFails => "  echo 'ERR! network unreachable' >&2\n  exit 2",
            _ => "  printf '%s' \"$HOME\" > .sitegen-home\n  echo 'added 42 packages'",
        };
        let build = match behavior {
            BuildBehavior::Succeeds => "  mkdir -p build/static\n  \
                 echo '<h1>site</h1>' > build/index.html\n  \
                 echo 'body{}' > build/static/site.css\n  \
                 : > build/.nojekyll\n  \
                 echo 'compiled with 1 warning' >&2"
                .to_string(),
            BuildBehavior::Fails(message) => format!("  echo '{message}' >&2\n  exit 1"),
            BuildBehavior::FailsNoisily(message) => format!(
                "  i=0\n  \
                 while [ $i -lt 400 ]; do echo \"warning: deprecated dependency number $i\"; i=$((i+1)); done\n  \
                 echo '{message}'\n  \
                 exit 1"
            ),
            BuildBehavior::NoOutput | BuildBehavior::InstallFails => {
                "  echo 'nothing to build'".to_string()
            }
        };
        let script = format!(
            "#!/bin/sh\n\
             if [ $# -eq 0 ]; then echo '{name}' >> '{log}'; else echo \"{name} $*\" >> '{log}'; fi\n\
             echo \"> {name} $*\"\n\
             if [ \"$1\" = \"run\" ]; then\n{build}\nelse\n{install}\nfi\n",
            log = self.log_path().display(),
        );

        let path = self.bin_dir().join(name);
        fs::write(&path, script).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    /// Build config resolving package managers from this toolchain first.
    pub fn build_config(&self, work_dir: Option<PathBuf>) -> BuildConfig {
        BuildConfig {
            runtime_bin_dir: Some(self.bin_dir()),
            work_dir,
            inherited_path: std::env::var_os("PATH"),
        }
    }

    /// Invocations so far, one `program args...` line each.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Write a minimal npm project into `root`.
pub(crate) fn npm_project(root: &Path) {
    fs::write(
        root.join("package.json"),
        r#"{"name":"site","private":true,"scripts":{"build":"react-scripts build"}}"#,
    )
    .expect("package.json");
    fs::create_dir_all(root.join("src")).expect("src");
    fs::write(root.join("src/index.js"), "console.log('hi');\n").expect("index.js");
}

/// Zip `root` and return the archive bytes.
pub(crate) fn zip_tree(root: &Path) -> Vec<u8> {
    let scratch = tempfile::tempdir().expect("scratch");
    let archive = scratch.path().join("tree.zip");
    sitegen_artifacts::create_archive(root, &archive).expect("pack");
    fs::read(&archive).expect("read archive")
}

// ---------------------------------------------------------------------------
// In-memory artifact store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    objects: HashMap<(String, String), Vec<u8>>,
    uploads: Vec<S3Location>,
    connections: Vec<ArtifactCredentials>,
    reject_uploads: bool,
}

/// Store and connector in one; clones share state.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// A store whose uploads fail the way S3 does for a read-only role.
    pub fn rejecting_uploads() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().reject_uploads = true;
        store
    }

    pub fn put(&self, location: &S3Location, bytes: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((location.bucket.clone(), location.key.clone()), bytes);
    }

    pub fn get(&self, location: &S3Location) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(location.bucket.clone(), location.key.clone()))
            .cloned()
    }

    pub fn uploads(&self) -> Vec<S3Location> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn connections(&self) -> Vec<ArtifactCredentials> {
        self.state.lock().unwrap().connections.clone()
    }
}

impl StoreConnector for MemoryStore {
    type Store = MemoryStore;

    fn connect(&self, credentials: &ArtifactCredentials) -> Result<MemoryStore> {
        self.state.lock().unwrap().connections.push(credentials.clone());
        Ok(self.clone())
    }
}

impl ArtifactStore for MemoryStore {
    async fn download(&self, location: &S3Location, dest: &Path) -> Result<u64> {
        let bytes = self.get(location).ok_or_else(|| SitegenError::NotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        })?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| SitegenError::io(dest, e))?;
        Ok(bytes.len() as u64)
    }

    async fn upload(&self, location: &S3Location, src: &Path) -> Result<u64> {
        let bytes = tokio::fs::read(src)
            .await
            .map_err(|e| SitegenError::io(src, e))?;
        let len = bytes.len() as u64;
        if self.state.lock().unwrap().reject_uploads {
            return Err(SitegenError::AccessDenied {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            });
        }
        self.put(location, bytes);
        self.state.lock().unwrap().uploads.push(location.clone());
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// Recording reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Report {
    Success(String),
    Failure(String, FailureDetails),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
    reject: bool,
}

impl RecordingReporter {
    /// A reporter whose every call fails.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    fn record(&self, report: Report) -> Result<()> {
        if self.reject {
            return Err(SitegenError::Report("orchestrator unavailable".into()));
        }
        self.reports.lock().unwrap().push(report);
        Ok(())
    }
}

impl JobReporter for RecordingReporter {
    async fn report_success(&self, job_id: &str) -> Result<()> {
        self.record(Report::Success(job_id.to_string()))
    }

    async fn report_failure(&self, job_id: &str, details: &FailureDetails) -> Result<()> {
        self.record(Report::Failure(job_id.to_string(), details.clone()))
    }
}
