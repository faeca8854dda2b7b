//! Runtime configuration for sitegen.
//!
//! Configuration comes from the process environment only; this tool owns no
//! config file. CLI flags override environment values, which override
//! defaults.

use std::ffi::OsString;
use std::path::PathBuf;

use url::Url;

use crate::error::{Result, SitegenError};
use crate::types::ArtifactCredentials;

/// Region used when neither `AWS_REGION` nor `AWS_DEFAULT_REGION` is set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Directory under `LAMBDA_TASK_ROOT` holding the bundled node runtime.
const RUNTIME_BIN_SUBDIR: &str = "node/bin";

// ---------------------------------------------------------------------------
// StepConfig
// ---------------------------------------------------------------------------

/// Everything the step reads from its environment.
#[derive(Debug, Clone, Default)]
pub struct StepConfig {
    /// AWS region for S3 and CodePipeline.
    pub region: String,
    /// S3 endpoint override; enables path-style addressing.
    pub s3_endpoint: Option<Url>,
    /// CodePipeline endpoint override.
    pub codepipeline_endpoint: Option<Url>,
    /// The host's own credentials, used to report job results.
    pub host_credentials: Option<ArtifactCredentials>,
    /// Bundled runtime executables, prepended to the build `PATH`.
    pub runtime_bin_dir: Option<PathBuf>,
    /// Parent directory for working directories and temp archives.
    pub work_dir: Option<PathBuf>,
    /// Search path inherited from the environment.
    pub inherited_path: Option<OsString>,
}

impl StepConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let config = Self::from_lookup(|name| std::env::var_os(name))?;
        tracing::debug!(
            region = %config.region,
            runtime_bin_dir = ?config.runtime_bin_dir,
            work_dir = ?config.work_dir,
            "loaded step configuration"
        );
        Ok(config)
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let text = |name: &str| -> Option<String> {
            lookup(name)
                .and_then(|v| v.into_string().ok())
                .filter(|v| !v.is_empty())
        };

        let region = text("AWS_REGION")
            .or_else(|| text("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let s3_endpoint = text("SITEGEN_S3_ENDPOINT")
            .map(|v| parse_endpoint("SITEGEN_S3_ENDPOINT", &v))
            .transpose()?;
        let codepipeline_endpoint = text("SITEGEN_CODEPIPELINE_ENDPOINT")
            .map(|v| parse_endpoint("SITEGEN_CODEPIPELINE_ENDPOINT", &v))
            .transpose()?;

        let host_credentials = match (text("AWS_ACCESS_KEY_ID"), text("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(ArtifactCredentials {
                access_key_id,
                secret_access_key,
                session_token: text("AWS_SESSION_TOKEN"),
            }),
            _ => None,
        };

        let runtime_bin_dir = lookup("LAMBDA_TASK_ROOT")
            .filter(|v| !v.is_empty())
            .map(|root| PathBuf::from(root).join(RUNTIME_BIN_SUBDIR));

        let work_dir = lookup("SITEGEN_WORK_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            region,
            s3_endpoint,
            codepipeline_endpoint,
            host_credentials,
            runtime_bin_dir,
            work_dir,
            inherited_path: lookup("PATH"),
        })
    }

    /// Credentials for reporting to the orchestrator, or a config error.
    pub fn require_host_credentials(&self) -> Result<&ArtifactCredentials> {
        self.host_credentials.as_ref().ok_or_else(|| {
            SitegenError::config(
                "AWS credentials not found. Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.",
            )
        })
    }
}

fn parse_endpoint(name: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| SitegenError::config(format!("invalid {name} '{value}': {e}")))
}

// ---------------------------------------------------------------------------
// Build config (derived)
// ---------------------------------------------------------------------------

/// What the build runner needs from the configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Prepended to the child's `PATH` when set.
    pub runtime_bin_dir: Option<PathBuf>,
    /// Parent directory for the isolated home.
    pub work_dir: Option<PathBuf>,
    /// Base search path for child processes.
    pub inherited_path: Option<OsString>,
}

impl From<&StepConfig> for BuildConfig {
    fn from(config: &StepConfig) -> Self {
        Self {
            runtime_bin_dir: config.runtime_bin_dir.clone(),
            work_dir: config.work_dir.clone(),
            inherited_path: config.inherited_path.clone(),
        }
    }
}

impl BuildConfig {
    /// The `PATH` value child processes should see.
    pub fn child_path(&self) -> Result<Option<OsString>> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(bin) = &self.runtime_bin_dir {
            dirs.push(bin.clone());
        }
        if let Some(path) = &self.inherited_path {
            dirs.extend(std::env::split_paths(path));
        }
        if dirs.is_empty() {
            return Ok(None);
        }
        std::env::join_paths(dirs)
            .map(Some)
            .map_err(|e| SitegenError::config(format!("cannot compose PATH: {e}")))
    }
}
