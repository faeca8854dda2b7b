//! Job data model: what a single pipeline job asks us to do.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Locations & credentials
// ---------------------------------------------------------------------------

/// An object in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
}

impl std::fmt::Display for S3Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// The source artifact: where it lives plus the revision that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArtifact {
    pub location: S3Location,
    /// Revision marker from the source stage. Informational only.
    pub revision: Option<String>,
}

/// Temporary credentials scoped to one job's artifacts.
#[derive(Clone, PartialEq, Eq)]
pub struct ArtifactCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for ArtifactCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JobDescriptor
// ---------------------------------------------------------------------------

/// Everything extracted from one trigger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Opaque token used to report completion.
    pub job_id: String,
    pub input: InputArtifact,
    pub output: S3Location,
    pub credentials: ArtifactCredentials,
    /// Free-form action configuration (`UserParameters`). Not used by the build.
    pub user_parameters: String,
}

// ---------------------------------------------------------------------------
// Failure reporting
// ---------------------------------------------------------------------------

/// Maximum length CodePipeline accepts for a failure message.
pub const MAX_FAILURE_MESSAGE_LEN: usize = 5000;

const TRUNCATION_MARKER: &str = "...";

/// Failure category sent with every failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    JobFailed,
}

/// Body of a failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetails {
    /// Build a `JobFailed` report from any error, keeping the tail of long messages.
    pub fn job_failed(error: &dyn std::fmt::Display) -> Self {
        Self {
            kind: FailureKind::JobFailed,
            message: truncate_tail(&error.to_string(), MAX_FAILURE_MESSAGE_LEN),
        }
    }
}

/// Keep at most `max` characters, dropping from the front.
fn truncate_tail(message: &str, max: usize) -> String {
    let len = message.chars().count();
    if len <= max {
        return message.to_string();
    }
    let keep = max - TRUNCATION_MARKER.len();
    let tail: String = message.chars().skip(len - keep).collect();
    format!("{TRUNCATION_MARKER}{tail}")
}
