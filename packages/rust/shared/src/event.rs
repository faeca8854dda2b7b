//! CodePipeline job event parsing.
//!
//! The wire structs below mirror the event JSON one-to-one; they are turned
//! into a [`JobDescriptor`] without any transformation beyond picking the
//! first input and output artifact.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SitegenError};
use crate::types::{ArtifactCredentials, InputArtifact, JobDescriptor, S3Location};

/// Top-level key CodePipeline wraps the job in.
pub const JOB_KEY: &str = "CodePipeline.job";

#[derive(Debug, Deserialize)]
struct TriggerEvent {
    #[serde(rename = "CodePipeline.job")]
    job: WireJob,
}

#[derive(Debug, Deserialize)]
struct WireJob {
    id: String,
    data: WireJobData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJobData {
    action_configuration: WireActionConfiguration,
    input_artifacts: Vec<WireInputArtifact>,
    output_artifacts: Vec<WireOutputArtifact>,
    artifact_credentials: WireCredentials,
}

#[derive(Debug, Deserialize)]
struct WireActionConfiguration {
    configuration: WireConfiguration,
}

#[derive(Debug, Deserialize)]
struct WireConfiguration {
    #[serde(rename = "UserParameters")]
    user_parameters: String,
}

#[derive(Debug, Deserialize)]
struct WireInputArtifact {
    location: WireArtifactLocation,
    // Must be present, may be null.
    #[serde(deserialize_with = "Option::deserialize")]
    revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireOutputArtifact {
    location: WireArtifactLocation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireArtifactLocation {
    s3_location: WireS3Location,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireS3Location {
    bucket_name: String,
    object_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

impl From<WireS3Location> for S3Location {
    fn from(wire: WireS3Location) -> Self {
        Self {
            bucket: wire.bucket_name,
            key: wire.object_key,
        }
    }
}

impl JobDescriptor {
    /// Extract a job descriptor from a CodePipeline job event.
    pub fn from_event(event: &Value) -> Result<Self> {
        let event = TriggerEvent::deserialize(event)
            .map_err(|e| SitegenError::payload(format!("malformed job event: {e}")))?;
        let WireJob { id, data } = event.job;

        let input = data
            .input_artifacts
            .into_iter()
            .next()
            .ok_or_else(|| SitegenError::payload("job event has no input artifacts"))?;
        let output = data
            .output_artifacts
            .into_iter()
            .next()
            .ok_or_else(|| SitegenError::payload("job event has no output artifacts"))?;

        let creds = data.artifact_credentials;

        Ok(Self {
            job_id: id,
            input: InputArtifact {
                location: input.location.s3_location.into(),
                revision: input.revision,
            },
            output: output.location.s3_location.into(),
            credentials: ArtifactCredentials {
                access_key_id: creds.access_key_id,
                secret_access_key: creds.secret_access_key,
                session_token: Some(creds.session_token),
            },
            user_parameters: data.action_configuration.configuration.user_parameters,
        })
    }
}

/// Pull only the job id out of an event, for reporting a malformed payload.
pub fn job_id_from_event(event: &Value) -> Option<String> {
    event
        .get(JOB_KEY)?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path(name: &str) -> std::path::PathBuf {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures")
            .join(name)
    }

    fn load_event() -> Value {
        let raw = std::fs::read_to_string(fixture_path("events/codepipeline-job.json"))
            .expect("read event fixture");
        serde_json::from_str(&raw).expect("parse event fixture")
    }

    #[test]
    fn extracts_documented_fields() {
        let job = JobDescriptor::from_event(&load_event()).expect("descriptor");

        assert_eq!(job.job_id, "11111111-abcd-1111-abcd-111111abcdef");
        assert_eq!(job.input.location.bucket, "codepipeline-us-east-1-artifacts");
        assert_eq!(job.input.location.key, "site-pipeline/SourceArti/Kp2xF0a.zip");
        assert_eq!(job.input.revision.as_deref(), Some("7d1c2a9f3e"));
        assert_eq!(job.output.bucket, "codepipeline-us-east-1-artifacts");
        assert_eq!(job.output.key, "site-pipeline/SiteOutput/Qm81bZc.zip");
        assert_eq!(job.credentials.access_key_id, "ASIAEXAMPLEKEYID");
        assert_eq!(job.credentials.secret_access_key, "example-secret");
        assert_eq!(job.credentials.session_token.as_deref(), Some("example-session-token"));
        assert_eq!(job.user_parameters, "--production");
    }

    #[test]
    fn null_revision_is_accepted() {
        let mut event = load_event();
        event[JOB_KEY]["data"]["inputArtifacts"][0]["revision"] = Value::Null;
        let job = JobDescriptor::from_event(&event).expect("descriptor");
        assert!(job.input.revision.is_none());
    }

    #[test]
    fn missing_revision_key_is_rejected() {
        let mut event = load_event();
        event[JOB_KEY]["data"]["inputArtifacts"][0]
            .as_object_mut()
            .expect("artifact object")
            .remove("revision");
        let err = JobDescriptor::from_event(&event).unwrap_err();
        assert!(matches!(err, SitegenError::Payload { .. }));
        assert!(err.to_string().contains("revision"));
    }

    #[test]
    fn missing_field_is_payload_error() {
        let mut event = load_event();
        event[JOB_KEY]["data"]["outputArtifacts"][0]["location"]["s3Location"]
            .as_object_mut()
            .expect("s3Location object")
            .remove("objectKey");
        let err = JobDescriptor::from_event(&event).unwrap_err();
        assert!(matches!(err, SitegenError::Payload { .. }));
        assert!(err.to_string().contains("objectKey"));
    }

    #[test]
    fn empty_artifact_list_is_payload_error() {
        let mut event = load_event();
        event[JOB_KEY]["data"]["inputArtifacts"] = serde_json::json!([]);
        let err = JobDescriptor::from_event(&event).unwrap_err();
        assert!(err.to_string().contains("no input artifacts"));
    }

    #[test]
    fn job_id_survives_malformed_data() {
        let event = serde_json::json!({ "CodePipeline.job": { "id": "job-42", "data": {} } });
        assert!(JobDescriptor::from_event(&event).is_err());
        assert_eq!(job_id_from_event(&event).as_deref(), Some("job-42"));
        assert_eq!(job_id_from_event(&serde_json::json!({})), None);
    }
}
