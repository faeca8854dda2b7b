//! Job outcome reporting to the orchestrator.
//!
//! Every job ends with exactly one call on a [`JobReporter`]: success with the
//! job id, or failure with the job id and [`FailureDetails`].
//! [`CodePipelineReporter`] implements this over the CodePipeline JSON API.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use sitegen_shared::sigv4::{self, SignableRequest, SigningParams};
use sitegen_shared::{ArtifactCredentials, FailureDetails, Result, SitegenError, StepConfig};

/// Signing name of the CodePipeline service.
const SERVICE: &str = "codepipeline";

/// `X-Amz-Target` prefix for the CodePipeline API version in use.
const TARGET_PREFIX: &str = "CodePipeline_20150709";

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Request timeout for report calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("sitegen/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// JobReporter
// ---------------------------------------------------------------------------

/// Tells the orchestrator how a job ended.
pub trait JobReporter: Send + Sync {
    fn report_success(&self, job_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn report_failure(
        &self,
        job_id: &str,
        details: &FailureDetails,
    ) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutJobSuccessResult<'a> {
    job_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PutJobFailureResult<'a> {
    job_id: &'a str,
    failure_details: &'a FailureDetails,
}

// ---------------------------------------------------------------------------
// CodePipelineReporter
// ---------------------------------------------------------------------------

/// Reports job results with the host's own credentials.
pub struct CodePipelineReporter {
    http: Client,
    endpoint: Url,
    region: String,
    credentials: ArtifactCredentials,
}

impl CodePipelineReporter {
    /// Build a reporter for `region`, optionally against a custom endpoint.
    pub fn new(
        credentials: ArtifactCredentials,
        region: &str,
        endpoint: Option<Url>,
    ) -> Result<Self> {
        let endpoint = match endpoint {
            Some(url) => url,
            None => Url::parse(&format!("https://codepipeline.{region}.amazonaws.com/"))
                .map_err(|e| SitegenError::config(format!("invalid region '{region}': {e}")))?,
        };

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SitegenError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            region: region.to_string(),
            credentials,
        })
    }

    /// Build a reporter from the step configuration.
    pub fn from_config(config: &StepConfig) -> Result<Self> {
        let credentials = config.require_host_credentials()?.clone();
        Self::new(credentials, &config.region, config.codepipeline_endpoint.clone())
    }

    /// Call one CodePipeline action with a JSON body.
    async fn call<T: Serialize>(&self, action: &str, body: &T) -> Result<()> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| SitegenError::Report(format!("failed to encode {action}: {e}")))?;
        let target = format!("{TARGET_PREFIX}.{action}");
        let headers = [("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())];

        let signed = sigv4::sign(
            &SignableRequest {
                method: "POST",
                url: &self.endpoint,
                headers: &headers,
                payload_sha256: &sigv4::payload_sha256(&payload),
            },
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: SERVICE,
                time: Utc::now(),
            },
        );

        let mut request = self.http.post(self.endpoint.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| SitegenError::Report(format!("{action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, action, "orchestrator rejected report");
            return Err(SitegenError::Report(format!(
                "{action}: HTTP {status}: {}",
                body.trim()
            )));
        }
        Ok(())
    }
}

impl JobReporter for CodePipelineReporter {
    #[instrument(skip_all, fields(job_id = %job_id))]
    async fn report_success(&self, job_id: &str) -> Result<()> {
        self.call("PutJobSuccessResult", &PutJobSuccessResult { job_id })
            .await?;
        info!("reported job success");
        Ok(())
    }

    #[instrument(skip_all, fields(job_id = %job_id))]
    async fn report_failure(&self, job_id: &str, details: &FailureDetails) -> Result<()> {
        self.call(
            "PutJobFailureResult",
            &PutJobFailureResult {
                job_id,
                failure_details: details,
            },
        )
        .await?;
        info!("reported job failure");
        Ok(())
    }
}
