//! Artifact store access: the [`ArtifactStore`] seam and its S3 implementation.
//!
//! The pipeline only ever needs two operations, download an object to a file
//! and upload a file as an object. [`S3Client`] implements them over the S3
//! REST API with SigV4-signed requests, scoped to one job's temporary
//! credentials.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use sitegen_shared::sigv4::{self, EMPTY_PAYLOAD_SHA256, SignableRequest, SigningParams};
use sitegen_shared::{ArtifactCredentials, Result, S3Location, SitegenError, StepConfig};

/// Signing name of the S3 service.
const SERVICE: &str = "s3";

/// Content type of every uploaded artifact.
const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Connect timeout for S3 requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for storage requests.
const USER_AGENT: &str = concat!("sitegen/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Blob storage holding pipeline artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Download the object at `location` into the file at `dest`. Returns bytes written.
    fn download(
        &self,
        location: &S3Location,
        dest: &Path,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Upload the file at `src` as the object at `location`. Returns bytes sent.
    fn upload(&self, location: &S3Location, src: &Path) -> impl Future<Output = Result<u64>> + Send;
}

/// Builds an [`ArtifactStore`] scoped to one job's credentials.
pub trait StoreConnector {
    type Store: ArtifactStore;

    fn connect(&self, credentials: &ArtifactCredentials) -> Result<Self::Store>;
}

// ---------------------------------------------------------------------------
// S3 options & connector
// ---------------------------------------------------------------------------

/// How to reach S3.
#[derive(Debug, Clone)]
pub struct S3Options {
    /// Region used for the endpoint and the signing scope.
    pub region: String,
    /// Endpoint override. When set, requests use path-style addressing.
    pub endpoint: Option<Url>,
}

impl From<&StepConfig> for S3Options {
    fn from(config: &StepConfig) -> Self {
        Self {
            region: config.region.clone(),
            endpoint: config.s3_endpoint.clone(),
        }
    }
}

/// Creates [`S3Client`]s from job credentials.
#[derive(Debug, Clone)]
pub struct S3Connector {
    options: S3Options,
}

impl S3Connector {
    pub fn new(options: S3Options) -> Self {
        Self { options }
    }
}

impl StoreConnector for S3Connector {
    type Store = S3Client;

    fn connect(&self, credentials: &ArtifactCredentials) -> Result<S3Client> {
        S3Client::new(credentials.clone(), &self.options)
    }
}

// ---------------------------------------------------------------------------
// S3Client
// ---------------------------------------------------------------------------

/// S3 REST client signing every request with SigV4.
pub struct S3Client {
    http: Client,
    region: String,
    endpoint: Option<Url>,
    credentials: ArtifactCredentials,
}

impl S3Client {
    /// Build a client authenticated with `credentials`.
    pub fn new(credentials: ArtifactCredentials, options: &S3Options) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SitegenError::Network(format!("failed to build HTTP client: {e}")))?;

        debug!(
            region = %options.region,
            endpoint = ?options.endpoint.as_ref().map(Url::as_str),
            access_key_id = %credentials.access_key_id,
            "created S3 client"
        );

        Ok(Self {
            http,
            region: options.region.clone(),
            endpoint: options.endpoint.clone(),
            credentials,
        })
    }

    /// URL of an object.
    ///
    /// Virtual-hosted style by default; path style against an endpoint
    /// override or for bucket names containing dots (which break TLS
    /// hostname matching). Keys with `.` or `..` segments are rejected.
    pub fn object_url(&self, location: &S3Location) -> Result<Url> {
        let key = sigv4::uri_encode(&location.key, true);
        let bucket = &location.bucket;

        let raw = match &self.endpoint {
            Some(endpoint) => {
                let base = endpoint.as_str().trim_end_matches('/');
                format!("{base}/{}/{key}", sigv4::uri_encode(bucket, false))
            }
            None if bucket.contains('.') => {
                format!("https://s3.{}.amazonaws.com/{bucket}/{key}", self.region)
            }
            None => format!("https://{bucket}.s3.{}.amazonaws.com/{key}", self.region),
        };

        let url = Url::parse(&raw)
            .map_err(|e| SitegenError::Storage(format!("invalid object URL for {location}: {e}")))?;

        // URL parsing collapses `.` and `..` segments (encoded or not), which
        // would address a different object.
        if !url.path().ends_with(&format!("/{key}")) {
            return Err(SitegenError::Storage(format!(
                "object key of {location} cannot be addressed without rewriting it to {}",
                url.path()
            )));
        }
        Ok(url)
    }

    /// Sign and send a request.
    async fn send_signed(
        &self,
        method: Method,
        url: &Url,
        headers: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let payload_hash = body
            .as_deref()
            .map(sigv4::payload_sha256)
            .unwrap_or_else(|| EMPTY_PAYLOAD_SHA256.to_string());

        let signed = sigv4::sign(
            &SignableRequest {
                method: method.as_str(),
                url,
                headers,
                payload_sha256: &payload_hash,
            },
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service: SERVICE,
                time: Utc::now(),
            },
        );

        let mut request = self.http.request(method.clone(), url.clone());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        for (name, value) in signed {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        request
            .send()
            .await
            .map_err(|e| SitegenError::Network(format!("{method} {url}: {e}")))
    }
}

impl ArtifactStore for S3Client {
    #[instrument(skip_all, fields(location = %location))]
    async fn download(&self, location: &S3Location, dest: &Path) -> Result<u64> {
        let url = self.object_url(location)?;
        let response = self.send_signed(Method::GET, &url, &[], None).await?;
        let mut response = check_status(response, location).await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SitegenError::io(dest, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SitegenError::Network(format!("{location}: failed to read body: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| SitegenError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| SitegenError::io(dest, e))?;

        info!(bytes = written, "downloaded artifact");
        Ok(written)
    }

    #[instrument(skip_all, fields(location = %location))]
    async fn upload(&self, location: &S3Location, src: &Path) -> Result<u64> {
        let body = tokio::fs::read(src)
            .await
            .map_err(|e| SitegenError::io(src, e))?;
        let len = body.len() as u64;

        let url = self.object_url(location)?;
        let response = self
            .send_signed(
                Method::PUT,
                &url,
                &[("content-type", ARCHIVE_CONTENT_TYPE)],
                Some(body),
            )
            .await?;
        check_status(response, location).await?;

        info!(bytes = len, "uploaded artifact");
        Ok(len)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map an S3 error response onto the error taxonomy.
async fn check_status(response: Response, location: &S3Location) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let code = s3_error_code(&body);
    debug!(%status, code = code.unwrap_or("-"), "S3 request rejected");

    let not_found = status == StatusCode::NOT_FOUND || matches!(code, Some("NoSuchKey" | "NoSuchBucket"));
    if not_found {
        return Err(SitegenError::NotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        });
    }
    if status == StatusCode::FORBIDDEN {
        return Err(SitegenError::AccessDenied {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        });
    }

    Err(SitegenError::Storage(format!(
        "{location}: HTTP {status}{}",
        code.map(|c| format!(" ({c})")).unwrap_or_default()
    )))
}

/// Pull `<Code>` out of an S3 XML error document.
fn s3_error_code(body: &str) -> Option<&str> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(body[start..end].trim())
}
