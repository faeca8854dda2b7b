//! Shared types, error model, configuration and request signing for sitegen.
//!
//! This crate is the foundation depended on by all other sitegen crates.
//! It provides:
//! - [`SitegenError`]: the unified error type
//! - The job data model ([`JobDescriptor`], [`S3Location`], [`FailureDetails`])
//! - CodePipeline event parsing ([`JobDescriptor::from_event`])
//! - Configuration ([`StepConfig`], [`BuildConfig`])
//! - AWS SigV4 signing ([`sigv4`])

pub mod config;
pub mod error;
pub mod event;
pub mod sigv4;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{BuildConfig, DEFAULT_REGION, StepConfig};
pub use error::{Result, SitegenError};
pub use event::job_id_from_event;
pub use types::{
    ArtifactCredentials, FailureDetails, FailureKind, InputArtifact, JobDescriptor,
    MAX_FAILURE_MESSAGE_LEN, S3Location,
};
