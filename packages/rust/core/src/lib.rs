//! Job orchestration for sitegen.
//!
//! A job moves through four stages, each in its own module:
//! - [`descriptor`]: parse the event and connect to the store as the job
//! - [`fetch`]: download and unpack the source archive
//! - [`build`]: install dependencies and run the site build
//! - [`publish`]: pack and upload the built site
//!
//! [`pipeline::handle_job`] ties them together and reports the outcome.

pub mod build;
pub mod descriptor;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod workspace;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use build::{BuildReport, PackageManager, run_build};
pub use pipeline::{JobOutcome, JobStage, handle_job};
pub use workspace::JobWorkspace;
