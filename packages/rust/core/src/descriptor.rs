//! Turning a job event into a descriptor and a job-scoped store.

use serde_json::Value;
use tracing::{debug, info, instrument};

use sitegen_shared::{JobDescriptor, Result};
use sitegen_storage::StoreConnector;

/// A parsed job with a store that uses the job's own credentials.
pub struct Job<S> {
    pub descriptor: JobDescriptor,
    pub store: S,
}

/// Parse `event` and connect to the artifact store as the job.
#[instrument(skip_all)]
pub fn read_job<C: StoreConnector>(event: &Value, connector: &C) -> Result<Job<C::Store>> {
    let descriptor = JobDescriptor::from_event(event)?;
    info!(
        input = %descriptor.input.location,
        output = %descriptor.output,
        "job accepted"
    );
    debug!(user_parameters = %descriptor.user_parameters, "action configuration");

    let store = connector.connect(&descriptor.credentials)?;
    Ok(Job { descriptor, store })
}
