//! Instrument packaging: the upload → template → stage → archive flow.
//!
//! [`Packager`] is what the HTTP layer talks to. It runs the blocking
//! staging steps from [`crate::job`] on tokio's blocking pool so concurrent
//! requests never stall the reactor.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::job::{self, Job};
use crate::types::{Package, PackageRequest, is_plain_file_name};
use crate::{Error, Result};

/// Packages uploaded samples with the template for their root note.
///
/// Cheap to clone; all clones share the same immutable configuration.
#[derive(Debug, Clone)]
pub struct Packager {
    config: Arc<ServiceConfig>,
}

impl Packager {
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Build an archive for `request`.
    ///
    /// The job directory is kept after both success and failure.
    pub async fn generate(&self, request: PackageRequest) -> Result<Package> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || generate_package(&config, &request)).await?
    }
}

/// Synchronous packaging run against the directories in `config`.
#[instrument(skip_all, fields(root_note = %request.root_note, instrument = %request.instrument_name))]
pub fn generate_package(config: &ServiceConfig, request: &PackageRequest) -> Result<Package> {
    if request.samples.is_empty() {
        return Err(Error::NoSamples);
    }

    let template = job::resolve_template(
        &config.root_notes,
        &config.template_dir,
        &request.root_note,
    )?;

    if let Some(bad) = request
        .samples
        .iter()
        .find(|s| !is_plain_file_name(&s.file_name))
    {
        return Err(Error::InvalidRequest(format!(
            "Invalid sample filename: {:?}",
            bad.file_name
        )));
    }

    let probe = job::archive_file_name(&request.instrument_name, &request.root_note, Uuid::nil());
    if !is_plain_file_name(&probe) {
        return Err(Error::InvalidRequest(format!(
            "Invalid instrument name: {:?}",
            request.instrument_name
        )));
    }

    let job = Job::create(&config.work_dir)?;
    let file_name =
        job::archive_file_name(&request.instrument_name, &request.root_note, job.id());

    let stored = job::persist_samples(job.samples_dir(), &request.samples)?;
    let staged_template = job::copy_template(&template, job.root())?;

    let path = config.work_dir.join(&file_name);
    job::write_archive(&staged_template, job.samples_dir(), &path)?;

    info!(
        job_id = %job.id(),
        uploaded = request.samples.len(),
        stored,
        archive = %file_name,
        "Package generated"
    );

    Ok(Package {
        job_id: job.id(),
        path,
        file_name,
    })
}
