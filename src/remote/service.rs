//! Remote job service abstraction
//!
//! The orchestrator talks to the separation service only through this
//! trait, so it can be driven by the HTTP client or an in-memory stand-in.

use crate::error::Result;
use crate::remote::metadata::JobMetadata;
use crate::remote::types::{Asset, Job};
use std::path::Path;

/// Asynchronous remote compute service
pub trait JobService: Send + Sync {
    /// Upload a local file and return the created asset
    fn upload_asset(&self, file_path: &Path) -> Result<Asset>;

    /// Submit a job against an uploaded asset
    fn create_job(
        &self,
        asset_id: &str,
        metadata: &JobMetadata,
        callback_url: Option<&str>,
    ) -> Result<Job>;

    /// Fetch the current state of a job
    fn get_job(&self, job_id: &str) -> Result<Job>;

    /// Stream an output asset to `destination`, overwriting it; returns bytes written
    fn download_asset(&self, link: &str, destination: &Path) -> Result<u64>;

    /// Get the name of this service (for logging)
    fn name(&self) -> &'static str;
}
