//! Client side of the remote separation service
//!
//! - `metadata`: typed, validated job metadata (model/format/variant catalogs)
//! - `types`: assets, jobs, statuses and results
//! - `service`: the `JobService` trait the orchestrator drives
//! - `http`: reqwest implementation of `JobService`

pub mod http;
pub mod metadata;
pub mod service;
pub mod types;

pub use http::{HttpJobService, DEFAULT_BASE_URL};
pub use metadata::{JobMetadata, Model, OutputFormat, Variant};
pub use service::JobService;
pub use types::{Asset, Job, JobResult, JobStatus, OutputAsset};
