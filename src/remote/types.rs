//! Wire types for the remote job service

use crate::remote::metadata::JobMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An uploaded input file, identified by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    /// Any other descriptor fields the service returns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Asset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Remote job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Processing,
    Completed,
    Failed,
    Error,
    /// A status this client does not know; treated as still running
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// `completed`, `failed` and `error` end the job
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable result of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAsset {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl OutputAsset {
    /// Local destination inside `output_dir`
    ///
    /// Only the final component of the server-declared name is used so a
    /// name cannot escape `output_dir`. Without a usable name the file is
    /// called `<job id>.wav`.
    pub fn destination(&self, output_dir: &Path, job_id: &str) -> PathBuf {
        let file_name = self
            .name
            .as_deref()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format!("{}.wav", job_id).into());
        output_dir.join(file_name)
    }
}

/// Snapshot of a remote job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output_assets: Vec<OutputAsset>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// `{"job": {...}}` response wrapper
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JobEnvelope {
    pub job: Job,
}

/// Request body of `POST /job/`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateJobRequest<'a> {
    pub asset_id: &'a str,
    pub metadata: &'a JobMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<&'a str>,
}

/// A job driven to `completed` with its outputs on local disk
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Metadata the job was submitted with
    pub metadata: JobMetadata,
    /// Final job snapshot as reported by the service
    pub job: Job,
    /// Downloaded output files, in the order the service listed them
    pub files: Vec<PathBuf>,
    /// Time from job creation to completed download
    pub elapsed: Duration,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deserializes_service_shape() {
        let body = serde_json::json!({
            "job": {
                "id": "job-1",
                "status": "completed",
                "outputAssets": [{"name": "vocals.wav", "link": "https://cdn/x"}],
                "metadata": {"name": "vocals", "format": "wav"},
                "createdAt": "2024-01-01"
            }
        });
        let envelope: JobEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.job.status, JobStatus::Completed);
        assert_eq!(envelope.job.output_assets.len(), 1);
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let job: Job = serde_json::from_value(serde_json::json!({"id": "j", "status": "queued"})).unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
        assert!(!job.status.is_terminal());
        assert!(job.output_assets.is_empty());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Created.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_asset_keeps_extra_fields() {
        let asset: Asset =
            serde_json::from_value(serde_json::json!({"id": "a1", "format": "mp3"})).unwrap();
        assert_eq!(asset.id, "a1");
        assert_eq!(asset.extra["format"], "mp3");
    }

    #[test]
    fn test_destination_strips_directories() {
        let out = Path::new("/out");
        let asset = OutputAsset {
            name: Some("../../etc/vocals.wav".into()),
            link: None,
        };
        assert_eq!(asset.destination(out, "j1"), PathBuf::from("/out/vocals.wav"));

        let unnamed = OutputAsset { name: None, link: None };
        assert_eq!(unnamed.destination(out, "j1"), PathBuf::from("/out/j1.wav"));
    }

    #[test]
    fn test_create_request_shape() {
        use crate::remote::metadata::{Model, OutputFormat};
        let meta = JobMetadata::new(Model::Bass, OutputFormat::Mp3);
        let body = serde_json::to_value(CreateJobRequest {
            asset_id: "a1",
            metadata: &meta,
            callback_url: None,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"assetId": "a1", "metadata": {"name": "bass", "format": "mp3"}})
        );
    }
}
