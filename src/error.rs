//! Unified error types for stemflow
//!
//! Error strategy:
//! - Per-item errors (decode, feature extraction): Recoverable, skip and continue
//! - Job errors (remote failure, timeout): Reported per job, never cancel siblings
//! - System errors (upload, output, config): Fatal, abort the call
//!
//! All errors include actionable suggestions where possible.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Supported audio formats for helpful error messages
pub const SUPPORTED_FORMATS: &str = "MP3, WAV, FLAC, AIFF";

/// Top-level error type for stemflow operations
#[derive(Debug, Error)]
pub enum StemflowError {
    // =========================================================================
    // Recoverable errors - skip item, continue batch
    // =========================================================================
    #[error("Failed to decode audio file '{path}': {reason}\n  Supported formats: {SUPPORTED_FORMATS}\n  Tip: If the file plays in other apps, it may be corrupted or use an unsupported codec")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Feature extraction failed for '{path}': {reason}")]
    FeatureExtraction { path: PathBuf, reason: String },

    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    // =========================================================================
    // Remote job errors
    // =========================================================================
    #[error("Remote request to {url} failed (HTTP {status}): {body}\n  Tip: Check your API token and that the service is reachable")]
    Remote { status: u16, url: String, body: String },

    #[error("Job {job_id} failed with status: {status}")]
    JobFailed { job_id: String, status: String },

    #[error("Job {job_id} did not complete within {:.0} seconds\n  Tip: Long inputs may need a larger --timeout", timeout.as_secs_f64())]
    JobTimeout { job_id: String, timeout: Duration },

    #[error("Invalid job metadata: {0}")]
    InvalidMetadata(String),

    #[error("Worker for job #{index} panicked: {message}")]
    WorkerPanicked { index: usize, message: String },

    // =========================================================================
    // Mixer precondition violations
    // =========================================================================
    #[error("Mismatched sample rates: '{path}' is {found} Hz, expected {expected} Hz\n  Tip: Resample inputs to a common rate before summing")]
    MismatchedSampleRate {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("Mismatched channel counts: '{path}' has {found} channels, expected {expected}\n  Tip: All stems must have the same channel count to sum them")]
    MismatchedChannelCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    // =========================================================================
    // Fatal errors - abort the call
    // =========================================================================
    #[error("Format conversion failed for '{path}': {reason}\n  Tip: Make sure ffmpeg is installed and on PATH, or use the built-in normalizer")]
    ConversionError { path: PathBuf, reason: String },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stemflow operations
pub type Result<T> = std::result::Result<T, StemflowError>;

impl StemflowError {
    /// Returns true if this error is recoverable (should skip item, continue batch)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StemflowError::DecodeError { .. }
                | StemflowError::FeatureExtraction { .. }
                | StemflowError::FileNotFound(_)
        )
    }

    /// Returns true if this error came from the remote job lifecycle
    pub fn is_job_error(&self) -> bool {
        matches!(
            self,
            StemflowError::Remote { .. }
                | StemflowError::JobFailed { .. }
                | StemflowError::JobTimeout { .. }
                | StemflowError::WorkerPanicked { .. }
        )
    }

    /// Create a decode error with context about the issue
    pub fn decode_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StemflowError::DecodeError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a feature extraction error
    pub fn feature_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StemflowError::FeatureExtraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport-level remote error (no HTTP status available)
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StemflowError::Remote {
            status: 0,
            url: url.into(),
            body: err.to_string(),
        }
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!("Directory does not exist: {}", path.parent().map(|p| p.display().to_string()).unwrap_or_default())
            }
            _ => err.to_string(),
        };
        StemflowError::OutputError { path, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(StemflowError::feature_error("a.wav", "boom").is_recoverable());
        assert!(StemflowError::decode_error("a.wav", "no audio track").is_recoverable());
        assert!(!StemflowError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            .is_recoverable());
        assert!(StemflowError::FileNotFound(PathBuf::from("x")).is_recoverable());
        assert!(!StemflowError::InvalidInput("x".into()).is_recoverable());
        assert!(!StemflowError::JobFailed {
            job_id: "j".into(),
            status: "failed".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_job_error_classification() {
        let timeout = StemflowError::JobTimeout {
            job_id: "j1".into(),
            timeout: Duration::from_secs(600),
        };
        assert!(timeout.is_job_error());
        assert!(timeout.to_string().contains("600 seconds"));
        assert!(!StemflowError::ConfigError("x".into()).is_job_error());
    }

    #[test]
    fn test_output_error_permission_hint() {
        let err = StemflowError::output_error(
            "/root/out.wav",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("Permission denied"));
    }
}
