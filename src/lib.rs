//! stemflow - Remote Stem Separation Jobs & Audio Similarity Toolkit
//!
//! A command-line utility and library that submits audio to a remote
//! separation service, runs several models against one upload concurrently,
//! and downloads, post-processes and mixes the results. It also ranks local
//! audio files by timbral similarity and level-matches files.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `remote`: job metadata, wire types and the HTTP job service
//! - `pipeline`: concurrent job orchestration, post-processing and summing
//! - `discovery`: candidate file scanning
//! - `audio`: decoding, normalization, WAV output and mixing
//! - `analysis`: spectral features and similarity ranking (with swappable backends)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use stemflow::config::Settings;
//! use stemflow::pipeline::{JobRunner, PostProcessMap};
//! use stemflow::remote::{HttpJobService, JobMetadata, Model, OutputFormat};
//!
//! let settings = Settings::default();
//! let service = HttpJobService::new(&settings.base_url, "token").expect("client");
//! let runner = JobRunner::new(Arc::new(service), settings);
//! let jobs = [
//!     JobMetadata::new(Model::Vocals, OutputFormat::Wav),
//!     JobMetadata::new(Model::Drums, OutputFormat::Wav),
//! ];
//! let batch = runner
//!     .run_jobs_concurrently(Path::new("song.mp3"), &jobs, &PostProcessMap::new(), true)
//!     .expect("batch failed");
//! println!("{} jobs succeeded", batch.succeeded());
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, StemflowError};
pub use types::{AudioBuffer, FeatureVector, SimilarityMatch};
