//! Analysis trait abstractions
//!
//! These traits are the seams where analysis backends are injected. A
//! feature extractor is built once by the caller and passed by reference to
//! whatever needs it, so construction failures surface as a typed `Result`
//! at startup instead of a silent fallback later.

use crate::audio::NormalizedAudio;
use crate::error::Result;
use crate::types::FeatureVector;
use std::path::Path;

/// Converts an arbitrary audio file into the canonical analysis format
pub trait Normalizer: Send + Sync {
    /// Produce a mono, 44.1kHz, 16-bit PCM WAV in a scoped temporary file
    fn normalize(&self, input: &Path) -> Result<NormalizedAudio>;

    /// Get the name of this normalizer (for logging)
    fn name(&self) -> &'static str;
}

/// Feature extraction backend
pub trait FeatureExtractor: Send + Sync {
    /// Extract a fixed-length feature vector from an audio file
    fn extract(&self, path: &Path) -> Result<FeatureVector>;

    /// Length of every vector this extractor produces
    fn feature_len(&self) -> usize;

    /// Get the name of this extractor (for logging)
    fn name(&self) -> &'static str;
}
