//! Core data types for stemflow
//!
//! Audio buffers, feature vectors and similarity matches that flow between
//! the decoder, the mixer and the ranker. Remote job types live in
//! [`crate::remote`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Audio buffer types
// =============================================================================

/// Decoded audio at its native sample rate, one `Vec` per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Planar samples normalized to [-1.0, 1.0]: `channels[c][frame]`
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    /// Split interleaved samples `[c0, c1, c0, c1, ...]` into planar channels
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self::new(channels, sample_rate)
    }

    /// Interleave planar channels back into `[c0, c1, c0, c1, ...]`
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channel_count());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Check if buffer has no frames
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        // Guard against division by zero - use 0 duration for invalid sample rate
        if self.sample_rate > 0 {
            self.frames() as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }

    /// Fold all channels into one by averaging
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

// =============================================================================
// Analysis results
// =============================================================================

/// Fixed-length spectral descriptor of one audio file
///
/// Layout: mel-mean, mel-std, mfcc-mean, mfcc-std, energy stats
/// (mean, std, max, median). Recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// A candidate file whose similarity to the reference met the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Candidate file path
    pub path: PathBuf,
    /// Similarity rescaled to [0.0, 1.0]
    pub score: f64,
}

// =============================================================================
// Supported formats
// =============================================================================

/// Audio formats stemflow can decode locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Flac,
    Aiff,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "aiff" | "aif" => Some(AudioFormat::Aiff),
            _ => None,
        }
    }

    /// Check if a path has a supported extension
    pub fn is_supported_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .is_some()
    }
}
