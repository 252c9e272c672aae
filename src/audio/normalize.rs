//! Canonical format normalization
//!
//! Every analysed file is first rewritten as mono, 44.1kHz, 16-bit PCM WAV
//! in a temporary file. The temporary file lives exactly as long as the
//! returned [`NormalizedAudio`] and is removed when it drops, on success and
//! error paths alike.

use crate::analysis::traits::Normalizer;
use crate::audio::{decoder, writer};
use crate::error::{Result, StemflowError};
use crate::types::AudioBuffer;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

/// Sample rate of the canonical analysis format
pub const CANONICAL_SAMPLE_RATE: u32 = 44100;

/// A canonical WAV file backed by a scoped temporary file
#[derive(Debug)]
pub struct NormalizedAudio {
    file: NamedTempFile,
}

impl NormalizedAudio {
    /// Path of the temporary WAV file
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

fn temp_wav(input: &Path) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("stemflow-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| StemflowError::ConversionError {
            path: input.to_path_buf(),
            reason: format!("Failed to create temporary file: {}", e),
        })
}

/// In-process normalizer: symphonia decode, rubato resample, hound encode
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeNormalizer;

impl Normalizer for DecodeNormalizer {
    fn normalize(&self, input: &Path) -> Result<NormalizedAudio> {
        let mono = decoder::decode_mono(input, CANONICAL_SAMPLE_RATE)?;
        let file = temp_wav(input)?;
        writer::write_wav(file.path(), &mono, writer::WavEncoding::Pcm16)?;
        debug!("Normalized {} -> {}", input.display(), file.path().display());
        Ok(NormalizedAudio { file })
    }

    fn name(&self) -> &'static str {
        "symphonia"
    }
}

/// External normalizer that shells out to `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegNormalizer {
    binary: PathBuf,
}

impl FfmpegNormalizer {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer for FfmpegNormalizer {
    fn normalize(&self, input: &Path) -> Result<NormalizedAudio> {
        if !input.exists() {
            return Err(StemflowError::FileNotFound(input.to_path_buf()));
        }

        let file = temp_wav(input)?;
        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-acodec", "pcm_s16le"])
            .args(["-ar", &CANONICAL_SAMPLE_RATE.to_string()])
            .args(["-ac", "1"])
            .arg(file.path())
            .output()
            .map_err(|e| StemflowError::ConversionError {
                path: input.to_path_buf(),
                reason: format!("Failed to run {}: {}", self.binary.display(), e),
            })?;

        if !output.status.success() {
            // `file` drops here and takes the partial output with it
            return Err(StemflowError::ConversionError {
                path: input.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(NormalizedAudio { file })
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Read a canonical 16-bit PCM WAV into a mono buffer scaled to [-1.0, 1.0)
pub fn read_canonical(path: &Path) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| StemflowError::decode_error(path, format!("Failed to open WAV: {}", e)))?;
    let spec = reader.spec();

    if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(StemflowError::decode_error(
            path,
            format!(
                "Expected mono 16-bit PCM, got {} channels / {} bits",
                spec.channels, spec.bits_per_sample
            ),
        ));
    }

    let samples = reader
        .samples::<i16>()
        .map(|s| s.map(|v| v as f32 / 32768.0))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| StemflowError::decode_error(path, format!("Failed to read samples: {}", e)))?;

    Ok(AudioBuffer::mono(samples, spec.sample_rate))
}
