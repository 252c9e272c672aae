//! Summing, gain and loudness matching
//!
//! Buffers are summed at their native sample rate. Shorter inputs are
//! zero-padded to the longest one; nothing is clipped or normalized, so the
//! result is written as 32-bit float WAV.

use crate::audio::{decoder, writer};
use crate::error::{Result, StemflowError};
use crate::types::AudioBuffer;
use std::path::Path;
use tracing::{debug, info};

/// Guard added to the source RMS when computing a volume factor
const RMS_EPSILON: f64 = 1e-10;

/// Sum decoded buffers into one
///
/// `labels` names each buffer in error messages and must be the same length
/// as `buffers`.
pub fn sum_buffers<P: AsRef<Path>>(buffers: &[AudioBuffer], labels: &[P]) -> Result<AudioBuffer> {
    let first = buffers
        .first()
        .ok_or_else(|| StemflowError::InvalidInput("At least one input must be provided to sum".to_string()))?;

    let sample_rate = first.sample_rate;
    let channel_count = first.channel_count();
    let longest = buffers.iter().map(AudioBuffer::frames).max().unwrap_or(0);

    for (buffer, label) in buffers.iter().zip(labels) {
        if buffer.sample_rate != sample_rate {
            return Err(StemflowError::MismatchedSampleRate {
                path: label.as_ref().to_path_buf(),
                expected: sample_rate,
                found: buffer.sample_rate,
            });
        }
        if buffer.channel_count() != channel_count {
            return Err(StemflowError::MismatchedChannelCount {
                path: label.as_ref().to_path_buf(),
                expected: channel_count,
                found: buffer.channel_count(),
            });
        }
    }

    let mut combined = vec![vec![0.0f32; longest]; channel_count];
    for buffer in buffers {
        for (out, channel) in combined.iter_mut().zip(&buffer.channels) {
            // Frames past this buffer's end stay as-is: zero-padding
            for (acc, &sample) in out.iter_mut().zip(channel) {
                *acc += sample;
            }
        }
    }

    Ok(AudioBuffer::new(combined, sample_rate))
}

/// Decode every file, sum them and write the mix to `output_path`
pub fn sum<P: AsRef<Path>>(file_paths: &[P], output_path: &Path) -> Result<AudioBuffer> {
    if file_paths.is_empty() {
        return Err(StemflowError::InvalidInput(
            "At least one input audio file must be provided".to_string(),
        ));
    }

    let buffers = file_paths
        .iter()
        .map(|p| decoder::decode(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mixed = sum_buffers(&buffers, file_paths)?;
    writer::write_wav(output_path, &mixed, writer::WavEncoding::Float32)?;

    info!(
        "Summed {} files into {} ({:.2}s)",
        file_paths.len(),
        output_path.display(),
        mixed.duration()
    );
    Ok(mixed)
}

/// Root-mean-square amplitude over the mono fold of a buffer
pub fn rms_of(buffer: &AudioBuffer) -> f64 {
    let mono = buffer.to_mono();
    if mono.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = mono.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / mono.len() as f64).sqrt()
}

/// RMS amplitude of an audio file
pub fn rms(path: &Path) -> Result<f64> {
    Ok(rms_of(&decoder::decode(path)?))
}

/// Multiply every sample by `factor`
pub fn apply_gain(buffer: &mut AudioBuffer, factor: f64) {
    let factor = factor as f32;
    for channel in &mut buffer.channels {
        for sample in channel.iter_mut() {
            *sample *= factor;
        }
    }
}

/// Convert decibels to a linear amplitude factor
pub fn db_to_linear(gain_db: f64) -> f64 {
    10f64.powf(gain_db / 20.0)
}

/// Write `input` scaled by `volume_factor` to `output_path`
///
/// 1.0 leaves the level unchanged, 0.5 halves it, 2.0 doubles it.
/// `output_path` may equal `input`.
pub fn adjust_volume(input: &Path, output_path: &Path, volume_factor: f64) -> Result<()> {
    let mut buffer = decoder::decode(input)?;
    apply_gain(&mut buffer, volume_factor);
    writer::write_wav(output_path, &buffer, writer::WavEncoding::Float32)?;
    debug!(
        "Applied gain x{:.4} to {} -> {}",
        volume_factor,
        input.display(),
        output_path.display()
    );
    Ok(())
}

/// Scale `source` so its RMS matches `target`, write it, return the factor
pub fn match_volume(source: &Path, target: &Path, output_path: &Path) -> Result<f64> {
    let mut source_buffer = decoder::decode(source)?;
    let source_rms = rms_of(&source_buffer);
    let target_rms = rms(target)?;

    let volume_factor = target_rms / (source_rms + RMS_EPSILON);

    apply_gain(&mut source_buffer, volume_factor);
    writer::write_wav(output_path, &source_buffer, writer::WavEncoding::Float32)?;

    info!(
        "Matched volume of {} to {} (RMS {:.4} -> {:.4}, factor {:.4})",
        source.display(),
        target.display(),
        source_rms,
        target_rms,
        volume_factor
    );
    Ok(volume_factor)
}
