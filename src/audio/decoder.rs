//! Audio decoding using symphonia
//!
//! Decodes audio files to planar f32 samples at their native sample rate.
//! Uses rubato for high-quality resampling with proper anti-aliasing when a
//! caller needs a fixed rate.

use crate::error::{Result, StemflowError};
use crate::types::AudioBuffer;
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Maximum file size we'll attempt to decode (2GB)
/// Prevents OOM on extremely large files
const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Decode an audio file at its native sample rate, keeping every channel
pub fn decode(path: &Path) -> Result<AudioBuffer> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StemflowError::FileNotFound(path.to_path_buf()),
        _ => StemflowError::decode_error(path, format!("Failed to read file metadata: {}", e)),
    })?;

    if metadata.len() > MAX_FILE_SIZE {
        return Err(StemflowError::decode_error(
            path,
            format!(
                "File too large ({:.1} GB). Maximum supported size is 2 GB.",
                metadata.len() as f64 / (1024.0 * 1024.0 * 1024.0)
            ),
        ));
    }

    let file = std::fs::File::open(path)
        .map_err(|e| StemflowError::decode_error(path, format!("Failed to open file: {}", e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Provide a hint based on file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| StemflowError::decode_error(path, format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| StemflowError::decode_error(path, "No audio tracks found"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    debug!(
        "Decoding: {} @ {}Hz, {} channels",
        path.display(),
        sample_rate,
        channels
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| StemflowError::decode_error(path, format!("Failed to create decoder: {}", e)))?;

    // Collect all interleaved samples
    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break; // End of stream
            }
            Err(e) => {
                return Err(StemflowError::decode_error(
                    path,
                    format!("Failed to read packet: {}", e),
                ));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => {
                return Err(StemflowError::decode_error(path, format!("Decode error: {}", e)));
            }
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        all_samples.extend(sample_buf.samples());
    }

    if channels == 0 {
        return Err(StemflowError::decode_error(path, "Could not determine channel count"));
    }

    let buffer = AudioBuffer::from_interleaved(&all_samples, channels, sample_rate);

    debug!(
        "Decoded {} frames x {} channels ({:.2}s)",
        buffer.frames(),
        buffer.channel_count(),
        buffer.duration()
    );

    Ok(buffer)
}

/// Decode an audio file, fold it to mono and resample to `target_rate`
pub fn decode_mono(path: &Path, target_rate: u32) -> Result<AudioBuffer> {
    let buffer = decode(path)?;
    let mono = buffer.to_mono();
    let samples = if buffer.sample_rate != target_rate {
        resample(&mono, buffer.sample_rate, target_rate)
    } else {
        mono
    };
    Ok(AudioBuffer::mono(samples, target_rate))
}

/// High-quality audio resampling using rubato
///
/// Uses FFT-based resampling with proper anti-aliasing filter to prevent
/// aliasing artifacts when downsampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    const CHUNK_SIZE: usize = 1024;

    let mut resampler = match FftFixedInOut::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        1, // mono channel
    ) {
        Ok(r) => r,
        Err(e) => {
            debug!("Rubato initialization failed ({}), using fallback", e);
            return resample_linear_fallback(samples, from_rate, to_rate);
        }
    };

    let input_frames_per_chunk = resampler.input_frames_next();
    let output_frames_per_chunk = resampler.output_frames_next();

    let ratio = to_rate as f64 / from_rate as f64;
    let estimated_output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(estimated_output_len);

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + input_frames_per_chunk).min(samples.len());
        let mut chunk = samples[pos..end].to_vec();

        // Pad last chunk if needed
        if chunk.len() < input_frames_per_chunk {
            chunk.resize(input_frames_per_chunk, 0.0);
        }

        let input_channels = vec![chunk];

        match resampler.process(&input_channels, None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    let valid_samples = if pos + input_frames_per_chunk > samples.len() {
                        let input_valid = samples.len() - pos;
                        let output_valid = (input_valid as f64 * ratio).ceil() as usize;
                        output_valid.min(output_frames_per_chunk)
                    } else {
                        output_frames_per_chunk
                    };
                    let safe_samples = valid_samples.min(channel.len());
                    output.extend_from_slice(&channel[..safe_samples]);
                }
            }
            Err(e) => {
                debug!("Rubato processing error ({}), using fallback for remaining", e);
                let remaining = resample_linear_fallback(&samples[pos..], from_rate, to_rate);
                output.extend(remaining);
                break;
            }
        }

        pos += input_frames_per_chunk;
    }

    output
}

/// Fallback linear interpolation resampler
///
/// Used only when rubato fails to initialize or process.
fn resample_linear_fallback(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            samples[src_idx] * (1.0 - frac as f32) + samples[src_idx + 1] * frac as f32
        } else {
            samples[src_idx.min(samples.len() - 1)]
        };

        output.push(sample);
    }

    output
}
