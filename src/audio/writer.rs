//! WAV output using hound

use crate::error::{Result, StemflowError};
use crate::types::AudioBuffer;
use std::path::Path;
use tracing::debug;

/// Sample encoding for written WAV files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavEncoding {
    /// 16-bit signed PCM, clamped to [-1.0, 1.0]
    Pcm16,
    /// 32-bit IEEE float, written unclipped
    Float32,
}

/// Write a buffer to `path` as WAV, replacing any existing file
pub fn write_wav(path: &Path, audio: &AudioBuffer, encoding: WavEncoding) -> Result<()> {
    if audio.channel_count() == 0 || audio.channel_count() > u16::MAX as usize {
        return Err(StemflowError::InvalidInput(format!(
            "Cannot write {} channels to {}",
            audio.channel_count(),
            path.display()
        )));
    }

    let spec = hound::WavSpec {
        channels: audio.channel_count() as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: match encoding {
            WavEncoding::Pcm16 => 16,
            WavEncoding::Float32 => 32,
        },
        sample_format: match encoding {
            WavEncoding::Pcm16 => hound::SampleFormat::Int,
            WavEncoding::Float32 => hound::SampleFormat::Float,
        },
    };

    let wav_err = |e: hound::Error| StemflowError::OutputError {
        path: path.to_path_buf(),
        reason: format!("Failed to write WAV: {}", e),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;

    for sample in audio.interleaved() {
        match encoding {
            WavEncoding::Pcm16 => {
                let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(value).map_err(wav_err)?;
            }
            WavEncoding::Float32 => writer.write_sample(sample).map_err(wav_err)?,
        }
    }

    writer.finalize().map_err(wav_err)?;

    debug!(
        "Wrote {} frames x {} channels to {}",
        audio.frames(),
        audio.channel_count(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_float_wav_is_unclipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loud.wav");
        let buffer = AudioBuffer::mono(vec![1.5, -1.5, 0.25], 8000);
        write_wav(&path, &buffer, WavEncoding::Float32).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1.5, -1.5, 0.25]);
    }

    #[test]
    fn test_pcm16_wav_clamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pcm.wav");
        let buffer = AudioBuffer::new(vec![vec![2.0], vec![-2.0]], 8000);
        write_wav(&path, &buffer, WavEncoding::Pcm16).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32768]);
    }
}
