//! Spectral feature vectors
//!
//! A file is reduced to per-band statistics of its log-mel spectrogram and
//! its MFCCs, plus four statistics of frame energy:
//!
//! ```text
//! [ mel mean (128) | mel std (128) | mfcc mean (n) | mfcc std (n) | energy mean, std, max, median ]
//! ```
//!
//! The length depends only on the MFCC count, never on input duration.

use crate::analysis::spectral::{self, SpectrogramConfig, N_MELS};
use crate::analysis::traits::{FeatureExtractor, Normalizer};
use crate::audio::normalize::read_canonical;
use crate::error::{Result, StemflowError};
use crate::types::FeatureVector;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default number of MFCC coefficients
pub const DEFAULT_MFCC_COUNT: usize = 20;

/// Guard against silent-input singularities in the log-mel spectrogram
const LOG_EPSILON: f64 = 1e-9;

/// Guard for peak normalization of the waveform
const PEAK_EPSILON: f64 = 1e-8;

/// Dynamic range kept when converting the MFCC mel spectrogram to dB
const TOP_DB: f64 = 80.0;

/// Number of energy statistics appended to every vector
const ENERGY_STATS: usize = 4;

/// Feature vector length for a given MFCC count
pub fn feature_len(mfcc_count: usize) -> usize {
    2 * N_MELS + 2 * mfcc_count + ENERGY_STATS
}

/// Log-mel + MFCC + energy feature extractor
pub struct SpectralFeatureExtractor {
    normalizer: Arc<dyn Normalizer>,
    mfcc_count: usize,
}

impl SpectralFeatureExtractor {
    /// Create an extractor that normalizes input with `normalizer`
    pub fn new(normalizer: Arc<dyn Normalizer>, mfcc_count: usize) -> Result<Self> {
        if mfcc_count == 0 || mfcc_count > N_MELS {
            return Err(StemflowError::ConfigError(format!(
                "MFCC count must be between 1 and {}, got {}",
                N_MELS, mfcc_count
            )));
        }
        Ok(Self {
            normalizer,
            mfcc_count,
        })
    }

    pub fn mfcc_count(&self) -> usize {
        self.mfcc_count
    }

    /// Compute the feature vector of an already-decoded mono signal
    pub fn features_from_samples(
        &self,
        samples: &[f32],
        sample_rate: u32,
        path: &Path,
    ) -> Result<FeatureVector> {
        if samples.is_empty() {
            return Err(StemflowError::feature_error(path, "Audio contains no samples"));
        }

        let peak = samples.iter().fold(0.0f64, |m, &s| m.max((s as f64).abs()));
        let waveform: Vec<f64> = samples
            .iter()
            .map(|&s| s as f64 / (peak + PEAK_EPSILON))
            .collect();

        let too_short = || {
            StemflowError::feature_error(
                path,
                format!(
                    "Audio too short ({} samples). At least {} samples are required.",
                    waveform.len(),
                    SpectrogramConfig::mel().min_samples()
                ),
            )
        };

        // Log-mel spectrogram
        let mut log_mel =
            spectral::mel_power_spectrogram(&waveform, sample_rate, &SpectrogramConfig::mel())
                .ok_or_else(too_short)?;
        for frame in log_mel.iter_mut() {
            for value in frame.iter_mut() {
                *value = (*value + LOG_EPSILON).ln();
            }
        }

        // MFCCs from a dB-scaled mel spectrogram
        let mut mfcc_mel =
            spectral::mel_power_spectrogram(&waveform, sample_rate, &SpectrogramConfig::mfcc())
                .ok_or_else(too_short)?;
        spectral::power_to_db(&mut mfcc_mel, TOP_DB);
        let dct = spectral::dct_matrix(self.mfcc_count, N_MELS);
        let mfcc: Vec<Vec<f64>> = mfcc_mel
            .iter()
            .map(|frame| {
                dct.iter()
                    .map(|basis| basis.iter().zip(frame).map(|(b, v)| b * v).sum())
                    .collect()
            })
            .collect();

        // Frame energy: L2 norm of each log-mel column
        let energy: Vec<f64> = log_mel
            .iter()
            .map(|frame| frame.iter().map(|v| v * v).sum::<f64>().sqrt())
            .collect();

        let mut vector = Vec::with_capacity(feature_len(self.mfcc_count));
        let (mel_mean, mel_std) = band_stats(&log_mel, N_MELS);
        let (mfcc_mean, mfcc_std) = band_stats(&mfcc, self.mfcc_count);
        vector.extend(mel_mean);
        vector.extend(mel_std);
        vector.extend(mfcc_mean);
        vector.extend(mfcc_std);
        vector.push(mean(&energy));
        vector.push(std_unbiased(&energy));
        vector.push(energy.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        vector.push(median_lower(&energy));

        debug!(
            "Extracted {} features from {} ({} frames)",
            vector.len(),
            path.display(),
            log_mel.len()
        );

        Ok(FeatureVector(vector))
    }
}

impl FeatureExtractor for SpectralFeatureExtractor {
    fn extract(&self, path: &Path) -> Result<FeatureVector> {
        // `normalized` owns the temporary file; it is removed when this scope
        // ends, whichever way it ends
        let normalized = self.normalizer.normalize(path)?;
        let audio = read_canonical(normalized.path()).map_err(|e| match e {
            StemflowError::DecodeError { reason, .. } => StemflowError::feature_error(path, reason),
            other => other,
        })?;
        self.features_from_samples(&audio.channels[0], audio.sample_rate, path)
    }

    fn feature_len(&self) -> usize {
        feature_len(self.mfcc_count)
    }

    fn name(&self) -> &'static str {
        "log-mel+mfcc"
    }
}

/// Per-band mean and unbiased standard deviation across frames
fn band_stats(frames: &[Vec<f64>], bands: usize) -> (Vec<f64>, Vec<f64>) {
    let mut means = Vec::with_capacity(bands);
    let mut stds = Vec::with_capacity(bands);
    let mut column = Vec::with_capacity(frames.len());
    for band in 0..bands {
        column.clear();
        column.extend(frames.iter().map(|f| f[band]));
        means.push(mean(&column));
        stds.push(std_unbiased(&column));
    }
    (means, stds)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); 0 for fewer than two values
fn std_unbiased(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Median, taking the lower middle value for even counts
fn median_lower(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[(sorted.len() - 1) / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::normalize::NormalizedAudio;
    use crate::audio::DecodeNormalizer;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Decodes like `DecodeNormalizer` and remembers the temp file it made
    #[derive(Default)]
    struct RecordingNormalizer {
        last: Mutex<Option<PathBuf>>,
    }

    impl Normalizer for RecordingNormalizer {
        fn normalize(&self, input: &Path) -> Result<NormalizedAudio> {
            let normalized = DecodeNormalizer.normalize(input)?;
            *self.last.lock().unwrap() = Some(normalized.path().to_path_buf());
            Ok(normalized)
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn extractor(mfcc_count: usize) -> SpectralFeatureExtractor {
        SpectralFeatureExtractor::new(Arc::new(DecodeNormalizer), mfcc_count).unwrap()
    }

    fn sine(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        use std::f32::consts::PI;
        (0..(seconds * sample_rate as f32) as usize)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_feature_len() {
        assert_eq!(feature_len(20), 300);
        assert_eq!(feature_len(13), 286);
    }

    #[test]
    fn test_length_independent_of_duration() {
        let ex = extractor(20);
        let short = ex
            .features_from_samples(&sine(440.0, 0.5, 44100), 44100, Path::new("a"))
            .unwrap();
        let long = ex
            .features_from_samples(&sine(440.0, 3.0, 44100), 44100, Path::new("b"))
            .unwrap();
        assert_eq!(short.len(), 300);
        assert_eq!(long.len(), 300);
        assert!(long.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_length_follows_mfcc_count() {
        let ex = extractor(13);
        let features = ex
            .features_from_samples(&sine(220.0, 1.0, 44100), 44100, Path::new("a"))
            .unwrap();
        assert_eq!(features.len(), ex.feature_len());
        assert_eq!(features.len(), 286);
    }

    #[test]
    fn test_silence_is_finite() {
        let ex = extractor(20);
        let features = ex
            .features_from_samples(&vec![0.0; 44100], 44100, Path::new("silence"))
            .unwrap();
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_too_short_is_feature_error() {
        let ex = extractor(20);
        let err = ex
            .features_from_samples(&[0.1; 100], 44100, Path::new("tiny"))
            .unwrap_err();
        assert!(matches!(err, StemflowError::FeatureExtraction { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_temp_file_removed_when_extraction_fails() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("tiny.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&input, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let normalizer = Arc::new(RecordingNormalizer::default());
        let ex = SpectralFeatureExtractor::new(normalizer.clone(), 20).unwrap();

        let err = ex.extract(&input).unwrap_err();
        assert!(matches!(err, StemflowError::FeatureExtraction { .. }));

        let temp_path = normalizer.last.lock().unwrap().clone().expect("normalizer was used");
        assert!(!temp_path.exists(), "{} left behind", temp_path.display());
    }

    #[test]
    fn test_rejects_invalid_mfcc_count() {
        assert!(SpectralFeatureExtractor::new(Arc::new(DecodeNormalizer), 0).is_err());
        assert!(SpectralFeatureExtractor::new(Arc::new(DecodeNormalizer), 129).is_err());
    }

    #[test]
    fn test_statistics_helpers() {
        assert_eq!(median_lower(&[4.0, 1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median_lower(&[3.0, 1.0, 2.0]), 2.0);
        assert!((std_unbiased(&[1.0, 2.0, 3.0, 4.0]) - 1.2909944).abs() < 1e-6);
        assert_eq!(std_unbiased(&[5.0]), 0.0);
    }
}
