//! Short-time spectral transforms for feature extraction
//!
//! Power STFT, HTK mel filterbank, power-to-dB conversion and an orthonormal
//! DCT-II, all in f64 so repeated extractions are bit-for-bit identical.
//!
//! # Parameter Choices
//!
//! - **N_FFT = 2048**: transform size. At 44.1kHz this gives 1025 bins of
//!   ~21.5 Hz.
//! - **WIN_LENGTH = 1024**: the Hann analysis window used for the log-mel
//!   spectrogram, zero-padded and centered inside the 2048-point frame.
//! - **HOP_LENGTH = 512**: step between frames.
//! - **N_MELS = 128**: mel bands, HTK scale, no area normalization.
//! - Frames are centered: the signal is reflect-padded by `N_FFT / 2` on
//!   both sides, giving `1 + len / HOP_LENGTH` frames.

use rustfft::{num_complex::Complex, FftPlanner};

/// FFT size
pub const N_FFT: usize = 2048;

/// Analysis window for the log-mel spectrogram
pub const WIN_LENGTH: usize = 1024;

/// Hop length between frames
pub const HOP_LENGTH: usize = 512;

/// Number of mel bands
pub const N_MELS: usize = 128;

/// Number of frequency bins in the positive-frequency half of the spectrum
pub const NUM_FREQ_BINS: usize = N_FFT / 2 + 1; // 1025

/// STFT framing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrogramConfig {
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

impl SpectrogramConfig {
    /// Parameters of the log-mel spectrogram
    pub fn mel() -> Self {
        Self {
            n_fft: N_FFT,
            win_length: WIN_LENGTH,
            hop_length: HOP_LENGTH,
            n_mels: N_MELS,
        }
    }

    /// Parameters of the mel spectrogram feeding the MFCCs (window = n_fft)
    pub fn mfcc() -> Self {
        Self {
            win_length: N_FFT,
            ..Self::mel()
        }
    }

    /// Shortest signal that can be reflect-padded for centered framing
    pub fn min_samples(&self) -> usize {
        self.n_fft / 2 + 1
    }
}

/// HTK mel scale
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Inverse HTK mel scale
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}

/// Reflect-pad `samples` by `pad` on both sides, excluding the edge sample
///
/// Returns `None` when the signal is too short to reflect.
pub fn reflect_pad(samples: &[f64], pad: usize) -> Option<Vec<f64>> {
    let len = samples.len();
    if len <= pad {
        return None;
    }

    let mut padded = Vec::with_capacity(len + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| samples[i]));
    padded.extend_from_slice(samples);
    padded.extend((0..pad).map(|j| samples[len - 2 - j]));
    Some(padded)
}

/// One triangular mel filter, stored over its non-zero span only
#[derive(Debug, Clone)]
struct MelFilter {
    start: usize,
    weights: Vec<f64>,
}

/// Triangular HTK mel filterbank over the positive-frequency bins
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
}

impl MelFilterbank {
    /// Build `n_mels` filters spanning 0 Hz to Nyquist
    pub fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let n_freqs = n_fft / 2 + 1;
        let nyquist = sample_rate as f64 / 2.0;

        let all_freqs: Vec<f64> = (0..n_freqs)
            .map(|i| nyquist * i as f64 / (n_freqs - 1) as f64)
            .collect();

        let mel_max = hz_to_mel(nyquist);
        let f_pts: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let lower = f_pts[m];
                let center = f_pts[m + 1];
                let upper = f_pts[m + 2];

                let weights: Vec<f64> = all_freqs
                    .iter()
                    .map(|&f| {
                        let down = (f - lower) / (center - lower);
                        let up = (upper - f) / (upper - center);
                        down.min(up).max(0.0)
                    })
                    .collect();

                let start = weights.iter().position(|&w| w > 0.0).unwrap_or(0);
                let end = weights
                    .iter()
                    .rposition(|&w| w > 0.0)
                    .map(|i| i + 1)
                    .unwrap_or(start);

                MelFilter {
                    start,
                    weights: weights[start..end].to_vec(),
                }
            })
            .collect();

        Self { filters }
    }

    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Project a power spectrum frame onto the mel bands
    pub fn apply(&self, power: &[f64]) -> Vec<f64> {
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .weights
                    .iter()
                    .zip(&power[filter.start..])
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }
}

/// Mel power spectrogram as `[frame][mel]`
///
/// Returns `None` when the signal is shorter than
/// [`SpectrogramConfig::min_samples`].
pub fn mel_power_spectrogram(
    samples: &[f64],
    sample_rate: u32,
    config: &SpectrogramConfig,
) -> Option<Vec<Vec<f64>>> {
    let padded = reflect_pad(samples, config.n_fft / 2)?;
    let filterbank = MelFilterbank::new(sample_rate, config.n_fft, config.n_mels);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(config.n_fft);

    // Window of win_length centered inside the n_fft frame
    let window = hann_window(config.win_length);
    let offset = (config.n_fft - config.win_length) / 2;

    let num_frames = 1 + (padded.len() - config.n_fft) / config.hop_length;
    let num_bins = config.n_fft / 2 + 1;
    let mut spectrogram = Vec::with_capacity(num_frames);
    let mut buffer = vec![Complex::new(0.0, 0.0); config.n_fft];

    for frame_idx in 0..num_frames {
        let start = frame_idx * config.hop_length;

        buffer.fill(Complex::new(0.0, 0.0));
        for (i, &w) in window.iter().enumerate() {
            buffer[offset + i] = Complex::new(padded[start + offset + i] * w, 0.0);
        }

        fft.process(&mut buffer);

        let power: Vec<f64> = buffer[..num_bins].iter().map(|c| c.norm_sqr()).collect();
        spectrogram.push(filterbank.apply(&power));
    }

    Some(spectrogram)
}

/// Convert a power spectrogram to decibels in place, flooring at `max - top_db`
pub fn power_to_db(spectrogram: &mut [Vec<f64>], top_db: f64) {
    const AMIN: f64 = 1e-10;

    let mut max_db = f64::NEG_INFINITY;
    for frame in spectrogram.iter_mut() {
        for value in frame.iter_mut() {
            *value = 10.0 * value.max(AMIN).log10();
            max_db = max_db.max(*value);
        }
    }

    let floor = max_db - top_db;
    for frame in spectrogram.iter_mut() {
        for value in frame.iter_mut() {
            *value = value.max(floor);
        }
    }
}

/// Orthonormal DCT-II basis as `[coefficient][mel]`
pub fn dct_matrix(n_coefficients: usize, n_mels: usize) -> Vec<Vec<f64>> {
    use std::f64::consts::PI;
    let n = n_mels as f64;
    (0..n_coefficients)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_mels)
                .map(|m| scale * (PI / n * (m as f64 + 0.5) * k as f64).cos())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(N_FFT, 2048);
        assert_eq!(HOP_LENGTH, 512);
        assert_eq!(NUM_FREQ_BINS, 1025);
        assert_eq!(SpectrogramConfig::mfcc().win_length, N_FFT);
        assert_eq!(SpectrogramConfig::mel().win_length, WIN_LENGTH);
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0, 440.0, 1000.0, 22050.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
        // HTK anchor: 1000 Hz is ~1000 mel
        assert!((hz_to_mel(1000.0) - 1000.0).abs() < 0.1);
    }

    #[test]
    fn test_hann_window_periodic() {
        let window = hann_window(4);
        assert_eq!(window.len(), 4);
        assert!(window[0].abs() < 1e-12);
        assert!((window[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reflect_pad() {
        let padded = reflect_pad(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0]);
        assert!(reflect_pad(&[1.0, 2.0], 2).is_none());
    }

    #[test]
    fn test_filterbank_shape_and_peaks() {
        let fb = MelFilterbank::new(44100, N_FFT, N_MELS);
        assert_eq!(fb.n_mels(), N_MELS);
        for filter in &fb.filters {
            assert!(!filter.weights.is_empty());
            assert!(filter.weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
        }
    }

    #[test]
    fn test_frame_count_centered() {
        let samples = vec![0.1; 44100];
        let spec = mel_power_spectrogram(&samples, 44100, &SpectrogramConfig::mel()).unwrap();
        assert_eq!(spec.len(), 1 + 44100 / HOP_LENGTH);
        assert_eq!(spec[0].len(), N_MELS);
    }

    #[test]
    fn test_too_short_signal() {
        let samples = vec![0.1; N_FFT / 2];
        assert!(mel_power_spectrogram(&samples, 44100, &SpectrogramConfig::mel()).is_none());
    }

    #[test]
    fn test_power_to_db_top_db_floor() {
        let mut spec = vec![vec![1.0, 1e-20]];
        power_to_db(&mut spec, 80.0);
        assert!((spec[0][0] - 0.0).abs() < 1e-9);
        assert!((spec[0][1] + 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_dct_is_orthonormal() {
        let dct = dct_matrix(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f64 = dct[a].iter().zip(&dct[b]).map(|(x, y)| x * y).sum();
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9, "rows {} {} dot {}", a, b, dot);
            }
        }
    }
}
