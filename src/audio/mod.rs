//! Audio I/O and buffer-level processing
//!
//! - `decoder`: symphonia decoding and rubato resampling
//! - `writer`: hound WAV output
//! - `normalize`: canonical mono/44.1kHz/16-bit conversion into scoped temp files
//! - `mixer`: summing, gain and RMS volume matching

pub mod decoder;
pub mod mixer;
pub mod normalize;
pub mod writer;

pub use decoder::{decode, decode_mono, resample};
pub use normalize::{DecodeNormalizer, FfmpegNormalizer, NormalizedAudio, CANONICAL_SAMPLE_RATE};
