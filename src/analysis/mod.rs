//! Audio analysis modules
//!
//! This module provides traits for analysis backends and concrete implementations.
//! The trait abstraction allows swapping backends without changing ranking code.

pub mod features;
pub mod similarity;
pub mod spectral;
pub mod traits;

pub use traits::{FeatureExtractor, Normalizer};

pub use features::{SpectralFeatureExtractor, DEFAULT_MFCC_COUNT};
pub use similarity::{SimilarityRanker, DEFAULT_THRESHOLD};
