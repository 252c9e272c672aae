//! Similarity search over a directory of audio files
//!
//! Feature vectors are z-score normalized against their own components,
//! compared by cosine similarity and rescaled from [-1, 1] to [0, 1].

use crate::analysis::traits::FeatureExtractor;
use crate::discovery;
use crate::error::Result;
use crate::types::{FeatureVector, SimilarityMatch};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Default inclusion threshold on the rescaled score
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Guard added to the standard deviation during z-score normalization
const ZSCORE_EPSILON: f64 = 1e-8;

/// Ranks candidate files by similarity to a reference file
pub struct SimilarityRanker<'a> {
    extractor: &'a dyn FeatureExtractor,
}

impl<'a> SimilarityRanker<'a> {
    pub fn new(extractor: &'a dyn FeatureExtractor) -> Self {
        Self { extractor }
    }

    /// Find files in `candidate_dir` whose similarity to `input` is at least `threshold`
    ///
    /// The input itself is skipped when it lives in `candidate_dir`. A
    /// candidate that cannot be analysed is logged and left out; failing to
    /// analyse the input, or a missing directory, is an error. An empty
    /// result means nothing met the threshold.
    ///
    /// Matches are ordered by descending score, then by path.
    pub fn find_similar(
        &self,
        input: &Path,
        candidate_dir: &Path,
        threshold: f64,
    ) -> Result<Vec<SimilarityMatch>> {
        let reference = zscore(&self.extractor.extract(input)?);
        let input_resolved = discovery::resolve(input);

        let candidates: Vec<_> = discovery::scan(candidate_dir)?
            .into_iter()
            .filter(|path| {
                let same = discovery::resolve(path) == input_resolved;
                if same {
                    debug!("Skipping input file {}", path.display());
                }
                !same
            })
            .collect();

        info!(
            "Comparing {} against {} candidates using {}",
            input.display(),
            candidates.len(),
            self.extractor.name()
        );

        let mut matches: Vec<SimilarityMatch> = candidates
            .par_iter()
            .filter_map(|path| match self.extractor.extract(path) {
                Ok(features) => {
                    let score = rescale(cosine_similarity(&reference, &zscore(&features)));
                    debug!("{}: similarity {:.4}", path.display(), score);
                    (score >= threshold).then(|| SimilarityMatch {
                        path: path.clone(),
                        score,
                    })
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping {}: {}", path.display(), e);
                    None
                }
                Err(e) => {
                    error!("Failed to process {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        sort_matches(&mut matches);

        info!(
            "{} candidates met threshold {:.2}",
            matches.len(),
            threshold
        );
        Ok(matches)
    }
}

/// Subtract the mean and divide by the (population) standard deviation
pub fn zscore(features: &FeatureVector) -> Vec<f64> {
    let values = features.as_slice();
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    values
        .iter()
        .map(|v| (v - mean) / (std + ZSCORE_EPSILON))
        .collect()
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Map a cosine similarity from [-1, 1] to [0, 1]
pub fn rescale(similarity: f64) -> f64 {
    (similarity + 1.0) / 2.0
}

/// Descending score, ties broken by ascending path
fn sort_matches(matches: &mut [SimilarityMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StemflowError;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Fixed vectors by file stem; "broken" fails to decode, "locked" fails with an io error
    struct StemExtractor;

    impl FeatureExtractor for StemExtractor {
        fn extract(&self, path: &Path) -> Result<FeatureVector> {
            match path.file_stem().and_then(|s| s.to_str()) {
                Some("broken") => Err(StemflowError::decode_error(path, "no audio track")),
                Some("locked") => Err(StemflowError::Io(std::io::Error::from(
                    std::io::ErrorKind::PermissionDenied,
                ))),
                _ => Ok(FeatureVector(vec![1.0, 2.0, 3.0, 4.0])),
            }
        }

        fn feature_len(&self) -> usize {
            4
        }

        fn name(&self) -> &'static str {
            "stem"
        }
    }

    #[test]
    fn test_failing_candidates_are_left_out() {
        let dir = TempDir::new().unwrap();
        for name in ["input.wav", "broken.wav", "locked.wav", "twin.wav"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let ranker = SimilarityRanker::new(&StemExtractor);
        let matches = ranker
            .find_similar(&dir.path().join("input.wav"), dir.path(), 0.5)
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, dir.path().join("twin.wav"));
        assert!((matches[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_zero_mean_unit_std() {
        let z = zscore(&FeatureVector(vec![1.0, 2.0, 3.0, 4.0]));
        let mean: f64 = z.iter().sum::<f64>() / 4.0;
        let var: f64 = z.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zscore_constant_vector_is_zero() {
        let z = zscore(&FeatureVector(vec![5.0; 10]));
        assert!(z.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cosine_bounds() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rescale() {
        assert_eq!(rescale(1.0), 1.0);
        assert_eq!(rescale(-1.0), 0.0);
        assert_eq!(rescale(0.0), 0.5);
    }

    #[test]
    fn test_sort_ties_by_path() {
        let mut matches = vec![
            SimilarityMatch { path: PathBuf::from("b.wav"), score: 0.8 },
            SimilarityMatch { path: PathBuf::from("c.wav"), score: 0.9 },
            SimilarityMatch { path: PathBuf::from("a.wav"), score: 0.8 },
        ];
        sort_matches(&mut matches);
        let order: Vec<_> = matches.iter().map(|m| m.path.to_str().unwrap()).collect();
        assert_eq!(order, vec!["c.wav", "a.wav", "b.wav"]);
    }
}
