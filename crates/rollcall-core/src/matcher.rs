//! Nearest-embedding search — compares a query embedding against every
//! enrollment sample in the gallery and keeps the sub-threshold candidates.

use crate::gallery::Gallery;
use crate::types::{Embedding, Identity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference decision threshold for [`DistanceMetric::Euclidean`] on
/// L2-comparable face embeddings. Empirical, model-dependent; deployments
/// tune it through configuration.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Query and gallery embeddings have different lengths. A configuration
/// bug (wrong extractor model for the enrolled gallery), never something
/// to truncate or pad around.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("embedding dimension mismatch: query has {query}, gallery has {gallery}")]
pub struct DimensionMismatch {
    pub query: usize,
    pub gallery: usize,
}

/// Distance metric used across the whole gallery.
///
/// Threshold values are metric-dependent and not interchangeable: 0.6 is a
/// sensible Euclidean cutoff for unit-normalized face embeddings, while
/// cosine distances live in [0, 2] with useful cutoffs well below 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2 norm of the difference vector. The reference metric.
    Euclidean,
    /// 1 − cosine similarity. Zero-norm inputs compare as maximally distant.
    Cosine,
}

impl DistanceMetric {
    /// Distance between two equal-length vectors. Callers guarantee the
    /// length invariant; [`Matcher::candidates`] checks it once per query.
    fn compute(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = norm_a.sqrt() * norm_b.sqrt();
                if denom > 0.0 {
                    1.0 - dot / denom
                } else {
                    1.0
                }
            }
        }
    }
}

/// One comparison result between a query embedding and one enrollment
/// sample of one identity.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub identity: Identity,
    /// Index of the enrollment sample that produced `distance`.
    pub sample_index: usize,
    pub distance: f32,
}

/// Gallery search with a fixed metric and threshold.
pub struct Matcher {
    metric: DistanceMetric,
    threshold: f32,
}

impl Matcher {
    pub fn new(metric: DistanceMetric, threshold: f32) -> Self {
        Self { metric, threshold }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Compare `query` against every enrollment sample of every identity
    /// and return the candidates with distance strictly below the
    /// threshold, in gallery enumeration order.
    ///
    /// Full scan, no early exit: a candidate's distance is the true
    /// distance to its sample and the resolution policy sees the complete
    /// picture when it reduces.
    pub fn candidates(
        &self,
        query: &Embedding,
        gallery: &Gallery,
    ) -> Result<Vec<MatchCandidate>, DimensionMismatch> {
        if let Some(dim) = gallery.dim() {
            if query.dim() != dim {
                return Err(DimensionMismatch {
                    query: query.dim(),
                    gallery: dim,
                });
            }
        }

        let mut candidates = Vec::new();
        for entry in gallery.entries() {
            for (sample_index, sample) in entry.embeddings().iter().enumerate() {
                let distance = self.metric.compute(&query.values, &sample.values);
                if distance < self.threshold {
                    candidates.push(MatchCandidate {
                        identity: entry.identity().clone(),
                        sample_index,
                        distance,
                    });
                }
            }
        }

        tracing::debug!(
            candidates = candidates.len(),
            threshold = self.threshold,
            "gallery scan complete"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery_of(entries: Vec<(i64, &str, Vec<Vec<f32>>)>) -> Gallery {
        Gallery::load(
            entries
                .into_iter()
                .map(|(id, name, vectors)| {
                    (
                        Identity {
                            id,
                            name: name.to_string(),
                        },
                        vectors.into_iter().map(Embedding::new).collect(),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_euclidean_reflexive() {
        let a = vec![0.3, -0.7, 0.1];
        assert_eq!(DistanceMetric::Euclidean.compute(&a, &a), 0.0);
    }

    #[test]
    fn test_euclidean_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, 0.5, 2.0];
        let d_ab = DistanceMetric::Euclidean.compute(&a, &b);
        let d_ba = DistanceMetric::Euclidean.compute(&b, &a);
        assert!((d_ab - d_ba).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_known_value() {
        // 3-4-5 triangle
        let d = DistanceMetric::Euclidean.compute(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_reflexive_and_symmetric() {
        let a = vec![1.0, 2.0, 0.5];
        let b = vec![0.2, -1.0, 0.8];
        assert!(DistanceMetric::Cosine.compute(&a, &a).abs() < 1e-6);
        let d_ab = DistanceMetric::Cosine.compute(&a, &b);
        let d_ba = DistanceMetric::Cosine.compute(&b, &a);
        assert!((d_ab - d_ba).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        let d_orth = DistanceMetric::Cosine.compute(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d_orth - 1.0).abs() < 1e-6);
        let d_opp = DistanceMetric::Cosine.compute(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d_opp - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_maximally_distant() {
        let d = DistanceMetric::Cosine.compute(&[0.0, 0.0], &[1.0, 0.0]);
        assert_eq!(d, 1.0);
    }

    #[test]
    fn test_identical_embedding_is_zero_distance_candidate() {
        let gallery = gallery_of(vec![
            (1, "ada", vec![vec![0.1, 0.9, 0.3]]),
            (2, "grace", vec![vec![0.8, 0.1, 0.2]]),
        ]);
        let matcher = Matcher::new(DistanceMetric::Euclidean, DEFAULT_THRESHOLD);

        let candidates = matcher
            .candidates(&Embedding::new(vec![0.1, 0.9, 0.3]), &gallery)
            .unwrap();

        let best = candidates
            .iter()
            .min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap())
            .unwrap();
        assert_eq!(best.identity.id, 1);
        assert_eq!(best.distance, 0.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Distance to the single sample is exactly 0.5: below 0.6, not below 0.5.
        let gallery = gallery_of(vec![(1, "ada", vec![vec![0.0, 0.0]])]);
        let query = Embedding::new(vec![0.3, 0.4]);

        let below = Matcher::new(DistanceMetric::Euclidean, 0.6)
            .candidates(&query, &gallery)
            .unwrap();
        assert_eq!(below.len(), 1);

        let at = Matcher::new(DistanceMetric::Euclidean, 0.5)
            .candidates(&query, &gallery)
            .unwrap();
        assert!(at.is_empty());
    }

    #[test]
    fn test_all_samples_of_all_identities_are_scanned() {
        // The second sample of the second identity is the only match.
        let gallery = gallery_of(vec![
            (1, "ada", vec![vec![5.0, 5.0], vec![-5.0, 5.0]]),
            (2, "grace", vec![vec![5.0, -5.0], vec![0.1, 0.0]]),
        ]);
        let matcher = Matcher::new(DistanceMetric::Euclidean, 0.6);

        let candidates = matcher
            .candidates(&Embedding::new(vec![0.0, 0.0]), &gallery)
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity.id, 2);
        assert_eq!(candidates[0].sample_index, 1);
    }

    #[test]
    fn test_dimension_mismatch_is_hard_error() {
        let gallery = gallery_of(vec![(1, "ada", vec![vec![0.0; 128]])]);
        let matcher = Matcher::new(DistanceMetric::Euclidean, DEFAULT_THRESHOLD);

        let err = matcher
            .candidates(&Embedding::new(vec![0.0; 64]), &gallery)
            .unwrap_err();
        assert_eq!(err, DimensionMismatch { query: 64, gallery: 128 });
    }

    #[test]
    fn test_empty_gallery_yields_no_candidates() {
        let gallery = Gallery::load(vec![]).unwrap();
        let matcher = Matcher::new(DistanceMetric::Euclidean, DEFAULT_THRESHOLD);
        let candidates = matcher
            .candidates(&Embedding::new(vec![0.0; 8]), &gallery)
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_concurrent_matching_equals_sequential() {
        use std::sync::Arc;

        let entries: Vec<(i64, &str, Vec<Vec<f32>>)> = (0..32)
            .map(|i| {
                let v = i as f32 * 0.01;
                (i, "person", vec![vec![v, 1.0 - v, 0.5]])
            })
            .collect();
        let gallery = Arc::new(gallery_of(entries));
        let matcher = Arc::new(Matcher::new(DistanceMetric::Euclidean, 0.75));
        let query = Embedding::new(vec![0.1, 0.9, 0.5]);

        let sequential: Vec<(i64, f32)> = matcher
            .candidates(&query, &gallery)
            .unwrap()
            .into_iter()
            .map(|c| (c.identity.id, c.distance))
            .collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gallery = gallery.clone();
                let matcher = matcher.clone();
                let query = query.clone();
                std::thread::spawn(move || {
                    matcher
                        .candidates(&query, &gallery)
                        .unwrap()
                        .into_iter()
                        .map(|c| (c.identity.id, c.distance))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), sequential);
        }
    }
}
