//! Embedding similarity and the match decision rule.

use crate::types::Embedding;
use serde::Serialize;

/// Default similarity threshold for a positive match.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Linear boost applied to similarity to derive confidence.
///
/// A heuristic carried over unchanged, not a calibrated probability.
const CONFIDENCE_BOOST: f32 = 1.2;

/// Outcome of comparing a similarity score against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub is_match: bool,
    pub confidence: f32,
}

/// Cosine similarity of two embeddings, clamped to [0, 1].
///
/// Both vectors are L2-normalized before the dot product. Zero-norm inputs,
/// and inputs of different dimensionality, score 0.0.
pub fn similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.dim() != b.dim() {
        tracing::warn!(left = a.dim(), right = b.dim(), "embedding dimensions differ");
        return 0.0;
    }

    let (norm_a, norm_b) = (a.norm(), b.norm());
    if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
        return 0.0;
    }

    let dot: f64 = a
        .values
        .iter()
        .zip(&b.values)
        .map(|(&x, &y)| (f64::from(x) / norm_a) * (f64::from(y) / norm_b))
        .sum();

    if dot.is_nan() {
        0.0
    } else {
        dot.clamp(0.0, 1.0) as f32
    }
}

/// Apply the threshold and derive a confidence value.
pub fn decide(similarity: f32, threshold: f32) -> Decision {
    Decision {
        is_match: similarity >= threshold,
        confidence: (similarity * CONFIDENCE_BOOST).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_similarity_identical() {
        let a = emb(&[0.3, -1.2, 4.0, 0.01]);
        assert!((similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_identical_at_float_extremes() {
        let huge = emb(&[2e19, -3e38, 1e30, 5e37]);
        assert!((similarity(&huge, &huge) - 1.0).abs() < 1e-6);

        let tiny = emb(&[1e-30, -2e-38, 3e-25, 1e-45]);
        assert!((similarity(&tiny, &tiny) - 1.0).abs() < 1e-6);

        let max = emb(&[f32::MAX; 512]);
        assert!((similarity(&max, &max) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_scale_invariant() {
        let a = emb(&[1.0, 2.0, 3.0]);
        let b = emb(&[10.0, 20.0, 30.0]);
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal() {
        assert!(similarity(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_opposite_clamped_to_zero() {
        assert_eq!(similarity(&emb(&[1.0, 0.0]), &emb(&[-1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_similarity_zero_vector() {
        assert_eq!(similarity(&emb(&[0.0, 0.0]), &emb(&[1.0, 0.0])), 0.0);
        assert_eq!(similarity(&emb(&[1.0, 0.0]), &emb(&[0.0, 0.0])), 0.0);
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        assert_eq!(similarity(&emb(&[1.0, 0.0]), &emb(&[1.0, 0.0, 0.0])), 0.0);
    }

    #[test]
    fn test_similarity_always_in_unit_range() {
        let vectors = [
            emb(&[1.0, 2.0, 3.0]),
            emb(&[-3.0, 0.5, 2.0]),
            emb(&[0.0, -1.0, 0.0]),
            emb(&[1e-20, 1e-20, 1e-20]),
            emb(&[1e18, -1e18, 3e18]),
        ];
        for a in &vectors {
            for b in &vectors {
                let s = similarity(a, b);
                assert!((0.0..=1.0).contains(&s), "similarity {s} out of range");
            }
        }
    }

    #[test]
    fn test_decide_threshold_is_inclusive() {
        assert!(decide(0.6, 0.6).is_match);
        assert!(!decide(0.59, 0.6).is_match);
        assert!(decide(0.0, 0.0).is_match);
        assert!(!decide(0.99, 1.0).is_match);
    }

    #[test]
    fn test_decide_confidence_boost() {
        assert!((decide(0.5, 0.6).confidence - 0.6).abs() < 1e-6);
        assert_eq!(decide(0.0, 0.6).confidence, 0.0);
        assert_eq!(decide(0.9, 0.6).confidence, 1.0);
        assert_eq!(decide(1.0, 0.6).confidence, 1.0);
    }

    #[test]
    fn test_confidence_never_below_similarity() {
        for i in 0..=100 {
            let s = i as f32 / 100.0;
            let d = decide(s, DEFAULT_THRESHOLD);
            assert!(d.confidence >= s || d.confidence == 1.0);
            assert!(d.confidence <= 1.0);
            assert_eq!(d.is_match, s >= DEFAULT_THRESHOLD);
        }
    }
}
