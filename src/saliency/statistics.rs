use crate::constants::{
    DISTRIBUTED_MAX_CV, FOCUSED_TOP_TWO_SHARE, HIERARCHICAL_DECAY, HIERARCHICAL_DEPTH, SPARSITY_THRESHOLD,
};
use crate::utils::{mean, std_dev};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Shape of a saliency weight distribution.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttentionPattern {
    /// The top two features hold most of the weight.
    Focused,
    /// Weights are close to uniform.
    Distributed,
    /// The top weights decay geometrically.
    Hierarchical,
    Mixed,
}

/// Summary statistics of a normalized weight vector.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct DistributionStatistics {
    /// Shannon entropy divided by `ln n`, 1 for uniform weights.
    pub entropy: f64,
    /// Gini coefficient, 0 for uniform weights.
    pub gini: f64,
    /// Herfindahl index, the sum of squared weights.
    pub concentration: f64,
    /// Share of features whose weight is below `SPARSITY_THRESHOLD / n`.
    pub sparsity: f64,
}

impl DistributionStatistics {
    /// Statistics of `weights`, which must be non-negative and sum to 1.
    pub fn from_weights(weights: &[f64]) -> Self {
        let n = weights.len();
        if n == 0 {
            return DistributionStatistics::default();
        }
        let entropy = if n > 1 {
            -weights.iter().filter(|p| **p > 0.0).map(|p| p * p.ln()).sum::<f64>() / (n as f64).ln()
        } else {
            0.0
        };

        let mut sorted = weights.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let total: f64 = sorted.iter().sum();
        let gini = if total > 0.0 {
            sorted
                .iter()
                .enumerate()
                .map(|(i, p)| (2.0 * (i + 1) as f64 - n as f64 - 1.0) * p)
                .sum::<f64>()
                / (n as f64 * total)
        } else {
            0.0
        };

        let concentration = weights.iter().map(|p| p * p).sum();
        let cutoff = SPARSITY_THRESHOLD / n as f64;
        let sparsity = weights.iter().filter(|p| **p < cutoff).count() as f64 / n as f64;
        DistributionStatistics {
            entropy,
            gini,
            concentration,
            sparsity,
        }
    }
}

/// Classify the shape of a normalized weight vector.
///
/// Checks run in order and the first match wins: focused, distributed,
/// hierarchical, otherwise mixed.
pub fn classify_pattern(weights: &[f64]) -> AttentionPattern {
    let mut ranked = weights.to_vec();
    ranked.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let total: f64 = ranked.iter().sum();
    if ranked.is_empty() || total <= 0.0 {
        return AttentionPattern::Mixed;
    }

    let top_two: f64 = ranked.iter().take(2).sum();
    if top_two / total > FOCUSED_TOP_TWO_SHARE {
        return AttentionPattern::Focused;
    }

    let m = mean(&ranked);
    if m > 0.0 && std_dev(&ranked) / m < DISTRIBUTED_MAX_CV {
        return AttentionPattern::Distributed;
    }

    let head = &ranked[..ranked.len().min(HIERARCHICAL_DEPTH)];
    if head.len() > 1 && head.windows(2).all(|w| w[1] < HIERARCHICAL_DECAY * w[0]) {
        return AttentionPattern::Hierarchical;
    }
    AttentionPattern::Mixed
}

/// Scale non-negative values to sum 1.
///
/// Returns uniform weights and `true` when nothing is left to normalize.
pub fn normalize(values: &[f64]) -> (Vec<f64>, bool) {
    let total: f64 = values.iter().map(|v| v.abs()).sum();
    if values.is_empty() || !total.is_finite() || total <= f64::MIN_POSITIVE {
        let n = values.len().max(1) as f64;
        return (vec![1.0 / n; values.len()], true);
    }
    (values.iter().map(|v| v.abs() / total).collect(), false)
}

/// Sliding-window average over features in ranked order, then renormalized.
///
/// A window of 0 or 1 leaves the weights untouched.
pub fn smooth(weights: &[f64], window: usize) -> Vec<f64> {
    if window < 2 || weights.len() < 2 {
        return weights.to_vec();
    }
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|a, b| weights[*b].partial_cmp(&weights[*a]).unwrap_or(Ordering::Equal));
    let half = window / 2;
    let mut smoothed = vec![0.0; weights.len()];
    for (rank, idx) in order.iter().enumerate() {
        let lo = rank.saturating_sub(half);
        let hi = (rank + half).min(order.len() - 1);
        let span = &order[lo..=hi];
        smoothed[*idx] = span.iter().map(|i| weights[*i]).sum::<f64>() / span.len() as f64;
    }
    normalize(&smoothed).0
}

/// Cosine similarity of two vectors, 0 when either is all zeros.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na > 0.0 && nb > 0.0 {
        dot / (na * nb)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_uniform_and_single() {
        let uniform = DistributionStatistics::from_weights(&[0.25; 4]);
        assert!((uniform.entropy - 1.0).abs() < 1e-12);
        assert!(uniform.gini.abs() < 1e-12);
        assert!((uniform.concentration - 0.25).abs() < 1e-12);
        assert_eq!(uniform.sparsity, 0.0);

        let single = DistributionStatistics::from_weights(&[1.0, 0.0, 0.0, 0.0]);
        assert!(single.entropy.abs() < 1e-12);
        assert!((single.gini - 0.75).abs() < 1e-12);
        assert!((single.concentration - 1.0).abs() < 1e-12);
        assert!((single.sparsity - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_classify_pattern() {
        assert_eq!(classify_pattern(&[0.9, 0.05, 0.03, 0.02]), AttentionPattern::Focused);
        assert_eq!(classify_pattern(&[1.0 / 6.0; 6]), AttentionPattern::Distributed);
        let geometric: Vec<f64> = (0..10).map(|i| 0.75f64.powi(i)).collect();
        let (w, _) = normalize(&geometric);
        assert_eq!(classify_pattern(&w), AttentionPattern::Hierarchical);
        let (w, _) = normalize(&[2.0, 2.0, 2.0, 2.0, 0.1, 0.1, 0.1, 0.1]);
        assert_eq!(classify_pattern(&w), AttentionPattern::Mixed);
    }

    #[test]
    fn test_normalize_and_smooth() {
        let (w, degenerate) = normalize(&[0.0, 0.0, 0.0]);
        assert!(degenerate);
        assert_eq!(w, vec![1.0 / 3.0; 3]);
        let (w, degenerate) = normalize(&[-3.0, 1.0]);
        assert!(!degenerate);
        assert_eq!(w, vec![0.75, 0.25]);

        let s = smooth(&[0.7, 0.1, 0.2], 3);
        assert!((s.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(s[0] > s[2] && s[2] > s[1]);
        assert!(s[0] < 0.7);
        assert_eq!(smooth(&[0.7, 0.3], 1), vec![0.7, 0.3]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
