//! Distance
//!
//! Range-normalized distances between feature vectors. Each coordinate difference is
//! divided by the width of the feature's domain, so features on large scales do not
//! dominate the metric.
use crate::features::FeatureSpace;
use serde::{Deserialize, Serialize};

/// Distance metric over feature vectors.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub enum DistanceMetric {
    /// Square root of the summed squared normalized differences.
    #[default]
    Euclidean,
    /// Sum of absolute normalized differences.
    Manhattan,
}

impl DistanceMetric {
    /// Distance between `a` and `b`, normalized by the domain widths in `space`.
    pub fn distance(&self, space: &FeatureSpace, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a
            .iter()
            .zip(b.iter())
            .enumerate()
            .map(|(i, (x, y))| (x - y) / space.range(i));
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.map(f64::abs).sum(),
        }
    }
}

/// Euclidean distance without normalization.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBounds;

    #[test]
    fn test_normalized_distances() {
        let space = FeatureSpace::from_bounds(vec![FeatureBounds::new(0.0, 100.0), FeatureBounds::new(0.0, 1.0)]);
        let a = [50.0, 0.0];
        let b = [80.0, 0.4];
        let e = DistanceMetric::Euclidean.distance(&space, &a, &b);
        assert!((e - 0.5).abs() < 1e-12);
        let m = DistanceMetric::Manhattan.distance(&space, &a, &b);
        assert!((m - 0.7).abs() < 1e-12);
        assert_eq!(DistanceMetric::Euclidean.distance(&space, &a, &a), 0.0);
        assert!((euclidean(&[0.0, 3.0], &[4.0, 0.0]) - 5.0).abs() < 1e-12);
    }
}
