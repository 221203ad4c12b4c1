//! Binning
//!
//! Interpretable buckets for the local surrogate. Each feature is cut into a few
//! bands (quartiles by default); the surrogate reasons about "same band as the
//! explained instance" rather than raw values.
use crate::errors::ExplainError;
use crate::features::FeatureSpace;
use crate::utils::percentiles;
use serde::{Deserialize, Serialize};

/// Bands of one feature, described by ascending edges.
///
/// Band `i` covers `(edges[i], edges[i + 1]]`; the first band also includes its
/// lower edge, and values outside the edges fall into the nearest band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buckets {
    pub edges: Vec<f64>,
}

impl Buckets {
    /// Buckets from sorted cut points inside `[min, max]`.
    fn from_cuts(min: f64, max: f64, cuts: &[f64]) -> Self {
        let mut edges = Vec::with_capacity(cuts.len() + 2);
        edges.push(min);
        edges.extend(cuts.iter().copied().filter(|c| *c > min && *c < max));
        edges.push(max);
        edges.dedup();
        if edges.len() == 1 {
            // Degenerate domain, a single band holding the single value.
            edges.push(max);
        }
        Buckets { edges }
    }

    pub fn n_buckets(&self) -> usize {
        self.edges.len() - 1
    }

    /// Index of the band holding `value`.
    pub fn bucket_of(&self, value: f64) -> usize {
        let inner = &self.edges[1..self.edges.len() - 1];
        // Number of inner edges strictly below `value`.
        let mut low = 0;
        let mut high = inner.len();
        while low != high {
            let mid = (low + high) / 2;
            if inner[mid] < value {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }

    /// Lower and upper edge of band `bucket`.
    pub fn bounds(&self, bucket: usize) -> (f64, f64) {
        (self.edges[bucket], self.edges[bucket + 1])
    }

    /// Human readable description of band `bucket` for `feature`.
    pub fn label(&self, feature: &str, bucket: usize) -> String {
        let n = self.n_buckets();
        let (lo, hi) = self.bounds(bucket);
        if n == 1 {
            format!("{} = {:.2}", feature, lo)
        } else if bucket == 0 {
            format!("{} <= {:.2}", feature, hi)
        } else if bucket == n - 1 {
            format!("{} > {:.2}", feature, lo)
        } else {
            format!("{:.2} < {} <= {:.2}", lo, feature, hi)
        }
    }
}

/// Per-feature buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discretizer {
    pub buckets: Vec<Buckets>,
}

impl Discretizer {
    /// Equal-width bands over every feature's domain.
    ///
    /// * `space` - Resolved feature domain.
    /// * `n_bins` - Bands per feature.
    pub fn from_space(space: &FeatureSpace, n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        let buckets = (0..space.len())
            .map(|i| {
                let b = space.bounds(i);
                let cuts: Vec<f64> = (1..n_bins)
                    .map(|k| b.min + (b.max - b.min) * k as f64 / n_bins as f64)
                    .collect();
                Buckets::from_cuts(b.min, b.max, &cuts)
            })
            .collect();
        Discretizer { buckets }
    }

    /// Quantile bands estimated from reference rows.
    ///
    /// * `space` - Resolved feature domain, used for the outer edges.
    /// * `reference` - Rows of representative instances, one value per feature.
    /// * `n_bins` - Bands per feature.
    pub fn from_reference(space: &FeatureSpace, reference: &[Vec<f64>], n_bins: usize) -> Result<Self, ExplainError> {
        if reference.is_empty() {
            return Err(ExplainError::InsufficientData(
                "reference sample for discretization is empty.".to_string(),
            ));
        }
        if let Some(row) = reference.iter().find(|r| r.len() != space.len()) {
            return Err(ExplainError::InvalidConfiguration(format!(
                "reference row has {} values, expected {}.",
                row.len(),
                space.len()
            )));
        }
        let n_bins = n_bins.max(1);
        let pcts: Vec<f64> = (1..n_bins).map(|k| k as f64 / n_bins as f64).collect();
        let weights = vec![1.0; reference.len()];
        let buckets = (0..space.len())
            .map(|i| {
                let col: Vec<f64> = reference.iter().map(|r| space.clamp(i, r[i])).collect();
                let mut cuts = percentiles(&col, &weights, &pcts);
                cuts.dedup();
                let b = space.bounds(i);
                Buckets::from_cuts(b.min, b.max, &cuts)
            })
            .collect();
        Ok(Discretizer { buckets })
    }

    pub fn bucket_of(&self, feature: usize, value: f64) -> usize {
        self.buckets[feature].bucket_of(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureBounds;

    #[test]
    fn test_quartile_bands_from_space() {
        let space = FeatureSpace::from_bounds(vec![FeatureBounds::new(0.0, 100.0)]);
        let d = Discretizer::from_space(&space, 4);
        let b = &d.buckets[0];
        assert_eq!(b.edges, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
        assert_eq!(b.bucket_of(0.0), 0);
        assert_eq!(b.bucket_of(25.0), 0);
        assert_eq!(b.bucket_of(25.1), 1);
        assert_eq!(b.bucket_of(100.0), 3);
        assert_eq!(b.bucket_of(1e9), 3);
        assert_eq!(b.bucket_of(-5.0), 0);
        assert_eq!(b.label("x", 0), "x <= 25.00");
        assert_eq!(b.label("x", 1), "25.00 < x <= 50.00");
        assert_eq!(b.label("x", 3), "x > 75.00");
    }

    #[test]
    fn test_bands_from_reference() {
        let space = FeatureSpace::from_bounds(vec![FeatureBounds::new(0.0, 10.0), FeatureBounds::new(0.0, 1.0)]);
        let reference: Vec<Vec<f64>> = (1..=8).map(|i| vec![i as f64, 0.5]).collect();
        let d = Discretizer::from_reference(&space, &reference, 4).unwrap();
        assert_eq!(d.buckets[0].edges, vec![0.0, 2.0, 4.0, 6.0, 10.0]);
        // A constant column contributes a single cut.
        assert_eq!(d.buckets[1].edges, vec![0.0, 0.5, 1.0]);
        assert!(Discretizer::from_reference(&space, &[], 4).is_err());
        assert!(Discretizer::from_reference(&space, &[vec![1.0]], 4).is_err());
    }

    #[test]
    fn test_degenerate_domain() {
        let space = FeatureSpace::from_bounds(vec![FeatureBounds::new(3.0, 3.0)]);
        let d = Discretizer::from_space(&space, 4);
        assert_eq!(d.buckets[0].n_buckets(), 1);
        assert_eq!(d.bucket_of(0, 3.0), 0);
        assert_eq!(d.buckets[0].label("x", 0), "x = 3.00");
    }
}
