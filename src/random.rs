//! Random
//!
//! The seeded random source every engine draws from. It is always passed in
//! explicitly, so a seed fully determines an explanation.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded pseudo-random source.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        RandomSource {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw from `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform draw from `[low, high)`, or `low` when the interval is empty.
    pub fn uniform_range(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.rng.gen_range(low..high)
        } else {
            low
        }
    }

    /// Uniform index in `0..n`. `n` must be positive.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// True with probability `p`.
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Draw an index with probability proportional to `weights`.
    ///
    /// Falls back to a uniform draw when every weight is zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().filter(|w| w.is_finite() && **w > 0.0).sum();
        if total <= 0.0 {
            return self.index(weights.len());
        }
        let mut target = self.uniform() * total;
        for (i, w) in weights.iter().enumerate() {
            if w.is_finite() && *w > 0.0 {
                if target < *w {
                    return i;
                }
                target -= w;
            }
        }
        // Rounding left us past the end, take the last positive weight.
        weights
            .iter()
            .rposition(|w| w.is_finite() && *w > 0.0)
            .unwrap_or(weights.len() - 1)
    }

    /// Draw `k` distinct items from `items`, each draw proportional to its weight.
    pub fn weighted_subset(&mut self, items: &[usize], weights: &[f64], k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = items.to_vec();
        let mut pool_w: Vec<f64> = weights.to_vec();
        let mut chosen = Vec::with_capacity(k.min(pool.len()));
        while chosen.len() < k && !pool.is_empty() {
            let i = self.weighted_index(&pool_w);
            chosen.push(pool.swap_remove(i));
            pool_w.swap_remove(i);
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_reproducible() {
        let mut a = RandomSource::seeded(42);
        let mut b = RandomSource::seeded(42);
        let xs: Vec<f64> = (0..10).map(|_| a.uniform()).collect();
        let ys: Vec<f64> = (0..10).map(|_| b.uniform()).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|x| (0.0..1.0).contains(x)));
    }

    #[test]
    fn test_weighted_index() {
        let mut rng = RandomSource::seeded(7);
        for _ in 0..100 {
            assert_eq!(rng.weighted_index(&[0.0, 3.0, 0.0]), 1);
        }
        let i = rng.weighted_index(&[0.0, 0.0]);
        assert!(i < 2);
    }

    #[test]
    fn test_weighted_subset_distinct() {
        let mut rng = RandomSource::seeded(1);
        let items = vec![4, 5, 6, 7];
        let chosen = rng.weighted_subset(&items, &[1.0, 1.0, 0.0, 2.0], 3);
        assert_eq!(chosen.len(), 3);
        let mut sorted = chosen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
        assert_eq!(rng.weighted_subset(&items, &[1.0; 4], 10).len(), 4);
    }
}
