//! Sampler
//!
//! Coalition and perturbation masks over a feature vector. A coalition marks each
//! feature as present (keep the explained value) or absent (fall back to a
//! reference value); its length always equals the number of features.
use crate::random::RandomSource;

/// Presence indicator per feature.
pub type Coalition = Vec<bool>;

/// Number of present features.
pub fn coalition_size(coalition: &[bool]) -> usize {
    coalition.iter().filter(|p| **p).count()
}

/// Encode a coalition as a 0/1 regression row.
pub fn coalition_row(coalition: &[bool]) -> Vec<f64> {
    coalition.iter().map(|p| if *p { 1.0 } else { 0.0 }).collect()
}

/// Build the hybrid values of a coalition: present features from `present`,
/// absent ones from `absent`.
pub fn blend(coalition: &[bool], present: &[f64], absent: &[f64]) -> Vec<f64> {
    coalition
        .iter()
        .zip(present.iter().zip(absent.iter()))
        .map(|(p, (x, b))| if *p { *x } else { *b })
        .collect()
}

// A sampler draws the masks an explanation is built from.
pub trait Sampler {
    /// Draw masks over `n_features` features.
    fn sample(&mut self, rng: &mut RandomSource, n_features: usize) -> Vec<Coalition>;
}

/// Coalitions for Kernel SHAP.
///
/// The empty and the full coalition always come first. When every interior
/// coalition fits in the budget they are all enumerated, otherwise interior
/// coalitions are drawn uniformly at random.
pub struct CoalitionSampler {
    n_samples: usize,
    exhaustive: bool,
}

impl CoalitionSampler {
    /// * `n_samples` - Total coalitions to return, anchors included.
    pub fn new(n_samples: usize) -> Self {
        CoalitionSampler {
            n_samples,
            exhaustive: false,
        }
    }

    /// Whether the last call enumerated every coalition.
    pub fn exhaustive(&self) -> bool {
        self.exhaustive
    }

    fn interior_count(n_features: usize) -> Option<usize> {
        if n_features >= usize::BITS as usize - 1 {
            return None;
        }
        Some((1usize << n_features).saturating_sub(2))
    }
}

impl Sampler for CoalitionSampler {
    fn sample(&mut self, rng: &mut RandomSource, n_features: usize) -> Vec<Coalition> {
        let mut coalitions = vec![vec![false; n_features], vec![true; n_features]];
        let budget = self.n_samples.saturating_sub(2);
        match CoalitionSampler::interior_count(n_features) {
            Some(total) if total <= budget => {
                self.exhaustive = true;
                for mask in 1..(1usize << n_features) - 1 {
                    coalitions.push((0..n_features).map(|j| mask & (1 << j) != 0).collect());
                }
            }
            _ => {
                self.exhaustive = false;
                while coalitions.len() < budget + 2 {
                    let c: Coalition = (0..n_features).map(|_| rng.bernoulli(0.5)).collect();
                    let size = coalition_size(&c);
                    if size > 0 && size < n_features {
                        coalitions.push(c);
                    }
                }
            }
        }
        coalitions
    }
}

/// Keep/resample masks for local surrogate perturbations.
///
/// The first mask keeps every feature, so the explained instance itself is
/// always part of the sample.
pub struct PerturbationSampler {
    n_samples: usize,
    keep_probability: f64,
}

impl PerturbationSampler {
    pub fn new(n_samples: usize, keep_probability: f64) -> Self {
        PerturbationSampler {
            n_samples,
            keep_probability,
        }
    }
}

impl Sampler for PerturbationSampler {
    fn sample(&mut self, rng: &mut RandomSource, n_features: usize) -> Vec<Coalition> {
        let mut masks = Vec::with_capacity(self.n_samples);
        if self.n_samples > 0 {
            masks.push(vec![true; n_features]);
        }
        while masks.len() < self.n_samples {
            masks.push((0..n_features).map(|_| rng.bernoulli(self.keep_probability)).collect());
        }
        masks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalition_sampler_enumerates_small() {
        let mut rng = RandomSource::seeded(42);
        let mut sampler = CoalitionSampler::new(100);
        let cs = sampler.sample(&mut rng, 4);
        assert!(sampler.exhaustive());
        assert_eq!(cs.len(), 16);
        assert_eq!(coalition_size(&cs[0]), 0);
        assert_eq!(coalition_size(&cs[1]), 4);
        assert!(cs.iter().all(|c| c.len() == 4));
        let mut interior: Vec<&Coalition> = cs[2..].iter().collect();
        interior.dedup();
        assert_eq!(interior.len(), 14);
    }

    #[test]
    fn test_coalition_sampler_samples_large() {
        let mut rng = RandomSource::seeded(42);
        let mut sampler = CoalitionSampler::new(50);
        let cs = sampler.sample(&mut rng, 12);
        assert!(!sampler.exhaustive());
        assert_eq!(cs.len(), 50);
        for c in &cs[2..] {
            let s = coalition_size(c);
            assert!(s > 0 && s < 12);
            assert_eq!(c.len(), 12);
        }
    }

    #[test]
    fn test_perturbation_sampler() {
        let mut rng = RandomSource::seeded(3);
        let mut sampler = PerturbationSampler::new(200, 0.5);
        let masks = sampler.sample(&mut rng, 5);
        assert_eq!(masks.len(), 200);
        assert!(masks[0].iter().all(|k| *k));
        let kept: usize = masks[1..].iter().map(|m| coalition_size(m)).sum();
        let share = kept as f64 / (199.0 * 5.0);
        assert!(share > 0.4 && share < 0.6);
    }

    #[test]
    fn test_blend_and_row() {
        let c = vec![true, false, true];
        assert_eq!(blend(&c, &[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0]), vec![1.0, 0.0, 3.0]);
        assert_eq!(coalition_row(&c), vec![1.0, 0.0, 1.0]);
    }
}
