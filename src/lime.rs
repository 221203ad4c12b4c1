//! Lime
//!
//! Local surrogate attributions. Every feature is discretized into interpretable
//! bands; perturbations keep or leave the explained instance's band per feature,
//! are weighted by an exponential kernel on their raw distance to the instance,
//! and a weighted ridge regression on the "same band as the instance" encoding
//! gives each feature's local effect.
use crate::attribution::{Direction, ExplanationIO};
use crate::binning::Discretizer;
use crate::constants::{FAILURE_RATIO, KEEP_PROBABILITY, KERNEL_WIDTH, LIME_SAMPLES, LIME_TOP_K, RIDGE_PENALTY};
use crate::distance::DistanceMetric;
use crate::errors::ExplainError;
use crate::features::{FeatureDomain, FeatureVector};
use crate::predictor::{PredictPool, Predictor};
use crate::random::RandomSource;
use crate::regression::{exponential_kernel, WeightedRidge};
use crate::sampler::{PerturbationSampler, Sampler};
use crate::utils::{validate_count_parameter, validate_float_parameter, validate_positive_float_parameter};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

fn default_n_samples() -> usize {
    LIME_SAMPLES
}
fn default_n_bins() -> usize {
    4
}
fn default_top_k() -> usize {
    LIME_TOP_K
}
fn default_ridge_penalty() -> f64 {
    RIDGE_PENALTY
}
fn default_max_failure_ratio() -> f64 {
    FAILURE_RATIO
}

/// Configuration for the [`LimeExplainer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimeConfig {
    /// Perturbations per explanation, the unperturbed instance included.
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    /// Width of the exponential kernel on normalized distances.
    /// `None` uses `0.75 * sqrt(n_features)`.
    #[serde(default)]
    pub kernel_width: Option<f64>,
    /// Bands per feature.
    #[serde(default = "default_n_bins")]
    pub n_bins: usize,
    /// Features kept in the explanation, largest effect first.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Drop attributions whose magnitude is below this value.
    #[serde(default)]
    pub prune_threshold: Option<f64>,
    /// L2 penalty of the surrogate regression.
    #[serde(default = "default_ridge_penalty")]
    pub ridge_penalty: f64,
    /// Metric for sample distances.
    #[serde(default)]
    pub distance: DistanceMetric,
    /// Largest tolerated share of failed predict calls.
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
    /// Concurrent predict calls, `None` for one per core.
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Seconds a predict call may take before it counts as failed.
    #[serde(default)]
    pub predict_timeout: Option<f32>,
}

impl Default for LimeConfig {
    fn default() -> Self {
        LimeConfig {
            n_samples: LIME_SAMPLES,
            kernel_width: None,
            n_bins: 4,
            top_k: LIME_TOP_K,
            prune_threshold: None,
            ridge_penalty: RIDGE_PENALTY,
            distance: DistanceMetric::Euclidean,
            max_failure_ratio: FAILURE_RATIO,
            num_threads: None,
            predict_timeout: None,
        }
    }
}

impl LimeConfig {
    pub fn set_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn set_kernel_width(mut self, kernel_width: Option<f64>) -> Self {
        self.kernel_width = kernel_width;
        self
    }

    pub fn set_n_bins(mut self, n_bins: usize) -> Self {
        self.n_bins = n_bins;
        self
    }

    pub fn set_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn set_prune_threshold(mut self, prune_threshold: Option<f64>) -> Self {
        self.prune_threshold = prune_threshold;
        self
    }

    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn validate(&self) -> Result<(), ExplainError> {
        validate_count_parameter(self.n_samples, 2, "n_samples")?;
        validate_count_parameter(self.n_bins, 2, "n_bins")?;
        validate_count_parameter(self.top_k, 1, "top_k")?;
        if let Some(w) = self.kernel_width {
            validate_positive_float_parameter(w, "kernel_width")?;
        }
        if let Some(t) = self.prune_threshold {
            validate_float_parameter(t, 0.0, f64::MAX, "prune_threshold")?;
        }
        validate_float_parameter(self.ridge_penalty, 0.0, f64::MAX, "ridge_penalty")?;
        validate_float_parameter(self.max_failure_ratio, 0.0, 1.0, "max_failure_ratio")?;
        if let Some(t) = self.predict_timeout {
            validate_positive_float_parameter(f64::from(t), "predict_timeout")?;
        }
        Ok(())
    }
}

/// Local effect of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimeAttribution {
    pub feature: String,
    /// Change of the local surrogate when the feature stays in its band.
    pub contribution: f64,
    pub direction: Direction,
    /// Value of the feature in the explained instance.
    pub value: f64,
    /// Band of the explained instance, e.g. `contentLength <= 250.00`.
    pub condition: String,
}

/// Local surrogate explanation of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimeExplanation {
    /// Top features ranked by absolute contribution.
    pub attributions: Vec<LimeAttribution>,
    pub intercept: f64,
    /// Weighted R² of the surrogate on its samples.
    pub r_squared: f64,
    /// Surrogate output at the explained instance.
    pub local_prediction: f64,
    /// Scorer output at the explained instance.
    pub prediction: f64,
    pub samples: usize,
    pub failed_samples: usize,
}

impl LimeExplanation {
    pub fn contribution(&self, feature: &str) -> Option<f64> {
        self.attributions
            .iter()
            .find(|a| a.feature == feature)
            .map(|a| a.contribution)
    }
}

impl ExplanationIO for LimeExplanation {}

/// LIME-style local surrogate attributor.
pub struct LimeExplainer {
    cfg: LimeConfig,
    pool: PredictPool,
    domain: FeatureDomain,
    reference: Option<Vec<Vec<f64>>>,
}

impl LimeExplainer {
    /// * `cfg` - Sampling and surrogate configuration.
    /// * `domain` - Feature bounds used for band edges and clamping.
    pub fn new(cfg: LimeConfig, domain: FeatureDomain) -> Result<Self, ExplainError> {
        cfg.validate()?;
        domain.validate()?;
        let pool = PredictPool::new(cfg.num_threads, cfg.predict_timeout)?;
        Ok(LimeExplainer {
            cfg,
            pool,
            domain,
            reference: None,
        })
    }

    /// Estimate band edges as quantiles of `reference` rows instead of equal-width
    /// bands over the domain.
    pub fn with_reference(mut self, reference: Vec<Vec<f64>>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn config(&self) -> &LimeConfig {
        &self.cfg
    }

    /// Explain `predictor` around `instance`.
    ///
    /// The same `rng` seed and inputs reproduce the same explanation bit for bit.
    pub fn explain(
        &self,
        instance: &FeatureVector,
        predictor: &dyn Predictor,
        rng: &mut RandomSource,
    ) -> Result<LimeExplanation, ExplainError> {
        if instance.is_empty() {
            return Err(ExplainError::InvalidConfiguration(
                "can not explain an empty feature vector.".to_string(),
            ));
        }
        let n = instance.len();
        let space = self.domain.resolve_checked(instance)?;
        let discretizer = match &self.reference {
            Some(r) => Discretizer::from_reference(&space, r, self.cfg.n_bins)?,
            None => Discretizer::from_space(&space, self.cfg.n_bins),
        };
        let original: Vec<f64> = (0..n).map(|j| space.clamp(j, instance.value(j))).collect();
        let original_bucket: Vec<usize> = (0..n).map(|j| discretizer.bucket_of(j, original[j])).collect();

        let masks = PerturbationSampler::new(self.cfg.n_samples, KEEP_PROBABILITY).sample(rng, n);
        let mut encodings = Vec::with_capacity(masks.len());
        let mut batch = Vec::with_capacity(masks.len());
        for mask in &masks {
            let mut values = original.clone();
            let mut encoding = vec![1.0; n];
            for j in 0..n {
                let buckets = &discretizer.buckets[j];
                if mask[j] || buckets.n_buckets() < 2 {
                    continue;
                }
                // Resample one of the other bands, then a value inside it.
                let mut b = rng.index(buckets.n_buckets() - 1);
                if b >= original_bucket[j] {
                    b += 1;
                }
                let (lo, hi) = buckets.bounds(b);
                values[j] = space.clamp(j, rng.uniform_range(lo, hi));
                if discretizer.bucket_of(j, values[j]) != original_bucket[j] {
                    encoding[j] = 0.0;
                }
            }
            encodings.push(encoding);
            batch.push(instance.with_values(values));
        }

        let width = self.cfg.kernel_width.unwrap_or(KERNEL_WIDTH * (n as f64).sqrt());
        let weights: Vec<f64> = batch
            .iter()
            .map(|fv| exponential_kernel(self.cfg.distance.distance(&space, fv.values(), &original), width))
            .collect();

        let (scores, failed) = self.pool.scores(predictor, &batch);
        if failed as f64 / batch.len() as f64 > self.cfg.max_failure_ratio {
            return Err(ExplainError::InsufficientData(format!(
                "{} of {} perturbations failed to score, more than the allowed ratio {}.",
                failed,
                batch.len(),
                self.cfg.max_failure_ratio
            )));
        }
        let prediction = match scores[0] {
            Some(s) => s,
            None => {
                return Err(ExplainError::InsufficientData(
                    "predict failed on the explained instance.".to_string(),
                ))
            }
        };

        let mut x = Vec::with_capacity(batch.len());
        let mut y = Vec::with_capacity(batch.len());
        let mut w = Vec::with_capacity(batch.len());
        for ((enc, s), wi) in encodings.into_iter().zip(scores.into_iter()).zip(weights.into_iter()) {
            if let Some(score) = s {
                x.push(enc);
                y.push(score);
                w.push(wi);
            }
        }
        let fit = WeightedRidge::new(self.cfg.ridge_penalty, true).fit(&x, &y, &w)?;
        debug!(
            "Local surrogate fitted on {} samples with R2 {:.4}.",
            x.len(),
            fit.r_squared
        );

        let mut attributions: Vec<LimeAttribution> = (0..n)
            .map(|j| LimeAttribution {
                feature: instance.name(j).to_string(),
                contribution: fit.coefficients[j],
                direction: Direction::of(fit.coefficients[j]),
                value: instance.value(j),
                condition: discretizer.buckets[j].label(instance.name(j), original_bucket[j]),
            })
            .collect();
        attributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(Ordering::Equal)
        });
        attributions.truncate(self.cfg.top_k);
        if let Some(t) = self.cfg.prune_threshold {
            attributions.retain(|a| a.contribution.abs() >= t);
        }

        let local_prediction = fit.predict(&vec![1.0; n]);
        Ok(LimeExplanation {
            attributions,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            local_prediction,
            prediction,
            samples: batch.len(),
            failed_samples: failed,
        })
    }
}
