//! Shapley
//!
//! Kernel SHAP: Shapley values approximated by a weighted linear regression over
//! feature coalitions. Absent features are replaced by a baseline instance, each
//! coalition is weighted with the Shapley kernel, and the empty and full
//! coalitions are anchored with a large weight so the attributions add up to
//! `f(instance) - f(baseline)`.
use crate::attribution::{AttributionResult, FeatureAttribution};
use crate::cache::{AttributionCache, Fingerprint};
use crate::constants::{
    ADDITIVITY_TOLERANCE, FAILURE_RATIO, FINGERPRINT_DECIMALS, RIDGE_PENALTY, SHAP_ANCHOR_WEIGHT, SHAP_SAMPLES,
};
use crate::errors::ExplainError;
use crate::features::FeatureVector;
use crate::predictor::{PredictPool, Predictor};
use crate::random::RandomSource;
use crate::regression::{shapley_kernel, WeightedRidge};
use crate::sampler::{blend, coalition_row, coalition_size, CoalitionSampler, Sampler};
use crate::utils::{validate_count_parameter, validate_float_parameter, validate_positive_float_parameter};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_n_samples() -> usize {
    SHAP_SAMPLES
}
fn default_ridge_penalty() -> f64 {
    RIDGE_PENALTY
}
fn default_anchor_weight() -> f64 {
    SHAP_ANCHOR_WEIGHT
}
fn default_max_failure_ratio() -> f64 {
    FAILURE_RATIO
}

/// Configuration for the [`ShapleyAttributor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapleyConfig {
    /// Coalitions evaluated per explanation, the two anchors included.
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    /// L2 penalty of the surrogate regression.
    #[serde(default = "default_ridge_penalty")]
    pub ridge_penalty: f64,
    /// Regression weight of the empty and full coalitions.
    #[serde(default = "default_anchor_weight")]
    pub anchor_weight: f64,
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

impl Default for ShapleyConfig {
    fn default() -> Self {
        ShapleyConfig {
            n_samples: SHAP_SAMPLES,
            ridge_penalty: RIDGE_PENALTY,
            anchor_weight: SHAP_ANCHOR_WEIGHT,
            max_failure_ratio: FAILURE_RATIO,
            num_threads: None,
            predict_timeout: None,
        }
    }
}

impl ShapleyConfig {
    pub fn set_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn set_ridge_penalty(mut self, ridge_penalty: f64) -> Self {
        self.ridge_penalty = ridge_penalty;
        self
    }

    pub fn set_max_failure_ratio(mut self, max_failure_ratio: f64) -> Self {
        self.max_failure_ratio = max_failure_ratio;
        self
    }

    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn set_predict_timeout(mut self, predict_timeout: Option<f32>) -> Self {
        self.predict_timeout = predict_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ExplainError> {
        validate_count_parameter(self.n_samples, 2, "n_samples")?;
        validate_float_parameter(self.ridge_penalty, 0.0, f64::MAX, "ridge_penalty")?;
        validate_positive_float_parameter(self.anchor_weight, "anchor_weight")?;
        validate_float_parameter(self.max_failure_ratio, 0.0, 1.0, "max_failure_ratio")?;
        if let Some(t) = self.predict_timeout {
            validate_positive_float_parameter(f64::from(t), "predict_timeout")?;
        }
        Ok(())
    }
}

/// Kernel SHAP attributor.
pub struct ShapleyAttributor {
    cfg: ShapleyConfig,
    pool: PredictPool,
    cache: Option<Arc<AttributionCache>>,
}

impl ShapleyAttributor {
    pub fn new(cfg: ShapleyConfig) -> Result<Self, ExplainError> {
        cfg.validate()?;
        let pool = PredictPool::new(cfg.num_threads, cfg.predict_timeout)?;
        Ok(ShapleyAttributor { cfg, pool, cache: None })
    }

    /// Serve repeated explanations of the same instance from `cache`.
    pub fn with_cache(mut self, cache: Arc<AttributionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ShapleyConfig {
        &self.cfg
    }

    fn fingerprint(&self, instance: &FeatureVector, baseline: &FeatureVector) -> u64 {
        Fingerprint::new(FINGERPRINT_DECIMALS)
            .with_str("shapley")
            .with_strs(instance.names())
            .with_values(instance.values())
            .with_values(baseline.values())
            .with_u64(self.cfg.n_samples as u64)
            .finish()
    }

    /// Attribute `predictor(instance) - predictor(baseline)` to the features of `instance`.
    ///
    /// * `instance` - The feature vector to explain.
    /// * `predictor` - The scoring function.
    /// * `baseline` - Reference instance standing in for absent features.
    /// * `rng` - Source for coalition sampling.
    pub fn explain(
        &self,
        instance: &FeatureVector,
        predictor: &dyn Predictor,
        baseline: &FeatureVector,
        rng: &mut RandomSource,
    ) -> Result<Arc<AttributionResult>, ExplainError> {
        if instance.is_empty() {
            return Err(ExplainError::InvalidConfiguration(
                "can not explain an empty feature vector.".to_string(),
            ));
        }
        if !instance.same_features(baseline) {
            return Err(ExplainError::InvalidConfiguration(
                "baseline must have the same features, in the same order, as the instance.".to_string(),
            ));
        }

        let key = self.fingerprint(instance, baseline);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(key)) {
            debug!("Serving Shapley attribution from cache.");
            return Ok(hit);
        }

        let n = instance.len();
        let mut sampler = CoalitionSampler::new(self.cfg.n_samples);
        let coalitions = sampler.sample(rng, n);
        let batch: Vec<FeatureVector> = coalitions
            .iter()
            .map(|c| instance.with_values(blend(c, instance.values(), baseline.values())))
            .collect();
        let (scores, failed) = self.pool.scores(predictor, &batch);

        let (baseline_value, prediction) = match (scores[0], scores[1]) {
            (Some(b), Some(f)) => (b, f),
            _ => {
                return Err(ExplainError::InsufficientData(
                    "predict failed on the baseline or on the explained instance.".to_string(),
                ))
            }
        };
        let interior = coalitions.len() - 2;
        if interior > 0 && failed as f64 / interior as f64 > self.cfg.max_failure_ratio {
            return Err(ExplainError::InsufficientData(format!(
                "{} of {} coalitions failed to score, more than the allowed ratio {}.",
                failed, interior, self.cfg.max_failure_ratio
            )));
        }

        let mut x = Vec::with_capacity(coalitions.len());
        let mut y = Vec::with_capacity(coalitions.len());
        let mut w = Vec::with_capacity(coalitions.len());
        for (i, (c, s)) in coalitions.iter().zip(scores.iter()).enumerate() {
            let Some(score) = s else { continue };
            let weight = if i < 2 {
                self.cfg.anchor_weight
            } else {
                shapley_kernel(n, coalition_size(c))
            };
            x.push(coalition_row(c));
            y.push(score - baseline_value);
            w.push(weight);
        }

        let fit = WeightedRidge::new(self.cfg.ridge_penalty, false).fit(&x, &y, &w)?;
        let contributions: Vec<FeatureAttribution> = instance
            .names()
            .iter()
            .zip(fit.coefficients.iter())
            .map(|(name, phi)| FeatureAttribution::new(name.as_str(), *phi))
            .collect();
        let total: f64 = fit.coefficients.iter().sum();
        let residual = prediction - baseline_value - total;
        let additive = residual.abs() <= ADDITIVITY_TOLERANCE;
        if !additive {
            warn!(
                "Shapley attributions miss additivity by {:.4}. Try to increase n_samples or decrease ridge_penalty.",
                residual
            );
        }

        let result = Arc::new(AttributionResult {
            contributions,
            baseline_value,
            prediction,
            residual,
            additive,
            samples: coalitions.len(),
            failed_samples: failed,
            exhaustive: sampler.exhaustive(),
        });
        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::clone(&result));
        }
        Ok(result)
    }
}
