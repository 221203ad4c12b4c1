//! Saliency
//!
//! Integrated gradients over the straight path from a baseline to the explained
//! instance. Gradients are central finite differences at equally spaced points on
//! the path, so any black-box scorer can be analyzed. The absolute attributions
//! are normalized into weights, summarized, and classified into an attention
//! pattern.
mod statistics;
mod temporal;

pub use statistics::{classify_pattern, cosine_similarity, normalize, smooth, AttentionPattern, DistributionStatistics};
pub use temporal::{detect_cycle, trend_slope, volatility, Cycle, FeatureTrend, TemporalAnalysis};

use crate::attribution::ExplanationIO;
use crate::constants::{ADDITIVITY_TOLERANCE, FAILURE_RATIO, FINITE_DIFFERENCE_STEP, SALIENCY_STEPS};
use crate::errors::ExplainError;
use crate::features::{FeatureDomain, FeatureSpace, FeatureVector};
use crate::predictor::{PredictPool, Prediction, Predictor};
use crate::random::RandomSource;
use crate::utils::{argsort_desc, fmt_vec_output, items_to_strings, mean, validate_count_parameter, validate_float_parameter};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Reference point the integration path starts from.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BaselineStrategy {
    /// Zero, clamped into each feature's domain.
    #[default]
    Zero,
    /// Column means of the reference rows, or domain midpoints without them.
    Mean,
    /// Uniform draw within each feature's domain.
    Random,
}

impl FromStr for BaselineStrategy {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Zero" | "zero" => Ok(BaselineStrategy::Zero),
            "Mean" | "mean" => Ok(BaselineStrategy::Mean),
            "Random" | "random" => Ok(BaselineStrategy::Random),
            _ => Err(ExplainError::ParseString(
                s.to_string(),
                "BaselineStrategy".to_string(),
                items_to_strings(vec!["Zero", "Mean", "Random"]),
            )),
        }
    }
}

fn default_steps() -> usize {
    SALIENCY_STEPS
}
fn default_fd_step() -> f64 {
    FINITE_DIFFERENCE_STEP
}
fn default_max_failure_ratio() -> f64 {
    FAILURE_RATIO
}

/// Configuration for the [`SaliencyAnalyzer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaliencyConfig {
    /// Interpolation points on the baseline to instance path.
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Half width of the central difference, as a fraction of the feature's range.
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,
    #[serde(default)]
    pub baseline: BaselineStrategy,
    /// Width of the ranked-order smoothing window, 0 or 1 to disable.
    #[serde(default)]
    pub smoothing_window: usize,
    /// Also attribute every sub-score dimension returned by the scorer.
    #[serde(default)]
    pub cross_dimensional: bool,
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub predict_timeout: Option<f32>,
}

impl Default for SaliencyConfig {
    fn default() -> Self {
        SaliencyConfig {
            steps: SALIENCY_STEPS,
            fd_step: FINITE_DIFFERENCE_STEP,
            baseline: BaselineStrategy::Zero,
            smoothing_window: 0,
            cross_dimensional: false,
            max_failure_ratio: FAILURE_RATIO,
            num_threads: None,
            predict_timeout: None,
        }
    }
}

impl SaliencyConfig {
    pub fn set_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn set_baseline(mut self, baseline: BaselineStrategy) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn set_smoothing_window(mut self, smoothing_window: usize) -> Self {
        self.smoothing_window = smoothing_window;
        self
    }

    pub fn set_cross_dimensional(mut self, cross_dimensional: bool) -> Self {
        self.cross_dimensional = cross_dimensional;
        self
    }

    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn validate(&self) -> Result<(), ExplainError> {
        validate_count_parameter(self.steps, 1, "steps")?;
        validate_float_parameter(self.fd_step, f64::MIN_POSITIVE, 0.5, "fd_step")?;
        validate_float_parameter(self.max_failure_ratio, 0.0, 1.0, "max_failure_ratio")?;
        Ok(())
    }
}

/// One feature in ranked order.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FocusArea {
    pub feature: String,
    pub weight: f64,
    /// Signed integrated attribution.
    pub attribution: f64,
    /// 0 for the most salient feature.
    pub rank: usize,
}

/// Saliency of one sub-score dimension.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct DimensionSaliency {
    pub dimension: String,
    pub weights: Vec<f64>,
    pub top_feature: String,
    pub degenerate: bool,
}

/// Cosine similarity between the weights of two dimensions.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct DimensionSimilarity {
    pub first: String,
    pub second: String,
    pub cosine: f64,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CrossDimensionalAnalysis {
    pub dimensions: Vec<DimensionSaliency>,
    pub similarities: Vec<DimensionSimilarity>,
}

impl CrossDimensionalAnalysis {
    pub fn dimension(&self, name: &str) -> Option<&DimensionSaliency> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }
}

/// Saliency report of one prediction.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct SaliencyReport {
    pub features: Vec<String>,
    /// Non-negative weights summing to 1, in feature order.
    pub weights: Vec<f64>,
    /// Signed integrated attributions, in feature order.
    pub attributions: Vec<f64>,
    /// Features ranked by weight.
    pub focus_areas: Vec<FocusArea>,
    pub statistics: DistributionStatistics,
    pub pattern: AttentionPattern,
    pub baseline: Vec<f64>,
    pub prediction: f64,
    pub baseline_prediction: f64,
    /// `sum(attributions) - (prediction - baseline_prediction)`.
    pub completeness_gap: f64,
    /// Every attribution was zero, the weights are uniform.
    pub degenerate: bool,
    pub samples: usize,
    pub failed_samples: usize,
    pub temporal: Option<TemporalAnalysis>,
    pub cross_dimensional: Option<CrossDimensionalAnalysis>,
}

impl SaliencyReport {
    pub fn weight(&self, feature: &str) -> Option<f64> {
        self.features.iter().position(|f| f == feature).map(|i| self.weights[i])
    }

    pub fn top_features(&self, k: usize) -> Vec<&str> {
        self.focus_areas.iter().take(k).map(|f| f.feature.as_str()).collect()
    }
}

impl ExplanationIO for SaliencyReport {}

/// Central difference stencils along the path, in batch order.
struct PathStencils {
    n_features: usize,
    steps: usize,
    /// Distance between the upper and lower point of each (step, feature).
    spans: Vec<f64>,
}

impl PathStencils {
    // Batch layout: instance, baseline, then (upper, lower) per step and feature.
    fn upper(&self, step: usize, feature: usize) -> usize {
        2 + 2 * (step * self.n_features + feature)
    }

    /// Integrated attribution per feature from the scores of the batch.
    fn integrate(&self, scores: &[Option<f64>], delta: &[f64]) -> Vec<f64> {
        (0..self.n_features)
            .map(|j| {
                let mut total = 0.0;
                let mut valid = 0usize;
                for k in 0..self.steps {
                    let span = self.spans[k * self.n_features + j];
                    let i = self.upper(k, j);
                    if let (Some(hi), Some(lo)) = (scores[i], scores[i + 1]) {
                        valid += 1;
                        if span > 0.0 {
                            total += (hi - lo) / span;
                        }
                    }
                }
                if valid == 0 {
                    0.0
                } else {
                    total / valid as f64 * delta[j]
                }
            })
            .collect()
    }
}

/// Integrated gradients saliency analyzer.
pub struct SaliencyAnalyzer {
    cfg: SaliencyConfig,
    pool: PredictPool,
    domain: FeatureDomain,
    reference: Option<Vec<Vec<f64>>>,
}

impl SaliencyAnalyzer {
    pub fn new(cfg: SaliencyConfig, domain: FeatureDomain) -> Result<Self, ExplainError> {
        cfg.validate()?;
        domain.validate()?;
        let pool = PredictPool::new(cfg.num_threads, cfg.predict_timeout)?;
        Ok(SaliencyAnalyzer {
            cfg,
            pool,
            domain,
            reference: None,
        })
    }

    /// Representative rows used by the `Mean` baseline.
    pub fn with_reference(mut self, reference: Vec<Vec<f64>>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn config(&self) -> &SaliencyConfig {
        &self.cfg
    }

    fn baseline(&self, space: &FeatureSpace, rng: &mut RandomSource) -> Result<Vec<f64>, ExplainError> {
        let n = space.len();
        match (self.cfg.baseline, &self.reference) {
            (BaselineStrategy::Zero, _) => Ok((0..n).map(|j| space.clamp(j, 0.0)).collect()),
            (BaselineStrategy::Mean, None) => Ok(space.midpoints()),
            (BaselineStrategy::Mean, Some(reference)) => {
                if reference.is_empty() || reference.iter().any(|r| r.len() != n) {
                    return Err(ExplainError::InvalidConfiguration(format!(
                        "reference rows must be non-empty with {} values each.",
                        n
                    )));
                }
                Ok((0..n)
                    .map(|j| {
                        let col: Vec<f64> = reference.iter().map(|r| r[j]).collect();
                        space.clamp(j, mean(&col))
                    })
                    .collect())
            }
            (BaselineStrategy::Random, _) => Ok((0..n)
                .map(|j| {
                    let b = space.bounds(j);
                    space.clamp(j, rng.uniform_range(b.min, b.max))
                })
                .collect()),
        }
    }

    /// Analyze the saliency of `predictor` at `instance`.
    pub fn analyze(
        &self,
        instance: &FeatureVector,
        predictor: &dyn Predictor,
        rng: &mut RandomSource,
    ) -> Result<SaliencyReport, ExplainError> {
        self.analyze_with_history(instance, predictor, rng, &[])
    }

    /// Analyze the saliency of `predictor` at `instance`, and the trend of the
    /// weights over `history` followed by the current weights.
    ///
    /// * `history` - Earlier weight vectors for the same features, oldest first.
    ///   Empty to skip the temporal analysis.
    pub fn analyze_with_history(
        &self,
        instance: &FeatureVector,
        predictor: &dyn Predictor,
        rng: &mut RandomSource,
        history: &[Vec<f64>],
    ) -> Result<SaliencyReport, ExplainError> {
        if instance.is_empty() {
            return Err(ExplainError::InvalidConfiguration(
                "can not analyze an empty feature vector.".to_string(),
            ));
        }
        let n = instance.len();
        let space = self.domain.resolve_checked(instance)?;
        let baseline = self.baseline(&space, rng)?;
        let delta: Vec<f64> = instance.values().iter().zip(baseline.iter()).map(|(x, b)| x - b).collect();

        let steps = self.cfg.steps;
        let mut batch = Vec::with_capacity(2 + 2 * steps * n);
        batch.push(instance.clone());
        batch.push(instance.with_values(baseline.clone()));
        let mut spans = Vec::with_capacity(steps * n);
        for k in 0..steps {
            // Midpoints of `steps` equal segments of the path.
            let alpha = (k as f64 + 0.5) / steps as f64;
            let point: Vec<f64> = baseline.iter().zip(delta.iter()).map(|(b, d)| b + alpha * d).collect();
            for j in 0..n {
                let bounds = space.bounds(j);
                let h = self.cfg.fd_step * bounds.range();
                let hi = (point[j] + h).clamp(bounds.min, bounds.max);
                let lo = (point[j] - h).clamp(bounds.min, bounds.max);
                let mut upper = point.clone();
                upper[j] = hi;
                let mut lower = point.clone();
                lower[j] = lo;
                batch.push(instance.with_values(upper));
                batch.push(instance.with_values(lower));
                spans.push(hi - lo);
            }
        }
        let stencils = PathStencils {
            n_features: n,
            steps,
            spans,
        };

        let (predictions, failed) = self.pool.predictions(predictor, &batch);
        if failed as f64 / batch.len() as f64 > self.cfg.max_failure_ratio {
            return Err(ExplainError::InsufficientData(format!(
                "{} of {} path points failed to score, more than the allowed ratio {}.",
                failed,
                batch.len(),
                self.cfg.max_failure_ratio
            )));
        }
        let scores: Vec<Option<f64>> = predictions.iter().map(|p| p.as_ref().map(|p| p.overall)).collect();
        let (prediction, baseline_prediction) = match (scores[0], scores[1]) {
            (Some(f), Some(b)) => (f, b),
            _ => {
                return Err(ExplainError::InsufficientData(
                    "predict failed on the explained instance or on the baseline.".to_string(),
                ))
            }
        };

        let attributions = stencils.integrate(&scores, &delta);
        let completeness_gap = attributions.iter().sum::<f64>() - (prediction - baseline_prediction);
        if completeness_gap.abs() > ADDITIVITY_TOLERANCE {
            warn!(
                "Integrated gradients miss completeness by {:.4}. Try to increase steps.",
                completeness_gap
            );
        }

        let (raw_weights, degenerate) = normalize(&attributions);
        if degenerate {
            warn!("Every integrated attribution is zero, reporting uniform weights.");
        }
        let weights = smooth(&raw_weights, self.cfg.smoothing_window);
        let features: Vec<String> = instance.names().to_vec();
        let focus_areas = argsort_desc(&weights)
            .into_iter()
            .enumerate()
            .map(|(rank, j)| FocusArea {
                feature: features[j].clone(),
                weight: weights[j],
                attribution: attributions[j],
                rank,
            })
            .collect();
        let statistics = DistributionStatistics::from_weights(&weights);
        let pattern = classify_pattern(&weights);
        debug!(
            "Saliency pattern {:?} with entropy {:.4}, weights [{}].",
            pattern,
            statistics.entropy,
            fmt_vec_output(&weights)
        );

        let temporal = if history.is_empty() {
            None
        } else {
            let mut series = history.to_vec();
            series.push(weights.clone());
            Some(TemporalAnalysis::from_history(&features, &series)?)
        };
        let cross_dimensional = if self.cfg.cross_dimensional {
            Some(cross_dimensional(&features, &predictions, &stencils, &delta))
        } else {
            None
        };

        Ok(SaliencyReport {
            features,
            weights,
            attributions,
            focus_areas,
            statistics,
            pattern,
            baseline,
            prediction,
            baseline_prediction,
            completeness_gap,
            degenerate,
            samples: batch.len(),
            failed_samples: failed,
            temporal,
            cross_dimensional,
        })
    }
}

fn cross_dimensional(
    features: &[String],
    predictions: &[Option<Prediction>],
    stencils: &PathStencils,
    delta: &[f64],
) -> CrossDimensionalAnalysis {
    let mut names: Vec<String> = predictions
        .first()
        .and_then(|p| p.as_ref())
        .map(|p| p.dimensions.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();

    let dimensions: Vec<DimensionSaliency> = names
        .into_iter()
        .map(|name| {
            let scores: Vec<Option<f64>> = predictions
                .iter()
                .map(|p| {
                    p.as_ref()
                        .and_then(|p| p.dimensions.get(&name).copied())
                        .filter(|v| v.is_finite())
                })
                .collect();
            let (weights, degenerate) = normalize(&stencils.integrate(&scores, delta));
            let top_feature = argsort_desc(&weights)
                .first()
                .map(|j| features[*j].clone())
                .unwrap_or_default();
            DimensionSaliency {
                dimension: name,
                weights,
                top_feature,
                degenerate,
            }
        })
        .collect();

    let mut similarities = Vec::new();
    for (i, a) in dimensions.iter().enumerate() {
        for b in dimensions.iter().skip(i + 1) {
            similarities.push(DimensionSimilarity {
                first: a.dimension.clone(),
                second: b.dimension.clone(),
                cosine: cosine_similarity(&a.weights, &b.weights),
            });
        }
    }
    CrossDimensionalAnalysis {
        dimensions,
        similarities,
    }
}
