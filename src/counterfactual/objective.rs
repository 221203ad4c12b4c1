use super::CounterfactualConfig;
use crate::constants::{
    CHANGE_EPS, DECISION_THRESHOLD, DISTANCE_PENALTY, IMMUTABLE_CHANGE_PENALTY, IMPORTANCE_BONUS, IMPORTANCE_FLOOR,
    LARGE_CHANGE_PENALTY, LARGE_CHANGE_RATIO, TARGET_BONUS,
};
use crate::features::{FeatureSpace, FeatureVector};
use crate::predictor::{PredictPool, Predictor};
use crate::utils::argsort_desc;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::time::Instant;

/// Which way the score has to move.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TargetDirection {
    Increase,
    Decrease,
}

/// Score a counterfactual has to reach.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Target {
    pub score: f64,
    pub tolerance: f64,
    pub direction: TargetDirection,
}

impl Target {
    /// Target `score`, approached from `original_score`.
    pub fn new(score: f64, tolerance: f64, original_score: f64) -> Self {
        let direction = if score >= original_score {
            TargetDirection::Increase
        } else {
            TargetDirection::Decrease
        };
        Target {
            score,
            tolerance,
            direction,
        }
    }

    /// Flip the decision: just past the threshold, on the other side of it.
    pub fn flip(original_score: f64, tolerance: f64) -> Self {
        if original_score < DECISION_THRESHOLD {
            Target {
                score: DECISION_THRESHOLD + tolerance,
                tolerance,
                direction: TargetDirection::Increase,
            }
        } else {
            Target {
                score: DECISION_THRESHOLD - tolerance,
                tolerance,
                direction: TargetDirection::Decrease,
            }
        }
    }

    pub fn is_met(&self, score: f64) -> bool {
        match self.direction {
            TargetDirection::Increase => score >= self.score - self.tolerance,
            TargetDirection::Decrease => score <= self.score + self.tolerance,
        }
    }

    /// How far `score` still is from meeting the target, 0 once it does.
    pub fn shortfall(&self, score: f64) -> f64 {
        match self.direction {
            TargetDirection::Increase => (self.score - self.tolerance - score).max(0.0),
            TargetDirection::Decrease => (score - self.score - self.tolerance).max(0.0),
        }
    }
}

/// One evaluated point of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Feature values, clamped into the domain.
    pub values: Vec<f64>,
    /// `None` when predict failed.
    pub score: Option<f64>,
    pub distance: f64,
    /// Indices of the features that differ from the original.
    pub changed: Vec<usize>,
    pub fitness: f64,
    pub meets_target: bool,
}

impl Candidate {
    pub fn change_count(&self) -> usize {
        self.changed.len()
    }
}

/// Product of the per-change penalties: large relative changes and changes to
/// immutable features make a scenario less actionable.
pub fn feasibility(space: &FeatureSpace, original: &[f64], values: &[f64]) -> f64 {
    original
        .iter()
        .zip(values.iter())
        .enumerate()
        .filter(|(j, (o, v))| is_change(space, *j, **o, **v))
        .fold(1.0, |acc, (j, (o, v))| {
            let mut f = acc;
            if relative_change(space, j, *o, *v) > LARGE_CHANGE_RATIO {
                f *= LARGE_CHANGE_PENALTY;
            }
            if !space.is_mutable(j) {
                f *= IMMUTABLE_CHANGE_PENALTY;
            }
            f
        })
}

/// Size of a change relative to the old value, or to the domain width when the
/// old value is zero.
pub fn relative_change(space: &FeatureSpace, idx: usize, old: f64, new: f64) -> f64 {
    let scale = if old.abs() > CHANGE_EPS { old.abs() } else { space.range(idx) };
    (new - old).abs() / scale
}

fn is_change(space: &FeatureSpace, idx: usize, old: f64, new: f64) -> bool {
    (new - old).abs() / space.range(idx) > CHANGE_EPS
}

/// Everything a strategy needs to propose and score candidates.
///
/// Lives on the calling thread; only predict calls fan out to the pool.
pub struct SearchContext<'a> {
    cfg: &'a CounterfactualConfig,
    instance: &'a FeatureVector,
    predictor: &'a dyn Predictor,
    pool: &'a PredictPool,
    space: FeatureSpace,
    target: Target,
    original_score: f64,
    importance: Vec<f64>,
    mutable: Vec<usize>,
    start: Instant,
    evaluations: Cell<usize>,
    failed: Cell<usize>,
    iterations: Cell<usize>,
}

impl<'a> SearchContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        cfg: &'a CounterfactualConfig,
        instance: &'a FeatureVector,
        predictor: &'a dyn Predictor,
        pool: &'a PredictPool,
        space: FeatureSpace,
        target: Target,
        original_score: f64,
        hints: Option<&HashMap<String, f64>>,
    ) -> Self {
        let mutable = space.mutable_indices();
        let importance = importance_weights(instance, &space, hints);
        SearchContext {
            cfg,
            instance,
            predictor,
            pool,
            space,
            target,
            original_score,
            importance,
            mutable,
            start: Instant::now(),
            evaluations: Cell::new(0),
            failed: Cell::new(0),
            iterations: Cell::new(0),
        }
    }

    pub fn config(&self) -> &CounterfactualConfig {
        self.cfg
    }

    pub fn space(&self) -> &FeatureSpace {
        &self.space
    }

    pub fn original(&self) -> &[f64] {
        self.instance.values()
    }

    pub fn original_score(&self) -> f64 {
        self.original_score
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Normalized importance per feature, 0 for immutable features.
    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn mutable(&self) -> &[usize] {
        &self.mutable
    }

    /// Largest number of features a candidate may change.
    pub fn change_budget(&self) -> usize {
        self.cfg.max_changes.min(self.mutable.len())
    }

    pub fn out_of_time(&self) -> bool {
        match self.cfg.timeout {
            Some(t) => self.start.elapsed().as_secs_f32() > t,
            None => false,
        }
    }

    pub fn tick(&self) {
        self.iterations.set(self.iterations.get() + 1);
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    pub fn failed(&self) -> usize {
        self.failed.get()
    }

    pub fn iterations(&self) -> usize {
        self.iterations.get()
    }

    /// Clamp into the domain and restore immutable features.
    pub fn materialize(&self, values: &mut [f64]) {
        let original = self.instance.values();
        for (j, v) in values.iter_mut().enumerate() {
            *v = if self.space.is_mutable(j) {
                self.space.clamp(j, *v)
            } else {
                original[j]
            };
        }
    }

    /// Materialized values of a point in normalized coordinates.
    pub fn values_at(&self, unit: &[f64]) -> Vec<f64> {
        let mut values: Vec<f64> = unit
            .iter()
            .enumerate()
            .map(|(j, u)| self.space.denormalize(j, *u))
            .collect();
        self.materialize(&mut values);
        values
    }

    pub fn unit_point(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(j, v)| self.space.normalize(j, *v).clamp(0.0, 1.0))
            .collect()
    }

    pub fn changed(&self, values: &[f64]) -> Vec<usize> {
        let original = self.instance.values();
        (0..values.len())
            .filter(|j| is_change(&self.space, *j, original[*j], values[*j]))
            .collect()
    }

    /// Revert the least important changes until the change budget holds.
    pub fn repair(&self, values: &mut [f64]) {
        let changed = self.changed(values);
        let budget = self.cfg.max_changes;
        if changed.len() <= budget {
            return;
        }
        let weights: Vec<f64> = changed.iter().map(|j| self.importance[*j]).collect();
        let original = self.instance.values();
        for pos in argsort_desc(&weights).into_iter().skip(budget) {
            let j = changed[pos];
            values[j] = original[j];
        }
    }

    pub fn distance(&self, values: &[f64]) -> f64 {
        self.distance_between(values, self.instance.values())
    }

    pub fn distance_between(&self, a: &[f64], b: &[f64]) -> f64 {
        self.cfg.distance.distance(&self.space, a, b)
    }

    /// Target achievement bonus, minus a distance penalty, plus a bonus for
    /// changing important features.
    pub fn fitness(&self, score: Option<f64>, distance: f64, changed: &[usize]) -> f64 {
        let Some(s) = score else {
            return f64::NEG_INFINITY;
        };
        let gap = self.target.shortfall(self.original_score).max(f64::EPSILON);
        let mut fitness = 1.0 - self.target.shortfall(s) / gap;
        if self.target.is_met(s) {
            fitness += TARGET_BONUS;
        }
        fitness -= DISTANCE_PENALTY * distance;
        fitness += IMPORTANCE_BONUS * changed.iter().map(|j| self.importance[*j]).sum::<f64>();
        if changed.len() > self.cfg.max_changes {
            fitness -= (changed.len() - self.cfg.max_changes) as f64;
        }
        fitness
    }

    /// Score every point in parallel. Points must already be materialized.
    pub fn evaluate(&self, points: Vec<Vec<f64>>) -> Vec<Candidate> {
        let batch: Vec<FeatureVector> = points.iter().map(|v| self.instance.with_values(v.clone())).collect();
        let (scores, failed) = self.pool.scores(self.predictor, &batch);
        self.evaluations.set(self.evaluations.get() + batch.len());
        self.failed.set(self.failed.get() + failed);
        points
            .into_iter()
            .zip(scores)
            .map(|(values, score)| {
                let distance = self.distance(&values);
                let changed = self.changed(&values);
                let fitness = self.fitness(score, distance, &changed);
                Candidate {
                    meets_target: score.map_or(false, |s| self.target.is_met(s)),
                    values,
                    score,
                    distance,
                    changed,
                    fitness,
                }
            })
            .collect()
    }
}

/// Normalized importance per feature from optional name-keyed hints.
///
/// Every mutable feature keeps a floor share so it can still be picked; immutable
/// features get 0.
fn importance_weights(instance: &FeatureVector, space: &FeatureSpace, hints: Option<&HashMap<String, f64>>) -> Vec<f64> {
    let raw: Vec<f64> = instance
        .names()
        .iter()
        .map(|name| {
            hints
                .and_then(|h| h.get(name))
                .map(|v| if v.is_finite() { v.abs() } else { 0.0 })
                .unwrap_or(0.0)
        })
        .collect();
    let max = raw
        .iter()
        .enumerate()
        .filter(|(j, _)| space.is_mutable(*j))
        .fold(0.0f64, |m, (_, v)| m.max(*v));
    let weights: Vec<f64> = raw
        .iter()
        .enumerate()
        .map(|(j, v)| {
            if !space.is_mutable(j) {
                0.0
            } else if max > 0.0 {
                v + IMPORTANCE_FLOOR * max
            } else {
                1.0
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter().map(|w| w / total).collect()
    } else {
        weights
    }
}
