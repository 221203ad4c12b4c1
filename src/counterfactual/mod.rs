//! Counterfactual
//!
//! Search for small, feasible changes to an instance that move its score to a
//! target. Three interchangeable strategies propose candidates; the searcher
//! keeps the ones within the change budget and the domain, ranks them, and
//! returns a mutually diverse selection.
mod diversity;
mod genetic;
mod gradient;
mod objective;
mod random;
mod tests;

pub use diversity::select_diverse;
pub use genetic::GeneticSearch;
pub use gradient::GradientSearch;
pub use objective::{feasibility, relative_change, Candidate, SearchContext, Target, TargetDirection};
pub use random::RandomSearch;

use crate::attribution::ExplanationIO;
use crate::constants::{
    COUNTERFACTUAL_FD_STEP, CROSSOVER_RATE, DISTANCE_WEIGHT, ELITE_COUNT, FAILURE_RATIO, GENERATIONS,
    GRADIENT_ITERATIONS, LEARNING_RATE, MAX_FEATURE_CHANGES, MOMENTUM, MUTATION_RATE, POPULATION_SIZE,
    RANDOM_ITERATIONS, RESTARTS, SCENARIO_COUNT, TARGET_TOLERANCE, TOURNAMENT_SIZE,
};
use crate::distance::DistanceMetric;
use crate::errors::ExplainError;
use crate::features::{FeatureDomain, FeatureVector};
use crate::predictor::{PredictPool, Predictor};
use crate::random::RandomSource;
use crate::utils::{
    items_to_strings, validate_count_parameter, validate_float_parameter, validate_positive_float_parameter,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

/// Search algorithm used to propose counterfactuals.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Strategy {
    #[default]
    Genetic,
    GradientDescent,
    Random,
}

impl FromStr for Strategy {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Genetic" | "genetic" => Ok(Strategy::Genetic),
            "GradientDescent" | "gradient" => Ok(Strategy::GradientDescent),
            "Random" | "random" => Ok(Strategy::Random),
            _ => Err(ExplainError::ParseString(
                s.to_string(),
                "Strategy".to_string(),
                items_to_strings(vec!["Genetic", "GradientDescent", "Random"]),
            )),
        }
    }
}

/// A search algorithm proposing candidates around the original instance.
///
/// Implementations evaluate through the [`SearchContext`], clamp every proposal
/// into the domain, and respect its iteration and time budgets. The returned
/// candidates are filtered, ranked, and diversified by the caller.
pub trait CounterfactualStrategy {
    fn search(&self, ctx: &SearchContext, rng: &mut RandomSource) -> Result<Vec<Candidate>, ExplainError>;
}

/// Strategy implementation for a configured [`Strategy`].
pub fn strategy_for(strategy: &Strategy) -> Box<dyn CounterfactualStrategy> {
    match strategy {
        Strategy::Genetic => Box::new(GeneticSearch),
        Strategy::GradientDescent => Box::new(GradientSearch),
        Strategy::Random => Box::new(RandomSearch),
    }
}

fn default_tolerance() -> f64 {
    TARGET_TOLERANCE
}
fn default_max_changes() -> usize {
    MAX_FEATURE_CHANGES
}
fn default_n_scenarios() -> usize {
    SCENARIO_COUNT
}
fn default_population_size() -> usize {
    POPULATION_SIZE
}
fn default_generations() -> usize {
    GENERATIONS
}
fn default_elite_count() -> usize {
    ELITE_COUNT
}
fn default_tournament_size() -> usize {
    TOURNAMENT_SIZE
}
fn default_mutation_rate() -> f64 {
    MUTATION_RATE
}
fn default_crossover_rate() -> f64 {
    CROSSOVER_RATE
}
fn default_restarts() -> usize {
    RESTARTS
}
fn default_gradient_iterations() -> usize {
    GRADIENT_ITERATIONS
}
fn default_learning_rate() -> f64 {
    LEARNING_RATE
}
fn default_momentum() -> f64 {
    MOMENTUM
}
fn default_distance_weight() -> f64 {
    DISTANCE_WEIGHT
}
fn default_fd_step() -> f64 {
    COUNTERFACTUAL_FD_STEP
}
fn default_random_iterations() -> usize {
    RANDOM_ITERATIONS
}
fn default_max_failure_ratio() -> f64 {
    FAILURE_RATIO
}

/// Configuration for the [`CounterfactualSearcher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterfactualConfig {
    #[serde(default)]
    pub strategy: Strategy,
    /// Score to reach. `None` flips the decision across 0.5.
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Most features a scenario may change.
    #[serde(default = "default_max_changes")]
    pub max_changes: usize,
    /// Scenarios to return.
    #[serde(default = "default_n_scenarios")]
    pub n_scenarios: usize,
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    #[serde(default = "default_generations")]
    pub generations: usize,
    #[serde(default = "default_elite_count")]
    pub elite_count: usize,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    #[serde(default = "default_restarts")]
    pub restarts: usize,
    /// Gradient steps per restart.
    #[serde(default = "default_gradient_iterations")]
    pub gradient_iterations: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// Weight of the squared distance in the gradient objective.
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,
    /// Central difference half width in normalized units.
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,
    #[serde(default = "default_random_iterations")]
    pub random_iterations: usize,
    #[serde(default)]
    pub distance: DistanceMetric,
    /// Wall clock budget of a search in seconds.
    #[serde(default)]
    pub timeout: Option<f32>,
    #[serde(default = "default_max_failure_ratio")]
    pub max_failure_ratio: f64,
    #[serde(default)]
    pub num_threads: Option<usize>,
    #[serde(default)]
    pub predict_timeout: Option<f32>,
    /// Log progress every this many iterations, 0 to disable.
    #[serde(default)]
    pub log_iterations: usize,
}

impl Default for CounterfactualConfig {
    fn default() -> Self {
        CounterfactualConfig {
            strategy: Strategy::Genetic,
            target: None,
            tolerance: TARGET_TOLERANCE,
            max_changes: MAX_FEATURE_CHANGES,
            n_scenarios: SCENARIO_COUNT,
            population_size: POPULATION_SIZE,
            generations: GENERATIONS,
            elite_count: ELITE_COUNT,
            tournament_size: TOURNAMENT_SIZE,
            mutation_rate: MUTATION_RATE,
            crossover_rate: CROSSOVER_RATE,
            restarts: RESTARTS,
            gradient_iterations: GRADIENT_ITERATIONS,
            learning_rate: LEARNING_RATE,
            momentum: MOMENTUM,
            distance_weight: DISTANCE_WEIGHT,
            fd_step: COUNTERFACTUAL_FD_STEP,
            random_iterations: RANDOM_ITERATIONS,
            distance: DistanceMetric::Euclidean,
            timeout: None,
            max_failure_ratio: FAILURE_RATIO,
            num_threads: None,
            predict_timeout: None,
            log_iterations: 0,
        }
    }
}

impl CounterfactualConfig {
    pub fn set_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn set_target(mut self, target: Option<f64>) -> Self {
        self.target = target;
        self
    }

    pub fn set_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn set_max_changes(mut self, max_changes: usize) -> Self {
        self.max_changes = max_changes;
        self
    }

    pub fn set_n_scenarios(mut self, n_scenarios: usize) -> Self {
        self.n_scenarios = n_scenarios;
        self
    }

    pub fn set_population_size(mut self, population_size: usize) -> Self {
        self.population_size = population_size;
        self
    }

    pub fn set_generations(mut self, generations: usize) -> Self {
        self.generations = generations;
        self
    }

    pub fn set_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn set_gradient_iterations(mut self, gradient_iterations: usize) -> Self {
        self.gradient_iterations = gradient_iterations;
        self
    }

    pub fn set_random_iterations(mut self, random_iterations: usize) -> Self {
        self.random_iterations = random_iterations;
        self
    }

    pub fn set_timeout(mut self, timeout: Option<f32>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.log_iterations = log_iterations;
        self
    }

    pub fn validate(&self) -> Result<(), ExplainError> {
        if let Some(t) = self.target {
            validate_float_parameter(t, f64::MIN, f64::MAX, "target")?;
        }
        validate_float_parameter(self.tolerance, 0.0, f64::MAX, "tolerance")?;
        validate_count_parameter(self.max_changes, 1, "max_changes")?;
        validate_count_parameter(self.n_scenarios, 1, "n_scenarios")?;
        validate_count_parameter(self.population_size, 2, "population_size")?;
        validate_count_parameter(self.tournament_size, 1, "tournament_size")?;
        if self.elite_count >= self.population_size {
            return Err(ExplainError::InvalidParameter(
                "elite_count".to_string(),
                format!("fewer than population_size ({})", self.population_size),
                self.elite_count.to_string(),
            ));
        }
        validate_float_parameter(self.mutation_rate, 0.0, 1.0, "mutation_rate")?;
        validate_float_parameter(self.crossover_rate, 0.0, 1.0, "crossover_rate")?;
        validate_count_parameter(self.restarts, 1, "restarts")?;
        validate_positive_float_parameter(self.learning_rate, "learning_rate")?;
        validate_float_parameter(self.momentum, 0.0, 0.999, "momentum")?;
        validate_float_parameter(self.distance_weight, 0.0, f64::MAX, "distance_weight")?;
        validate_float_parameter(self.fd_step, f64::MIN_POSITIVE, 0.5, "fd_step")?;
        validate_float_parameter(self.max_failure_ratio, 0.0, 1.0, "max_failure_ratio")?;
        if let Some(t) = self.timeout {
            validate_float_parameter(f64::from(t), 0.0, f64::MAX, "timeout")?;
        }
        Ok(())
    }
}

/// One feature change of a scenario.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FeatureChange {
    pub feature: String,
    pub old_value: f64,
    pub new_value: f64,
    /// `|new - old|` relative to `|old|`, or to the domain width when `old` is 0.
    pub relative_change: f64,
}

impl FeatureChange {
    pub fn is_increase(&self) -> bool {
        self.new_value > self.old_value
    }
}

/// A counterfactual scenario.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Counterfactual {
    /// Feature values in the order of the original instance.
    pub values: Vec<f64>,
    pub changes: Vec<FeatureChange>,
    pub predicted_outcome: f64,
    /// Range-normalized distance from the original instance.
    pub distance: f64,
    pub change_count: usize,
    pub fitness: f64,
    pub feasibility: f64,
    pub meets_target: bool,
}

impl Counterfactual {
    /// The scenario as a feature vector with the names of `original`.
    pub fn to_feature_vector(&self, original: &FeatureVector) -> FeatureVector {
        original.with_values(self.values.clone())
    }

    pub fn change(&self, feature: &str) -> Option<&FeatureChange> {
        self.changes.iter().find(|c| c.feature == feature)
    }
}

/// How a search ended.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum SearchStatus {
    /// At least one scenario meets the target.
    Satisfied,
    /// The original instance already meets the target, nothing to change.
    AlreadySatisfied,
    /// The budget ran out; scenarios are best-effort and do not meet the target.
    NoFeasibleCounterfactual,
}

/// Result of a counterfactual search.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CounterfactualOutcome {
    pub status: SearchStatus,
    pub strategy: Strategy,
    pub features: Vec<String>,
    pub original_score: f64,
    pub target: Target,
    /// Ranked, mutually diverse scenarios.
    pub scenarios: Vec<Counterfactual>,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub iterations: usize,
}

impl CounterfactualOutcome {
    pub fn best(&self) -> Option<&Counterfactual> {
        self.scenarios.first()
    }
}

impl ExplanationIO for CounterfactualOutcome {}

/// Counterfactual searcher.
pub struct CounterfactualSearcher {
    cfg: CounterfactualConfig,
    pool: PredictPool,
    domain: FeatureDomain,
}

impl CounterfactualSearcher {
    pub fn new(cfg: CounterfactualConfig, domain: FeatureDomain) -> Result<Self, ExplainError> {
        cfg.validate()?;
        domain.validate()?;
        let pool = PredictPool::new(cfg.num_threads, cfg.predict_timeout)?;
        Ok(CounterfactualSearcher { cfg, pool, domain })
    }

    pub fn config(&self) -> &CounterfactualConfig {
        &self.cfg
    }

    /// Search counterfactuals for `instance`.
    ///
    /// * `instance` - The instance to change.
    /// * `predictor` - The scoring function.
    /// * `importance` - Optional per-feature importance hints, such as absolute
    ///   attributions. Missing features get a small share.
    /// * `rng` - Source for every random choice of the search.
    pub fn search(
        &self,
        instance: &FeatureVector,
        predictor: &dyn Predictor,
        importance: Option<&HashMap<String, f64>>,
        rng: &mut RandomSource,
    ) -> Result<CounterfactualOutcome, ExplainError> {
        if instance.is_empty() {
            return Err(ExplainError::InvalidConfiguration(
                "can not search counterfactuals of an empty feature vector.".to_string(),
            ));
        }
        let space = self.domain.resolve_checked(instance)?;
        let original_score = self.pool.predict_one(predictor, instance)?.overall;
        let target = match self.cfg.target {
            Some(t) => Target::new(t, self.cfg.tolerance, original_score),
            None => Target::flip(original_score, self.cfg.tolerance),
        };
        let ctx = SearchContext::new(
            &self.cfg,
            instance,
            predictor,
            &self.pool,
            space,
            target,
            original_score,
            importance,
        );

        let outcome = |status: SearchStatus, scenarios: Vec<Counterfactual>| CounterfactualOutcome {
            status,
            strategy: self.cfg.strategy,
            features: instance.names().to_vec(),
            original_score,
            target,
            scenarios,
            evaluations: ctx.evaluations(),
            failed_evaluations: ctx.failed(),
            iterations: ctx.iterations(),
        };

        if target.is_met(original_score) {
            info!("Original score {:.4} already meets the target.", original_score);
            return Ok(outcome(SearchStatus::AlreadySatisfied, Vec::new()));
        }
        if ctx.mutable().is_empty() {
            warn!("Every feature is immutable, no counterfactual can be searched.");
            return Ok(outcome(SearchStatus::NoFeasibleCounterfactual, Vec::new()));
        }

        let candidates = strategy_for(&self.cfg.strategy).search(&ctx, rng)?;
        if ctx.evaluations() > 0 && ctx.failed() as f64 / ctx.evaluations() as f64 > self.cfg.max_failure_ratio {
            return Err(ExplainError::InsufficientData(format!(
                "{} of {} candidate evaluations failed, more than the allowed ratio {}.",
                ctx.failed(),
                ctx.evaluations(),
                self.cfg.max_failure_ratio
            )));
        }

        let (status, scenarios) = self.finalize(&ctx, instance, candidates);
        if self.cfg.log_iterations > 0 {
            info!(
                "Finished a {:?} counterfactual search with {} evaluations and {} scenarios.",
                self.cfg.strategy,
                ctx.evaluations(),
                scenarios.len()
            );
        }
        Ok(outcome(status, scenarios))
    }

    /// Filter, rank, deduplicate, and diversify raw candidates.
    fn finalize(
        &self,
        ctx: &SearchContext,
        instance: &FeatureVector,
        candidates: Vec<Candidate>,
    ) -> (SearchStatus, Vec<Counterfactual>) {
        let valid: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| {
                c.score.is_some()
                    && c.change_count() >= 1
                    && c.change_count() <= self.cfg.max_changes
                    && ctx.space().contains_all(&c.values)
                    && c.changed.iter().all(|j| ctx.space().is_mutable(*j))
            })
            .collect();
        let satisfied = valid.iter().any(|c| c.meets_target);
        let mut pool: Vec<Candidate> = if satisfied {
            valid.into_iter().filter(|c| c.meets_target).collect()
        } else {
            valid
        };

        let target = ctx.target();
        pool.sort_by(|a, b| {
            let sa = target.shortfall(a.score.unwrap_or(f64::NAN));
            let sb = target.shortfall(b.score.unwrap_or(f64::NAN));
            sa.partial_cmp(&sb)
                .unwrap_or(Ordering::Equal)
                .then(a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
                .then(b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal))
        });

        let mut unique: Vec<Candidate> = Vec::with_capacity(pool.len());
        for c in pool {
            if !unique.iter().any(|u| ctx.distance_between(&u.values, &c.values) <= f64::EPSILON) {
                unique.push(c);
            }
        }

        let picked = select_diverse(unique.len(), self.cfg.n_scenarios, |a, b| {
            ctx.distance_between(&unique[a].values, &unique[b].values)
        });
        let scenarios = picked
            .into_iter()
            .map(|i| to_counterfactual(ctx, instance, &unique[i]))
            .collect();
        let status = if satisfied {
            SearchStatus::Satisfied
        } else {
            warn!("No candidate meets the target, returning best-effort scenarios. Try to increase max_changes or the search budget.");
            SearchStatus::NoFeasibleCounterfactual
        };
        (status, scenarios)
    }
}

fn to_counterfactual(ctx: &SearchContext, instance: &FeatureVector, c: &Candidate) -> Counterfactual {
    let original = instance.values();
    let changes = c
        .changed
        .iter()
        .map(|j| FeatureChange {
            feature: instance.name(*j).to_string(),
            old_value: original[*j],
            new_value: c.values[*j],
            relative_change: relative_change(ctx.space(), *j, original[*j], c.values[*j]),
        })
        .collect();
    Counterfactual {
        values: c.values.clone(),
        changes,
        predicted_outcome: c.score.unwrap_or(f64::NAN),
        distance: c.distance,
        change_count: c.change_count(),
        fitness: c.fitness,
        feasibility: feasibility(ctx.space(), original, &c.values),
        meets_target: c.meets_target,
    }
}
