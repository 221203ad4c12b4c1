use super::{Candidate, CounterfactualStrategy, SearchContext};
use crate::constants::{CANDIDATE_POOL_FACTOR, RANDOM_BATCH};
use crate::errors::ExplainError;
use crate::random::RandomSource;
use log::{info, warn};
use std::cmp::Ordering;

/// Random perturbation of importance-weighted feature subsets.
///
/// Draws are scored in batches; the search stops once enough of them meet the
/// target or the draw budget is spent.
pub struct RandomSearch;

impl RandomSearch {
    fn draw(&self, ctx: &SearchContext, weights: &[f64], rng: &mut RandomSource) -> Vec<f64> {
        let mut values = ctx.original().to_vec();
        let k = 1 + rng.index(ctx.change_budget());
        for j in rng.weighted_subset(ctx.mutable(), weights, k) {
            let b = ctx.space().bounds(j);
            values[j] = if rng.bernoulli(0.5) {
                // Random direction and magnitude around the original value.
                values[j] + rng.uniform_range(-1.0, 1.0) * rng.uniform() * b.range()
            } else {
                rng.uniform_range(b.min, b.max)
            };
        }
        ctx.materialize(&mut values);
        values
    }
}

impl CounterfactualStrategy for RandomSearch {
    fn search(&self, ctx: &SearchContext, rng: &mut RandomSource) -> Result<Vec<Candidate>, ExplainError> {
        let cfg = ctx.config();
        let weights: Vec<f64> = ctx.mutable().iter().map(|j| ctx.importance()[*j]).collect();
        let wanted = cfg.n_scenarios * CANDIDATE_POOL_FACTOR;
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut drawn = 0;

        while drawn < cfg.random_iterations {
            if ctx.out_of_time() {
                warn!("Reached timeout limit before the draw budget was spent. Try to increase the timeout.");
                break;
            }
            let size = RANDOM_BATCH.min(cfg.random_iterations - drawn);
            let mut points = Vec::with_capacity(size);
            for _ in 0..size {
                ctx.tick();
                points.push(self.draw(ctx, &weights, rng));
            }
            drawn += size;
            for c in ctx.evaluate(points) {
                if c.meets_target {
                    accepted.push(c);
                } else {
                    rejected.push(c);
                }
            }
            if cfg.log_iterations > 0 {
                info!("draws {:0?}, accepted: {:1?}", drawn, accepted.len());
            }
            if accepted.len() >= wanted {
                info!("Stopping early since enough candidates meet the target.");
                break;
            }
        }

        if accepted.is_empty() {
            warn!("Reached iteration limit before meeting the target. Try to increase random_iterations or max_changes.");
            rejected.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
            rejected.truncate(wanted);
            return Ok(rejected);
        }
        Ok(accepted)
    }
}
