use super::{Candidate, CounterfactualStrategy, SearchContext};
use crate::constants::RESTART_JITTER;
use crate::errors::ExplainError;
use crate::random::RandomSource;
use crate::utils::argsort_desc;
use log::{info, warn};

/// Momentum gradient descent on `(score - target)² + λ·distance²` in normalized
/// coordinates.
///
/// Each restart only moves an importance-weighted subset of at most `max_changes`
/// mutable features. The first restart starts at the original instance and moves
/// the features with the steepest initial gradient; later restarts draw their
/// subset at random and jitter the start.
pub struct GradientSearch;

struct Slope {
    center: Candidate,
    /// Loss gradient per feature, 0 outside the active subset.
    gradient: Vec<f64>,
}

fn loss(ctx: &SearchContext, c: &Candidate) -> Option<f64> {
    let weight = ctx.config().distance_weight;
    c.score
        .map(|s| (s - ctx.target().score).powi(2) + weight * c.distance * c.distance)
}

impl GradientSearch {
    /// Evaluate `unit` and central differences along every feature in `active`.
    fn slope(&self, ctx: &SearchContext, unit: &[f64], active: &[usize]) -> Slope {
        let fd_step = ctx.config().fd_step;
        let mut points = Vec::with_capacity(1 + 2 * active.len());
        let mut spans = Vec::with_capacity(active.len());
        points.push(ctx.values_at(unit));
        for &j in active {
            let bounds = ctx.space().bounds(j);
            // Integer features need at least one whole unit to move at all.
            let h = if bounds.integer {
                fd_step.max(1.0 / bounds.range())
            } else {
                fd_step
            };
            let mut up = unit.to_vec();
            up[j] = (unit[j] + h).min(1.0);
            let mut down = unit.to_vec();
            down[j] = (unit[j] - h).max(0.0);
            let up = ctx.values_at(&up);
            let down = ctx.values_at(&down);
            spans.push(ctx.space().normalize(j, up[j]) - ctx.space().normalize(j, down[j]));
            points.push(up);
            points.push(down);
        }

        let mut evaluated = ctx.evaluate(points);
        let mut gradient = vec![0.0; unit.len()];
        for (i, &j) in active.iter().enumerate() {
            let up = loss(ctx, &evaluated[1 + 2 * i]);
            let down = loss(ctx, &evaluated[2 + 2 * i]);
            if let (Some(u), Some(d)) = (up, down) {
                if spans[i] > 0.0 {
                    gradient[j] = (u - d) / spans[i];
                }
            }
        }
        Slope {
            center: evaluated.swap_remove(0),
            gradient,
        }
    }
}

impl CounterfactualStrategy for GradientSearch {
    fn search(&self, ctx: &SearchContext, rng: &mut RandomSource) -> Result<Vec<Candidate>, ExplainError> {
        let cfg = ctx.config();
        let budget = ctx.change_budget();
        let weights: Vec<f64> = ctx.mutable().iter().map(|j| ctx.importance()[*j]).collect();
        let start = ctx.unit_point(ctx.original());

        let initial = self.slope(ctx, &start, ctx.mutable());
        let steepest: Vec<f64> = ctx
            .mutable()
            .iter()
            .zip(weights.iter())
            .map(|(j, w)| (initial.gradient[*j].abs() + f64::EPSILON) * w)
            .collect();
        let first_subset: Vec<usize> = argsort_desc(&steepest)
            .into_iter()
            .take(budget)
            .map(|i| ctx.mutable()[i])
            .collect();

        let mut found = Vec::new();
        let mut reached_any = false;
        for restart in 0..cfg.restarts {
            if ctx.out_of_time() {
                warn!("Reached timeout limit before finishing all restarts. Try to increase the timeout or decrease restarts.");
                break;
            }
            let active = if restart == 0 {
                first_subset.clone()
            } else {
                rng.weighted_subset(ctx.mutable(), &weights, budget)
            };
            let mut unit = start.clone();
            if restart > 0 {
                for &j in &active {
                    unit[j] = (unit[j] + rng.uniform_range(-RESTART_JITTER, RESTART_JITTER)).clamp(0.0, 1.0);
                }
            }

            let mut velocity = vec![0.0; unit.len()];
            let mut best: Option<(f64, Candidate)> = None;
            let mut reached = false;
            for _ in 0..cfg.gradient_iterations {
                ctx.tick();
                let slope = self.slope(ctx, &unit, &active);
                if slope.center.meets_target {
                    found.push(slope.center);
                    reached = true;
                    break;
                }
                if let Some(l) = loss(ctx, &slope.center) {
                    if best.as_ref().map_or(true, |(b, _)| l < *b) {
                        best = Some((l, slope.center));
                    }
                }
                if ctx.out_of_time() {
                    break;
                }
                for &j in &active {
                    velocity[j] = cfg.momentum * velocity[j] - cfg.learning_rate * slope.gradient[j];
                    unit[j] = (unit[j] + velocity[j]).clamp(0.0, 1.0);
                }
            }
            if !reached {
                if let Some((_, c)) = best {
                    found.push(c);
                }
            }
            reached_any |= reached;
            if cfg.log_iterations > 0 {
                info!(
                    "restart {:0?}, features: {:1?}, reached target: {:2?}",
                    restart, active, reached
                );
            }
        }
        if !reached_any {
            warn!("Reached iteration limit before meeting the target. Try to increase gradient_iterations or restarts.");
        }
        Ok(found)
    }
}
