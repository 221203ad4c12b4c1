use super::{Candidate, CounterfactualStrategy, SearchContext};
use crate::constants::{MUTATION_SCALE, REVERT_PROBABILITY};
use crate::errors::ExplainError;
use crate::random::RandomSource;
use log::{info, warn};
use std::cmp::Ordering;

/// Evolutionary search.
///
/// The population starts from the original instance plus random perturbations of
/// importance-weighted feature subsets. Every generation keeps the elites, fills
/// the rest with tournament-selected parents recombined by uniform crossover and
/// mutated toward important features, and repairs children that change too many
/// features. Stops as soon as a candidate meets the target.
pub struct GeneticSearch;

impl GeneticSearch {
    /// A random perturbation of the original instance.
    fn seed(&self, ctx: &SearchContext, weights: &[f64], rng: &mut RandomSource) -> Vec<f64> {
        let mut values = ctx.original().to_vec();
        let k = 1 + rng.index(ctx.change_budget());
        for j in rng.weighted_subset(ctx.mutable(), weights, k) {
            let b = ctx.space().bounds(j);
            values[j] = rng.uniform_range(b.min, b.max);
        }
        ctx.materialize(&mut values);
        values
    }

    fn tournament<'p>(&self, population: &'p [Candidate], size: usize, rng: &mut RandomSource) -> &'p Candidate {
        let mut best = &population[rng.index(population.len())];
        for _ in 1..size {
            let challenger = &population[rng.index(population.len())];
            if challenger.fitness > best.fitness {
                best = challenger;
            }
        }
        best
    }

    fn crossover(&self, first: &[f64], second: &[f64], rng: &mut RandomSource) -> Vec<f64> {
        first
            .iter()
            .zip(second.iter())
            .map(|(a, b)| if rng.bernoulli(0.5) { *a } else { *b })
            .collect()
    }

    fn mutate(&self, ctx: &SearchContext, values: &mut [f64], rng: &mut RandomSource) {
        let rate = ctx.config().mutation_rate;
        let n_mutable = ctx.mutable().len() as f64;
        let original = ctx.original();
        for &j in ctx.mutable() {
            // Importance sums to 1, so the mean probability is the mutation rate.
            let p = (rate * ctx.importance()[j] * n_mutable).min(1.0);
            if !rng.bernoulli(p) {
                continue;
            }
            if rng.bernoulli(REVERT_PROBABILITY) {
                values[j] = original[j];
            } else {
                values[j] += rng.uniform_range(-1.0, 1.0) * MUTATION_SCALE * ctx.space().range(j);
            }
        }
        ctx.materialize(values);
        ctx.repair(values);
    }
}

fn by_fitness(a: &Candidate, b: &Candidate) -> Ordering {
    b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal)
}

impl CounterfactualStrategy for GeneticSearch {
    fn search(&self, ctx: &SearchContext, rng: &mut RandomSource) -> Result<Vec<Candidate>, ExplainError> {
        let cfg = ctx.config();
        let weights: Vec<f64> = ctx.mutable().iter().map(|j| ctx.importance()[*j]).collect();
        let meets = |c: &Candidate| c.meets_target && c.change_count() <= cfg.max_changes;

        let mut initial = vec![ctx.original().to_vec()];
        while initial.len() < cfg.population_size {
            initial.push(self.seed(ctx, &weights, rng));
        }
        let mut population = ctx.evaluate(initial);
        let mut archive = population.clone();
        let mut met = population.iter().any(meets);

        for generation in 0..cfg.generations {
            if met {
                info!("Stopping early since a candidate meets the target.");
                break;
            }
            if ctx.out_of_time() {
                warn!("Reached timeout limit before meeting the target. Try to increase the timeout or decrease the population size.");
                break;
            }
            ctx.tick();

            population.sort_by(by_fitness);
            let elites: Vec<Candidate> = population.iter().take(cfg.elite_count).cloned().collect();
            let mut children = Vec::with_capacity(cfg.population_size - elites.len());
            while children.len() < cfg.population_size - elites.len() {
                let first = self.tournament(&population, cfg.tournament_size, rng);
                let second = self.tournament(&population, cfg.tournament_size, rng);
                let mut child = if rng.bernoulli(cfg.crossover_rate) {
                    self.crossover(&first.values, &second.values, rng)
                } else {
                    first.values.clone()
                };
                self.mutate(ctx, &mut child, rng);
                children.push(child);
            }

            let offspring = ctx.evaluate(children);
            met = offspring.iter().any(meets);
            archive.extend(offspring.iter().cloned());
            population = elites;
            population.extend(offspring);

            if cfg.log_iterations > 0 && generation % cfg.log_iterations == 0 {
                if let Some(best) = population.iter().max_by(|a, b| by_fitness(b, a)) {
                    info!(
                        "generation {:0?}, best fitness: {:1?}, best score: {:2?}, changes: {:3?}",
                        generation,
                        best.fitness,
                        best.score,
                        best.change_count()
                    );
                }
            }

            if !met && generation == cfg.generations - 1 {
                warn!("Reached generation limit before meeting the target. Try to increase generations or max_changes.");
            }
        }
        Ok(archive)
    }
}
