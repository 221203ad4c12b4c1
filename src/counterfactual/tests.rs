#[cfg(test)]
mod counterfactual_tests {
    use crate::attribution::ExplanationIO;
    use crate::counterfactual::{
        CounterfactualConfig, CounterfactualOutcome, CounterfactualSearcher, SearchStatus, Strategy, TargetDirection,
    };
    use crate::errors::{ExplainError, PredictionError};
    use crate::features::{FeatureDomain, FeatureVector};
    use crate::predictor::Prediction;
    use crate::random::RandomSource;
    use std::collections::HashMap;

    const STRATEGIES: [Strategy; 3] = [Strategy::Genetic, Strategy::GradientDescent, Strategy::Random];

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    fn content_score(fv: &FeatureVector) -> Result<Prediction, PredictionError> {
        let score = 0.3 + 0.0004 * fv.value(0) + 0.1 * fv.value(1);
        Ok(Prediction::new(score.min(1.0)))
    }

    fn content_instance() -> FeatureVector {
        FeatureVector::from_pairs([("contentLength", 300.0), ("categoryCount", 0.0)]).unwrap()
    }

    fn content_domain() -> FeatureDomain {
        FeatureDomain::new()
            .set_bounds("contentLength", 0.0, 5000.0)
            .set_bounds("categoryCount", 0.0, 10.0)
            .set_integer("categoryCount")
    }

    fn uniform_instance(n: usize, value: f64) -> FeatureVector {
        FeatureVector::new((0..n).map(|i| format!("f{}", i)).collect(), vec![value; n]).unwrap()
    }

    fn uniform_domain(n: usize, max: f64) -> FeatureDomain {
        let mut domain = FeatureDomain::new();
        for i in 0..n {
            domain = domain.set_bounds(format!("f{}", i), 0.0, max);
        }
        domain
    }

    fn search(
        cfg: CounterfactualConfig,
        domain: FeatureDomain,
        instance: &FeatureVector,
        predictor: &dyn crate::predictor::Predictor,
        seed: u64,
    ) -> Result<CounterfactualOutcome, ExplainError> {
        let searcher = CounterfactualSearcher::new(cfg.set_num_threads(Some(2)), domain)?;
        searcher.search(instance, predictor, None, &mut RandomSource::seeded(seed))
    }

    fn assert_valid(outcome: &CounterfactualOutcome, domain: &FeatureDomain, instance: &FeatureVector, max: usize) {
        let space = domain.resolve(instance);
        for s in &outcome.scenarios {
            assert!(s.change_count <= max, "{:?}", s);
            assert_eq!(s.change_count, s.changes.len());
            assert!(space.contains_all(&s.values), "{:?}", s.values);
            assert!(s.feasibility > 0.0 && s.feasibility <= 1.0);
        }
    }

    // -----------------------------------------------------------------------
    // End to end
    // -----------------------------------------------------------------------

    #[test]
    fn test_content_scenarios_every_strategy() {
        let instance = content_instance();
        assert!((content_score(&instance).unwrap().overall - 0.42).abs() < 1e-12);
        for strategy in STRATEGIES {
            let cfg = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.8));
            let outcome = search(cfg, content_domain(), &instance, &content_score, 42).unwrap();
            assert_eq!(outcome.status, SearchStatus::Satisfied, "{:?}", strategy);
            assert_eq!(outcome.target.direction, TargetDirection::Increase);
            assert_valid(&outcome, &content_domain(), &instance, 3);

            let best = outcome.best().unwrap();
            assert!(best.meets_target);
            assert!(best.predicted_outcome >= 0.75, "{:?}: {}", strategy, best.predicted_outcome);
            assert!(best.feasibility > 0.0);
            assert!(best
                .changes
                .iter()
                .any(|c| (c.feature == "categoryCount" || c.feature == "contentLength") && c.is_increase()));
            for s in &outcome.scenarios {
                assert_eq!(s.values[1].fract(), 0.0);
            }
        }
    }

    #[test]
    fn test_default_target_flips_decision() {
        let outcome = search(
            CounterfactualConfig::default(),
            content_domain(),
            &content_instance(),
            &content_score,
            3,
        )
        .unwrap();
        assert!((outcome.target.score - 0.55).abs() < 1e-12);
        assert_eq!(outcome.status, SearchStatus::Satisfied);
        assert!(outcome.scenarios.iter().all(|s| s.predicted_outcome >= 0.5));
    }

    #[test]
    fn test_already_satisfied() {
        let cfg = CounterfactualConfig::default().set_target(Some(0.4));
        let outcome = search(cfg, content_domain(), &content_instance(), &content_score, 0).unwrap();
        assert_eq!(outcome.status, SearchStatus::AlreadySatisfied);
        assert_eq!(outcome.target.direction, TargetDirection::Decrease);
        assert!(outcome.scenarios.is_empty());
    }

    #[test]
    fn test_decreasing_target() {
        let instance = FeatureVector::from_pairs([("contentLength", 500.0), ("categoryCount", 2.0)]).unwrap();
        for strategy in STRATEGIES {
            let cfg = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.5));
            let outcome = search(cfg, content_domain(), &instance, &content_score, 5).unwrap();
            assert_eq!(outcome.target.direction, TargetDirection::Decrease);
            assert_eq!(outcome.status, SearchStatus::Satisfied, "{:?}", strategy);
            let best = outcome.best().unwrap();
            assert!(best.predicted_outcome <= 0.55);
            assert!(best.changes.iter().any(|c| !c.is_increase()));
        }
    }

    // -----------------------------------------------------------------------
    // Budgets and constraints
    // -----------------------------------------------------------------------

    #[test]
    fn test_gradient_descent_converges() {
        let predictor = |fv: &FeatureVector| -> Result<Prediction, PredictionError> {
            Ok(Prediction::new((fv.value(0) + fv.value(1)) / 200.0))
        };
        let instance = uniform_instance(2, 20.0);
        let trials = 40;
        let mut satisfied = 0;
        for seed in 0..trials {
            let cfg = CounterfactualConfig::default()
                .set_strategy(Strategy::GradientDescent)
                .set_target(Some(0.8))
                .set_max_changes(2);
            let outcome = search(cfg, uniform_domain(2, 100.0), &instance, &predictor, seed).unwrap();
            assert_valid(&outcome, &uniform_domain(2, 100.0), &instance, 2);
            if outcome.status == SearchStatus::Satisfied {
                satisfied += 1;
            }
        }
        assert!(satisfied as f64 / trials as f64 >= 0.95, "{} of {}", satisfied, trials);
    }

    #[test]
    fn test_change_budget_respected() {
        let predictor = |fv: &FeatureVector| -> Result<Prediction, PredictionError> {
            Ok(Prediction::new(fv.values().iter().sum::<f64>() / 60.0))
        };
        let instance = uniform_instance(6, 1.0);
        let domain = uniform_domain(6, 10.0);
        for strategy in STRATEGIES {
            let cfg = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.35))
                .set_max_changes(2)
                .set_n_scenarios(5);
            let outcome = search(cfg, domain.clone(), &instance, &predictor, 8).unwrap();
            assert_valid(&outcome, &domain, &instance, 2);
            assert!(!outcome.scenarios.is_empty());
            if strategy != Strategy::GradientDescent {
                assert_eq!(outcome.status, SearchStatus::Satisfied, "{:?}", strategy);
            }
        }
    }

    #[test]
    fn test_immutable_features_never_change() {
        let predictor = |fv: &FeatureVector| -> Result<Prediction, PredictionError> {
            Ok(Prediction::new(0.1 + 0.08 * fv.value(0) + 0.02 * fv.value(1)))
        };
        let instance = FeatureVector::from_pairs([("tenure", 1.0), ("activity", 1.0)]).unwrap();
        let domain = FeatureDomain::new()
            .set_bounds("tenure", 0.0, 10.0)
            .set_bounds("activity", 0.0, 10.0)
            .set_immutable("tenure");
        for strategy in STRATEGIES {
            let reachable = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.3));
            let outcome = search(reachable, domain.clone(), &instance, &predictor, 13).unwrap();
            assert_eq!(outcome.status, SearchStatus::Satisfied, "{:?}", strategy);
            assert!(outcome.scenarios.iter().all(|s| s.change("tenure").is_none()));
            assert!(outcome.scenarios.iter().all(|s| s.values[0] == 1.0));

            // Only the immutable feature could get there.
            let unreachable = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.5))
                .set_generations(5)
                .set_random_iterations(200);
            let outcome = search(unreachable, domain.clone(), &instance, &predictor, 13).unwrap();
            assert_eq!(outcome.status, SearchStatus::NoFeasibleCounterfactual);
            assert!(outcome.scenarios.iter().all(|s| !s.meets_target));
            assert!(outcome.scenarios.iter().all(|s| s.change("tenure").is_none()));
        }
    }

    #[test]
    fn test_all_immutable_is_best_effort() {
        let domain = content_domain().set_immutable("contentLength").set_immutable("categoryCount");
        let outcome = search(
            CounterfactualConfig::default(),
            domain,
            &content_instance(),
            &content_score,
            0,
        )
        .unwrap();
        assert_eq!(outcome.status, SearchStatus::NoFeasibleCounterfactual);
        assert!(outcome.scenarios.is_empty());
    }

    #[test]
    fn test_timeout_returns_best_so_far() {
        let cfg = CounterfactualConfig::default()
            .set_target(Some(0.99))
            .set_timeout(Some(0.0));
        let outcome = search(cfg, content_domain(), &content_instance(), &content_score, 1).unwrap();
        assert!(outcome.evaluations <= 50);
        assert_valid(&outcome, &content_domain(), &content_instance(), 3);
    }

    #[test]
    fn test_genetic_stops_once_target_met() {
        let generations = 500;
        let cfg = CounterfactualConfig::default()
            .set_strategy(Strategy::Genetic)
            .set_target(Some(0.5))
            .set_generations(generations);
        let outcome = search(cfg, content_domain(), &content_instance(), &content_score, 9).unwrap();
        assert_eq!(outcome.status, SearchStatus::Satisfied);
        assert!(outcome.iterations < generations, "{} generations", outcome.iterations);
        assert!(outcome.evaluations < generations * 50);
    }

    #[test]
    fn test_gradient_restarts_stop_once_target_met() {
        let cfg = CounterfactualConfig::default()
            .set_strategy(Strategy::GradientDescent)
            .set_target(Some(0.5));
        let budget = cfg.restarts * cfg.gradient_iterations;
        let outcome = search(cfg, content_domain(), &content_instance(), &content_score, 9).unwrap();
        assert_eq!(outcome.status, SearchStatus::Satisfied);
        assert!(outcome.iterations < budget, "{} of {} steps", outcome.iterations, budget);
    }

    #[test]
    fn test_instance_outside_domain() {
        let score = |fv: &FeatureVector| -> Result<Prediction, PredictionError> {
            Ok(Prediction::new(0.0001 * fv.value(0) + 0.05 * fv.value(1)))
        };
        let instance = FeatureVector::from_pairs([("contentLength", 5200.0), ("categoryCount", 0.0)]).unwrap();
        for strategy in STRATEGIES {
            let cfg = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.8))
                .set_max_changes(1);
            match search(cfg.clone(), content_domain(), &instance, &score, 2) {
                Err(ExplainError::InvalidConfiguration(msg)) => assert!(msg.contains("contentLength"), "{}", msg),
                other => panic!("expected an invalid configuration, got {:?}", other),
            }

            // Once the domain covers the instance, the one-feature fix is found.
            let widened = content_domain().set_bounds("contentLength", 0.0, 6000.0);
            let outcome = search(cfg, widened.clone(), &instance, &score, 2).unwrap();
            assert_valid(&outcome, &widened, &instance, 1);
            assert!(outcome.scenarios.iter().all(|s| s.change("contentLength").is_none() || !s.meets_target));
            if strategy != Strategy::GradientDescent {
                assert_eq!(outcome.status, SearchStatus::Satisfied, "{:?}", strategy);
                let best = outcome.best().unwrap();
                assert_eq!(best.changes.len(), 1);
                assert_eq!(best.changes[0].feature, "categoryCount");
                assert!(best.predicted_outcome >= 0.75);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scenario set
    // -----------------------------------------------------------------------

    #[test]
    fn test_scenarios_are_distinct_and_ranked() {
        for strategy in STRATEGIES {
            let cfg = CounterfactualConfig::default()
                .set_strategy(strategy)
                .set_target(Some(0.8))
                .set_n_scenarios(4);
            let outcome = search(cfg, content_domain(), &content_instance(), &content_score, 21).unwrap();
            let scenarios = &outcome.scenarios;
            assert!(scenarios.len() <= 4);
            for (i, a) in scenarios.iter().enumerate() {
                for b in scenarios.iter().skip(i + 1) {
                    assert_ne!(a.values, b.values);
                }
            }
            // The closest satisfying candidate comes first.
            let first = &scenarios[0];
            assert!(scenarios.iter().all(|s| s.distance >= first.distance));
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let cfg = CounterfactualConfig::default().set_target(Some(0.8));
        let a = search(cfg.clone(), content_domain(), &content_instance(), &content_score, 77).unwrap();
        let b = search(cfg, content_domain(), &content_instance(), &content_score, 77).unwrap();
        assert_eq!(a, b);
        let json = a.json_dump().unwrap();
        assert_eq!(CounterfactualOutcome::from_json(&json).unwrap(), a);
    }

    #[test]
    fn test_importance_hints_and_logging() {
        let hints: HashMap<String, f64> = [("categoryCount".to_string(), 1.0)].into_iter().collect();
        let searcher = CounterfactualSearcher::new(
            CounterfactualConfig::default()
                .set_strategy(Strategy::Random)
                .set_target(Some(0.8))
                .set_log_iterations(1),
            content_domain(),
        )
        .unwrap();
        let outcome = searcher
            .search(&content_instance(), &content_score, Some(&hints), &mut RandomSource::seeded(4))
            .unwrap();
        assert_eq!(outcome.status, SearchStatus::Satisfied);
        assert!(outcome.iterations > 0);
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[test]
    fn test_prediction_failures() {
        let broken = |_: &FeatureVector| -> Result<Prediction, PredictionError> {
            Err(PredictionError::Failed("scorer offline".to_string()))
        };
        assert!(matches!(
            search(CounterfactualConfig::default(), content_domain(), &content_instance(), &broken, 0),
            Err(ExplainError::PredictionFailed(_))
        ));

        // Only the untouched content length can be scored.
        let fragile = |fv: &FeatureVector| -> Result<Prediction, PredictionError> {
            if fv.value(0) == 300.0 {
                content_score(fv)
            } else {
                Err(PredictionError::Failed("unsupported length".to_string()))
            }
        };
        assert!(matches!(
            search(
                CounterfactualConfig::default().set_target(Some(0.8)),
                content_domain(),
                &content_instance(),
                &fragile,
                0
            ),
            Err(ExplainError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(CounterfactualConfig::default().validate().is_ok());
        assert!(CounterfactualConfig::default().set_max_changes(0).validate().is_err());
        assert!(CounterfactualConfig {
            elite_count: 60,
            ..CounterfactualConfig::default()
        }
        .validate()
        .is_err());
        assert!(CounterfactualConfig {
            mutation_rate: 1.5,
            ..CounterfactualConfig::default()
        }
        .validate()
        .is_err());
        assert_eq!("gradient".parse::<Strategy>().unwrap(), Strategy::GradientDescent);
        assert!("annealing".parse::<Strategy>().is_err());
    }
}
