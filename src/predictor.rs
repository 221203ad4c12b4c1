//! Predictor
//!
//! The scoring contract every engine consumes, and the bounded thread pool used to
//! fan predict calls out in parallel.
use crate::errors::{ExplainError, PredictionError};
use crate::features::FeatureVector;
use log::warn;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Output of the external scorer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Prediction {
    /// Overall confidence score.
    pub overall: f64,
    /// Per-dimension sub-scores.
    #[serde(default)]
    pub dimensions: HashMap<String, f64>,
}

impl Prediction {
    pub fn new(overall: f64) -> Self {
        Prediction {
            overall,
            dimensions: HashMap::new(),
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: f64) -> Self {
        self.dimensions.insert(name.into(), value);
        self
    }
}

/// An opaque scoring function.
///
/// Implementations must be callable from several threads at once; every call
/// receives its own, locally owned feature vector.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, PredictionError>;
}

impl<F> Predictor for F
where
    F: Fn(&FeatureVector) -> Result<Prediction, PredictionError> + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, PredictionError> {
        self(features)
    }
}

/// Thread pool bounding how many predict calls run at once.
pub struct PredictPool {
    pool: ThreadPool,
    timeout: Option<f32>,
}

impl PredictPool {
    /// * `num_threads` - Maximum concurrent predict calls, `None` for one per core.
    /// * `timeout` - Seconds a single predict call may take before it counts as failed.
    pub fn new(num_threads: Option<usize>, timeout: Option<f32>) -> Result<Self, ExplainError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .build()
            .map_err(|e| ExplainError::InvalidConfiguration(e.to_string()))?;
        Ok(PredictPool { pool, timeout })
    }

    /// Score one instance, enforcing the timeout and a finite overall score.
    pub fn predict_one(
        &self,
        predictor: &dyn Predictor,
        features: &FeatureVector,
    ) -> Result<Prediction, PredictionError> {
        let start = Instant::now();
        let prediction = predictor.predict(features)?;
        if let Some(t) = self.timeout {
            if start.elapsed().as_secs_f32() > t {
                return Err(PredictionError::Timeout(t));
            }
        }
        if !prediction.overall.is_finite() {
            return Err(PredictionError::NonFinite(prediction.overall));
        }
        Ok(prediction)
    }

    /// Score every instance in parallel. Results keep the order of `batch`.
    pub fn predict_all(
        &self,
        predictor: &dyn Predictor,
        batch: &[FeatureVector],
    ) -> Vec<Result<Prediction, PredictionError>> {
        self.pool
            .install(|| batch.par_iter().map(|fv| self.predict_one(predictor, fv)).collect())
    }

    /// Full predictions of every instance, `None` where the call failed.
    ///
    /// The first failure is logged, the rest only counted.
    pub fn predictions(
        &self,
        predictor: &dyn Predictor,
        batch: &[FeatureVector],
    ) -> (Vec<Option<Prediction>>, usize) {
        let mut failed = 0;
        let predictions = self
            .predict_all(predictor, batch)
            .into_iter()
            .map(|r| match r {
                Ok(p) => Some(p),
                Err(e) => {
                    if failed == 0 {
                        warn!("Excluding sample after a failed predict call: {}", e);
                    }
                    failed += 1;
                    None
                }
            })
            .collect();
        (predictions, failed)
    }

    /// Overall scores of every instance, `None` where the call failed.
    pub fn scores(&self, predictor: &dyn Predictor, batch: &[FeatureVector]) -> (Vec<Option<f64>>, usize) {
        let (predictions, failed) = self.predictions(predictor, batch);
        let scores = predictions.into_iter().map(|p| p.map(|p| p.overall)).collect();
        (scores, failed)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_predictor(fv: &FeatureVector) -> Result<Prediction, PredictionError> {
        let s: f64 = fv.values().iter().sum();
        if s < 0.0 {
            Err(PredictionError::Failed("negative".to_string()))
        } else {
            Ok(Prediction::new(s).with_dimension("half", s / 2.0))
        }
    }

    #[test]
    fn test_predict_all_keeps_order_and_isolates_failures() {
        let pool = PredictPool::new(Some(2), None).unwrap();
        let base = FeatureVector::from_pairs([("a", 1.0), ("b", 2.0)]).unwrap();
        let batch: Vec<FeatureVector> = (0..20)
            .map(|i| base.with_values(vec![i as f64 - 5.0, 0.0]))
            .collect();
        let (scores, failed) = pool.scores(&sum_predictor, &batch);
        assert_eq!(failed, 5);
        for (i, s) in scores.iter().enumerate() {
            if i < 5 {
                assert!(s.is_none());
            } else {
                assert_eq!(*s, Some(i as f64 - 5.0));
            }
        }
        let p = pool.predict_one(&sum_predictor, &base).unwrap();
        assert_eq!(p.dimensions["half"], 1.5);
    }

    #[test]
    fn test_non_finite_is_failure() {
        let pool = PredictPool::new(Some(1), None).unwrap();
        let fv = FeatureVector::from_pairs([("a", 1.0)]).unwrap();
        let nan = |_: &FeatureVector| -> Result<Prediction, PredictionError> { Ok(Prediction::new(f64::NAN)) };
        assert!(matches!(pool.predict_one(&nan, &fv), Err(PredictionError::NonFinite(_))));
    }

    #[test]
    fn test_timeout_is_failure() {
        let pool = PredictPool::new(Some(1), Some(0.0)).unwrap();
        let fv = FeatureVector::from_pairs([("a", 1.0)]).unwrap();
        let slow = |_: &FeatureVector| -> Result<Prediction, PredictionError> {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Prediction::new(1.0))
        };
        assert!(matches!(pool.predict_one(&slow, &fv), Err(PredictionError::Timeout(_))));
    }
}
