//! Attribution
//!
//! Result types handed to downstream consumers, and JSON export for them.
use crate::errors::ExplainError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Sign of a contribution.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    /// Pushes the score up.
    Positive,
    /// Pushes the score down.
    Negative,
    /// No measurable effect.
    Neutral,
}

impl Direction {
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Direction::Positive
        } else if value < 0.0 {
            Direction::Negative
        } else {
            Direction::Neutral
        }
    }
}

/// Signed contribution of one feature.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FeatureAttribution {
    pub feature: String,
    pub contribution: f64,
    pub direction: Direction,
}

impl FeatureAttribution {
    pub fn new(feature: impl Into<String>, contribution: f64) -> Self {
        FeatureAttribution {
            feature: feature.into(),
            contribution,
            direction: Direction::of(contribution),
        }
    }
}

/// Sort attributions by absolute contribution, largest first. Ties keep their order.
pub fn rank_by_magnitude(attributions: &mut [FeatureAttribution]) {
    attributions.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(Ordering::Equal)
    });
}

/// Shapley attribution of one prediction.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct AttributionResult {
    /// Contributions in the order of the explained feature vector.
    pub contributions: Vec<FeatureAttribution>,
    /// Score of the baseline instance.
    pub baseline_value: f64,
    /// Score of the explained instance.
    pub prediction: f64,
    /// `prediction - baseline_value - sum(contributions)`.
    pub residual: f64,
    /// Whether `|residual|` is within the additivity tolerance.
    pub additive: bool,
    /// Coalitions evaluated, including the two anchors.
    pub samples: usize,
    /// Coalitions excluded because predict failed.
    pub failed_samples: usize,
    /// Every coalition was enumerated rather than sampled.
    pub exhaustive: bool,
}

impl AttributionResult {
    pub fn contribution(&self, feature: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|a| a.feature == feature)
            .map(|a| a.contribution)
    }

    pub fn total(&self) -> f64 {
        self.contributions.iter().map(|a| a.contribution).sum()
    }

    /// Attributions ranked by absolute contribution.
    pub fn attributions(&self) -> Vec<FeatureAttribution> {
        let mut ranked = self.contributions.clone();
        rank_by_magnitude(&mut ranked);
        ranked
    }

    pub fn top_k(&self, k: usize) -> Vec<FeatureAttribution> {
        self.attributions().into_iter().take(k).collect()
    }

    /// Absolute contribution per feature name, usable as counterfactual
    /// importance hints.
    pub fn importance(&self) -> HashMap<String, f64> {
        self.contributions
            .iter()
            .map(|a| (a.feature.clone(), a.contribution.abs()))
            .collect()
    }
}

/// JSON export of explanation results.
pub trait ExplanationIO: Serialize + DeserializeOwned + Sized {
    fn json_dump(&self) -> Result<String, ExplainError> {
        serde_json::to_string(self).map_err(|e| ExplainError::UnableToWrite(e.to_string()))
    }

    fn from_json(json_str: &str) -> Result<Self, ExplainError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ExplainError::UnableToRead(e.to_string()))
    }
}

impl ExplanationIO for AttributionResult {}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> AttributionResult {
        AttributionResult {
            contributions: vec![
                FeatureAttribution::new("a", 0.1),
                FeatureAttribution::new("b", -0.3),
                FeatureAttribution::new("c", 0.0),
            ],
            baseline_value: 0.2,
            prediction: 0.0,
            residual: 0.0,
            additive: true,
            samples: 8,
            failed_samples: 0,
            exhaustive: true,
        }
    }

    #[test]
    fn test_ranking_and_directions() {
        let r = result();
        let ranked = r.attributions();
        assert_eq!(ranked[0].feature, "b");
        assert_eq!(ranked[0].direction, Direction::Negative);
        assert_eq!(ranked[2].direction, Direction::Neutral);
        assert_eq!(r.top_k(1).len(), 1);
        assert!((r.total() + 0.2).abs() < 1e-12);
        assert_eq!(r.contribution("a"), Some(0.1));
        let importance = r.importance();
        assert_eq!(importance["b"], 0.3);
        assert_eq!(importance.len(), 3);
    }

    #[test]
    fn test_json_export() {
        let r = result();
        let json = r.json_dump().unwrap();
        let back = AttributionResult::from_json(&json).unwrap();
        assert_eq!(r, back);
        assert!(AttributionResult::from_json("{").is_err());
    }
}
