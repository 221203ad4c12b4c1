//! Features
//!
//! Feature vectors handed to the scorer, the per-feature domain they must stay in,
//! and domain-constrained clamping of synthetic values.
use crate::errors::ExplainError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Ordered mapping of feature name to numeric value.
///
/// Names are shared behind an `Arc`, so the many pseudo-instances an explanation
/// builds only copy their values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Create a feature vector.
    ///
    /// * `names` - Unique feature names.
    /// * `values` - Finite values, one per name.
    pub fn new(names: Vec<String>, values: Vec<f64>) -> Result<Self, ExplainError> {
        if names.len() != values.len() {
            return Err(ExplainError::InvalidConfiguration(format!(
                "{} feature names but {} values provided.",
                names.len(),
                values.len()
            )));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for n in &names {
            if !seen.insert(n.as_str()) {
                return Err(ExplainError::InvalidConfiguration(format!("Duplicate feature name {}.", n)));
            }
        }
        if let Some((n, v)) = names.iter().zip(values.iter()).find(|(_, v)| !v.is_finite()) {
            return Err(ExplainError::InvalidParameter(
                n.to_string(),
                "a finite value".to_string(),
                v.to_string(),
            ));
        }
        Ok(FeatureVector {
            names: names.into(),
            values,
        })
    }

    /// Create a feature vector from `(name, value)` pairs, keeping their order.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ExplainError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<f64>) = pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        FeatureVector::new(names, values)
    }

    /// A vector with the same names and new values.
    ///
    /// Callers construct `values` from this vector, so the length always matches.
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), self.values.len());
        FeatureVector {
            names: Arc::clone(&self.names),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn value(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Value of the feature called `name`, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.values[i])
    }

    /// True when both vectors describe the same features in the same order.
    pub fn same_features(&self, other: &FeatureVector) -> bool {
        Arc::ptr_eq(&self.names, &other.names) || self.names == other.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names.iter().map(|n| n.as_str()).zip(self.values.iter().copied())
    }
}

/// Declared domain of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    /// Smallest allowed value.
    pub min: f64,
    /// Largest allowed value.
    pub max: f64,
    /// Values are rounded to whole numbers after clamping.
    #[serde(default)]
    pub integer: bool,
    /// Counterfactual searches must never change this feature.
    #[serde(default)]
    pub immutable: bool,
}

impl FeatureBounds {
    pub fn new(min: f64, max: f64) -> Self {
        FeatureBounds {
            min,
            max,
            integer: false,
            immutable: false,
        }
    }

    /// Bounds for a feature with no declared domain: a span of `max(|v|, 1)` on
    /// either side of the observed value, always containing zero.
    pub fn around(value: f64) -> Self {
        let span = value.abs().max(1.0);
        FeatureBounds::new((value - span).min(0.0), (value + span).max(0.0))
    }

    pub fn range(&self) -> f64 {
        (self.max - self.min).max(f64::EPSILON)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let v = if value.is_nan() { self.min } else { value.clamp(self.min, self.max) };
        if self.integer {
            // Rounding can step outside fractional bounds, pull it back in.
            let r = v.round();
            let r = if r > self.max {
                r - 1.0
            } else if r < self.min {
                r + 1.0
            } else {
                r
            };
            // Bounds without a whole number in them keep the unrounded value.
            if self.contains(r) {
                r
            } else {
                v
            }
        } else {
            v
        }
    }

    /// Whether a whole number lies within the bounds.
    pub fn has_integer(&self) -> bool {
        self.min.ceil() <= self.max.floor()
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Per-feature domain declarations, keyed by feature name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureDomain {
    pub bounds: HashMap<String, FeatureBounds>,
}

impl FeatureDomain {
    pub fn new() -> Self {
        FeatureDomain::default()
    }

    /// Declare `[min, max]` bounds for a feature.
    pub fn set_bounds(mut self, name: impl Into<String>, min: f64, max: f64) -> Self {
        let entry = self
            .bounds
            .entry(name.into())
            .or_insert_with(|| FeatureBounds::new(min, max));
        entry.min = min;
        entry.max = max;
        self
    }

    /// Mark a feature as integer valued. Undeclared features get bounds at resolve time.
    pub fn set_integer(mut self, name: &str) -> Self {
        self.bounds
            .entry(name.to_string())
            .or_insert_with(|| FeatureBounds::new(f64::NEG_INFINITY, f64::INFINITY))
            .integer = true;
        self
    }

    /// Mark a feature as immutable. Undeclared features get bounds at resolve time.
    pub fn set_immutable(mut self, name: &str) -> Self {
        self.bounds
            .entry(name.to_string())
            .or_insert_with(|| FeatureBounds::new(f64::NEG_INFINITY, f64::INFINITY))
            .immutable = true;
        self
    }

    /// Check that every declared domain is a valid, finite interval.
    pub fn validate(&self) -> Result<(), ExplainError> {
        for (name, b) in &self.bounds {
            let declared = b.min.is_finite() || b.max.is_finite();
            if declared && !(b.min.is_finite() && b.max.is_finite() && b.min <= b.max) {
                return Err(ExplainError::InvalidParameter(
                    format!("bounds of {}", name),
                    "finite min <= max".to_string(),
                    format!("[{}, {}]", b.min, b.max),
                ));
            }
            if declared && b.integer && !b.has_integer() {
                return Err(ExplainError::InvalidParameter(
                    format!("bounds of {}", name),
                    "an interval containing a whole number for an integer feature".to_string(),
                    format!("[{}, {}]", b.min, b.max),
                ));
            }
        }
        Ok(())
    }

    /// Align the declared domain with the features of `instance`.
    pub fn resolve(&self, instance: &FeatureVector) -> FeatureSpace {
        let bounds = instance
            .iter()
            .map(|(name, value)| match self.bounds.get(name) {
                Some(b) if b.min.is_finite() && b.max.is_finite() => *b,
                Some(b) => FeatureBounds {
                    integer: b.integer,
                    immutable: b.immutable,
                    ..FeatureBounds::around(value)
                },
                None => FeatureBounds::around(value),
            })
            .collect();
        FeatureSpace { bounds }
    }

    /// Like [`resolve`](FeatureDomain::resolve), but fails when `instance` itself
    /// lies outside its declared domain.
    pub fn resolve_checked(&self, instance: &FeatureVector) -> Result<FeatureSpace, ExplainError> {
        let space = self.resolve(instance);
        for (j, (name, value)) in instance.iter().enumerate() {
            let b = space.bounds(j);
            if !b.contains(value) {
                return Err(ExplainError::InvalidConfiguration(format!(
                    "feature {} has value {} outside its domain [{}, {}].",
                    name, value, b.min, b.max
                )));
            }
        }
        Ok(space)
    }
}

/// Feature domain resolved against one instance, indexed like its feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    bounds: Vec<FeatureBounds>,
}

impl FeatureSpace {
    pub fn from_bounds(bounds: Vec<FeatureBounds>) -> Self {
        FeatureSpace { bounds }
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn bounds(&self, idx: usize) -> &FeatureBounds {
        &self.bounds[idx]
    }

    pub fn range(&self, idx: usize) -> f64 {
        self.bounds[idx].range()
    }

    pub fn clamp(&self, idx: usize, value: f64) -> f64 {
        self.bounds[idx].clamp(value)
    }

    /// Clamp every value into its domain in place.
    pub fn clamp_all(&self, values: &mut [f64]) {
        values
            .iter_mut()
            .zip(self.bounds.iter())
            .for_each(|(v, b)| *v = b.clamp(*v));
    }

    pub fn contains_all(&self, values: &[f64]) -> bool {
        values.iter().zip(self.bounds.iter()).all(|(v, b)| b.contains(*v))
    }

    /// Map a raw value onto `[0, 1]` within its domain.
    pub fn normalize(&self, idx: usize, value: f64) -> f64 {
        let b = &self.bounds[idx];
        (value - b.min) / b.range()
    }

    /// Inverse of [`normalize`](FeatureSpace::normalize), without clamping.
    pub fn denormalize(&self, idx: usize, unit: f64) -> f64 {
        let b = &self.bounds[idx];
        b.min + unit * b.range()
    }

    pub fn is_mutable(&self, idx: usize) -> bool {
        !self.bounds[idx].immutable
    }

    pub fn mutable_indices(&self) -> Vec<usize> {
        (0..self.bounds.len()).filter(|i| self.is_mutable(*i)).collect()
    }

    /// Midpoint of every domain.
    pub fn midpoints(&self) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| b.clamp(b.min + 0.5 * (b.max - b.min)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_validation() {
        assert!(FeatureVector::new(vec!["a".to_string()], vec![1.0, 2.0]).is_err());
        assert!(FeatureVector::from_pairs([("a", 1.0), ("a", 2.0)]).is_err());
        assert!(FeatureVector::from_pairs([("a", f64::NAN)]).is_err());
        let fv = FeatureVector::from_pairs([("a", 1.0), ("b", 2.0)]).unwrap();
        assert_eq!(fv.get("b"), Some(2.0));
        assert_eq!(fv.index_of("c"), None);
        let other = fv.with_values(vec![3.0, 4.0]);
        assert!(fv.same_features(&other));
        assert_eq!(other.value(0), 3.0);
    }

    #[test]
    fn test_clamp_integer_and_bounds() {
        let mut b = FeatureBounds::new(0.0, 10.0);
        assert_eq!(b.clamp(-3.0), 0.0);
        assert_eq!(b.clamp(12.0), 10.0);
        assert_eq!(b.clamp(f64::NAN), 0.0);
        b.integer = true;
        assert_eq!(b.clamp(3.6), 4.0);
        let frac = FeatureBounds {
            integer: true,
            ..FeatureBounds::new(0.2, 2.4)
        };
        assert_eq!(frac.clamp(2.45), 2.0);
        assert_eq!(frac.clamp(0.0), 1.0);

        let space = FeatureSpace::from_bounds(vec![FeatureBounds::new(0.0, 1.0), frac]);
        let mut values = vec![1.5, 0.0];
        space.clamp_all(&mut values);
        assert_eq!(values, vec![1.0, 1.0]);
        assert!(space.contains_all(&values));
    }

    #[test]
    fn test_resolve_defaults_contain_zero() {
        let fv = FeatureVector::from_pairs([("len", 300.0), ("neg", -5.0), ("cat", 0.0)]).unwrap();
        let domain = FeatureDomain::new()
            .set_bounds("cat", 0.0, 10.0)
            .set_integer("cat")
            .set_immutable("neg");
        domain.validate().unwrap();
        let space = domain.resolve(&fv);
        assert_eq!(space.bounds(0), &FeatureBounds::new(0.0, 600.0));
        assert!(space.bounds(1).contains(0.0) && space.bounds(1).contains(-5.0));
        assert!(!space.is_mutable(1));
        assert!(space.bounds(2).integer);
        assert_eq!(space.mutable_indices(), vec![0, 2]);
        assert!((space.normalize(0, 150.0) - 0.25).abs() < 1e-12);
        assert!((space.denormalize(0, 0.25) - 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_domain() {
        let domain = FeatureDomain::new().set_bounds("x", 5.0, 1.0);
        assert!(domain.validate().is_err());
    }

    #[test]
    fn test_integer_bounds_without_whole_number() {
        let narrow = FeatureBounds {
            integer: true,
            ..FeatureBounds::new(0.2, 0.8)
        };
        assert!(!narrow.has_integer());
        assert_eq!(narrow.clamp(0.9), 0.8);
        assert_eq!(narrow.clamp(0.1), 0.2);
        assert_eq!(narrow.clamp(0.5), 0.5);
        assert!(narrow.contains(narrow.clamp(0.7)));

        let domain = FeatureDomain::new().set_bounds("ratio", 0.2, 0.8).set_integer("ratio");
        assert!(matches!(domain.validate(), Err(ExplainError::InvalidParameter(..))));
        assert!(FeatureDomain::new()
            .set_bounds("count", 0.2, 1.8)
            .set_integer("count")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_integer_flag_on_undeclared_feature() {
        let fv = FeatureVector::from_pairs([("count", 3.0), ("size", 2.5)]).unwrap();
        // Flags may be set before or without bounds.
        let domain = FeatureDomain::new().set_integer("count").set_bounds("size", 0.0, 10.0).set_integer("size");
        domain.validate().unwrap();
        let space = domain.resolve(&fv);
        assert!(space.bounds(0).integer);
        assert!(space.bounds(0).contains(3.0));
        assert_eq!(space.clamp(0, 2.4), 2.0);
        assert_eq!(space.bounds(1), &FeatureBounds { integer: true, ..FeatureBounds::new(0.0, 10.0) });
    }

    #[test]
    fn test_resolve_checked_rejects_outside_instance() {
        let domain = FeatureDomain::new().set_bounds("contentLength", 0.0, 5000.0);
        let inside = FeatureVector::from_pairs([("contentLength", 5000.0), ("categoryCount", 0.0)]).unwrap();
        assert!(domain.resolve_checked(&inside).is_ok());

        let outside = FeatureVector::from_pairs([("contentLength", 5200.0), ("categoryCount", 0.0)]).unwrap();
        match domain.resolve_checked(&outside) {
            Err(ExplainError::InvalidConfiguration(msg)) => assert!(msg.contains("contentLength"), "{}", msg),
            other => panic!("expected an invalid configuration, got {:?}", other),
        }
    }
}
