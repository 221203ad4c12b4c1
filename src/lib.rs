mod constants;

// Modules
pub mod attribution;
pub mod binning;
pub mod cache;
pub mod counterfactual;
pub mod distance;
pub mod errors;
pub mod features;
pub mod lime;
pub mod predictor;
pub mod random;
pub mod regression;
pub mod saliency;
pub mod sampler;
pub mod shapley;
pub mod utils;

// Individual classes, and functions
pub use attribution::{AttributionResult, Direction, ExplanationIO, FeatureAttribution};
pub use cache::AttributionCache;
pub use counterfactual::{
    Counterfactual, CounterfactualConfig, CounterfactualOutcome, CounterfactualSearcher, SearchStatus, Strategy,
};
pub use distance::DistanceMetric;
pub use errors::{ExplainError, PredictionError};
pub use features::{FeatureBounds, FeatureDomain, FeatureVector};
pub use lime::{LimeConfig, LimeExplainer, LimeExplanation};
pub use predictor::{Prediction, Predictor};
pub use random::RandomSource;
pub use saliency::{AttentionPattern, BaselineStrategy, SaliencyAnalyzer, SaliencyConfig, SaliencyReport};
pub use shapley::{ShapleyAttributor, ShapleyConfig};
