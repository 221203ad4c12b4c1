//! Errors
//!
//! Custom error types used throughout the `lucent` crate.
use thiserror::Error;

/// Errors that can occur while building an explanation.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// Too many predict calls failed to form a valid regression or search.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    /// The surrogate regression could not be solved even with regularization.
    #[error("Unable to solve the surrogate regression: {0}")]
    SingularFit(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// Inputs that do not fit together, such as a baseline of the wrong length.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The one prediction an engine cannot do without failed.
    #[error("Prediction of the original instance failed: {0}")]
    PredictionFailed(#[from] PredictionError),
    /// Unable to serialize an explanation.
    #[error("Unable to write explanation: {0}")]
    UnableToWrite(String),
    /// Unable to deserialize an explanation.
    #[error("Unable to read explanation: {0}")]
    UnableToRead(String),
}

/// Errors returned by a [`Predictor`](crate::predictor::Predictor).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PredictionError {
    /// The scorer rejected or could not score the instance.
    #[error("Scorer failed: {0}")]
    Failed(String),
    /// The scorer answered, but slower than the allowed timeout (seconds).
    #[error("Scorer exceeded the {0} second timeout.")]
    Timeout(f32),
    /// The scorer returned a non-finite overall score.
    #[error("Scorer returned a non-finite score {0}.")]
    NonFinite(f64),
}
