use crate::constants::CYCLE_MIN_AUTOCORRELATION;
use crate::errors::ExplainError;
use crate::utils::mean;
use serde::{Deserialize, Serialize};

/// A repeating pattern in one feature's weight history.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Cycle {
    /// Period in number of observations.
    pub lag: usize,
    pub autocorrelation: f64,
}

/// How one feature's weight moved over the observed history.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct FeatureTrend {
    pub feature: String,
    /// Least squares slope per observation.
    pub slope: f64,
    /// Mean absolute difference between successive observations.
    pub volatility: f64,
    pub cycle: Option<Cycle>,
}

/// Trend, volatility, and cycles of saliency weights over time.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct TemporalAnalysis {
    /// Number of weight vectors analyzed, the current one included.
    pub observations: usize,
    pub trends: Vec<FeatureTrend>,
}

impl TemporalAnalysis {
    /// Analyze a history of weight vectors, oldest first.
    ///
    /// * `features` - Feature names, one per weight.
    /// * `history` - Weight vectors, each as long as `features`.
    pub fn from_history(features: &[String], history: &[Vec<f64>]) -> Result<Self, ExplainError> {
        if let Some(row) = history.iter().find(|h| h.len() != features.len()) {
            return Err(ExplainError::InvalidConfiguration(format!(
                "weight history entry has {} values, expected {}.",
                row.len(),
                features.len()
            )));
        }
        let trends = features
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let series: Vec<f64> = history.iter().map(|h| h[j]).collect();
                let slope = trend_slope(&series);
                FeatureTrend {
                    feature: name.clone(),
                    slope,
                    volatility: volatility(&series),
                    cycle: detect_cycle(&detrend(&series, slope)),
                }
            })
            .collect();
        Ok(TemporalAnalysis {
            observations: history.len(),
            trends,
        })
    }

    pub fn trend(&self, feature: &str) -> Option<&FeatureTrend> {
        self.trends.iter().find(|t| t.feature == feature)
    }
}

/// Least squares slope of `series` against its index.
pub fn trend_slope(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let t_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(series);
    let (num, den) = series.iter().enumerate().fold((0.0, 0.0), |(num, den), (t, y)| {
        let dt = t as f64 - t_mean;
        (num + dt * (y - y_mean), den + dt * dt)
    });
    num / den
}

pub fn volatility(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    series.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (series.len() - 1) as f64
}

fn detrend(series: &[f64], slope: f64) -> Vec<f64> {
    series.iter().enumerate().map(|(t, y)| y - slope * t as f64).collect()
}

/// Lag in `1..=len/2` with the largest autocorrelation, if it clears the threshold.
pub fn detect_cycle(series: &[f64]) -> Option<Cycle> {
    let n = series.len();
    let m = mean(series);
    let var: f64 = series.iter().map(|y| (y - m) * (y - m)).sum();
    if n < 4 || var <= f64::EPSILON {
        return None;
    }
    let mut best: Option<Cycle> = None;
    for lag in 1..=n / 2 {
        let cov: f64 = (0..n - lag).map(|t| (series[t] - m) * (series[t + lag] - m)).sum();
        let autocorrelation = cov / var;
        if best.map_or(true, |b| autocorrelation > b.autocorrelation) {
            best = Some(Cycle { lag, autocorrelation });
        }
    }
    best.filter(|c| c.autocorrelation > CYCLE_MIN_AUTOCORRELATION)
}
