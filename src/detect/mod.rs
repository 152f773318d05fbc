//! Streaming anomaly detection: sliding window, ensemble scoring, adaptive
//! percentile threshold and sustain alarm, composed by [`DetectionPipeline`].

pub mod alarm;
pub mod ensemble;
pub mod models;
pub mod pipeline;
pub mod threshold;
pub mod window;

pub use self::ensemble::{EnsembleRule, EnsembleScore, EnsembleScorer};
pub use self::models::OutlierModel;
pub use self::pipeline::{DetectionPipeline, PipelineState};
pub use self::window::FeatureVector;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("window must hold at least 2 samples, got {window}")]
    WindowTooSmall { window: usize },

    #[error("baseline must hold at least 1 score")]
    EmptyBaseline,

    #[error("threshold percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f64),

    #[error("sustain alarm needs 1 <= k <= n, got k={required} n={lookback}")]
    SustainUnreachable { required: usize, lookback: usize },

    #[error("degenerate window: {distinct} distinct rows, need at least 2")]
    DegenerateWindow { distinct: usize },

    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("non-finite value in feature matrix")]
    NonFiniteInput,

    #[error("{model} scored before being fitted")]
    NotFitted { model: &'static str },

    #[error("{model} failed: {reason}")]
    Model { model: &'static str, reason: String },
}

impl DetectError {
    /// True for per-sample failures that leave the pipeline usable.
    pub fn is_scoring_failure(&self) -> bool {
        !matches!(
            self,
            DetectError::WindowTooSmall { .. }
                | DetectError::EmptyBaseline
                | DetectError::InvalidPercentile(_)
                | DetectError::SustainUnreachable { .. }
        )
    }
}

/// How a score is compared against the threshold in effect before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceedPolicy {
    /// `score > threshold`
    #[default]
    Strict,
    /// `score >= threshold`
    Inclusive,
}

impl ExceedPolicy {
    pub fn exceeds(self, score: f64, threshold: f64) -> bool {
        match self {
            ExceedPolicy::Strict => score > threshold,
            ExceedPolicy::Inclusive => score >= threshold,
        }
    }
}

impl std::str::FromStr for ExceedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" | ">" => Ok(ExceedPolicy::Strict),
            "inclusive" | ">=" => Ok(ExceedPolicy::Inclusive),
            other => Err(format!("unknown exceed policy '{other}' (expected strict or inclusive)")),
        }
    }
}

/// Per-sample detection output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    pub score_ecod: f64,
    pub score_iforest: f64,
    pub score_ens: f64,
    /// Threshold in effect before this sample's score entered the history.
    pub threshold: f64,
    pub exceed: bool,
    pub alarm: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceed_policies_at_boundary() {
        assert!(!ExceedPolicy::Strict.exceeds(3.0, 3.0));
        assert!(ExceedPolicy::Inclusive.exceeds(3.0, 3.0));
        assert!(!ExceedPolicy::Inclusive.exceeds(1e300, f64::INFINITY));
    }

    #[test]
    fn test_config_errors_are_not_scoring_failures() {
        assert!(!DetectError::EmptyBaseline.is_scoring_failure());
        assert!(DetectError::DegenerateWindow { distinct: 1 }.is_scoring_failure());
    }

    #[test]
    fn test_exceed_policy_parse() {
        assert_eq!("STRICT".parse::<ExceedPolicy>().unwrap(), ExceedPolicy::Strict);
        assert_eq!(">=".parse::<ExceedPolicy>().unwrap(), ExceedPolicy::Inclusive);
        assert!("loose".parse::<ExceedPolicy>().is_err());
    }
}
