use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::detect::models::{Ecod, IsolationForest, OutlierModel};
use crate::detect::{DetectError, FeatureVector};

/// How the two model scores combine into one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleRule {
    #[default]
    Max,
    Mean,
}

impl EnsembleRule {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            EnsembleRule::Max => a.max(b),
            EnsembleRule::Mean => (a + b) / 2.0,
        }
    }
}

impl std::fmt::Display for EnsembleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleRule::Max => write!(f, "max"),
            EnsembleRule::Mean => write!(f, "mean"),
        }
    }
}

impl std::str::FromStr for EnsembleRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(EnsembleRule::Max),
            "mean" => Ok(EnsembleRule::Mean),
            other => Err(format!("unknown ensemble rule '{other}' (expected max or mean)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleScore {
    pub ecod: f64,
    pub iforest: f64,
    pub combined: f64,
}

/// Refits both models on the window and scores its newest row.
pub struct EnsembleScorer {
    ecod: Box<dyn OutlierModel>,
    iforest: Box<dyn OutlierModel>,
    rule: EnsembleRule,
}

impl EnsembleScorer {
    /// Build a scorer from an injected model pair. The first model fills the
    /// `score_ecod` slot of each result and the second `score_iforest`.
    pub fn new(
        ecod: Box<dyn OutlierModel>,
        iforest: Box<dyn OutlierModel>,
        rule: EnsembleRule,
    ) -> Self {
        Self { ecod, iforest, rule }
    }

    pub fn with_default_models(rule: EnsembleRule) -> Self {
        Self::new(
            Box::new(Ecod::new()),
            Box::new(IsolationForest::default()),
            rule,
        )
    }

    /// Score the last row of `matrix` after refitting on the whole matrix.
    pub fn score_latest(&mut self, matrix: &[FeatureVector]) -> Result<EnsembleScore, DetectError> {
        let latest = matrix
            .last()
            .ok_or(DetectError::DegenerateWindow { distinct: 0 })?;
        let rows = std::slice::from_ref(latest);

        let ecod = fit_and_score(self.ecod.as_mut(), matrix, rows)?;
        let iforest = fit_and_score(self.iforest.as_mut(), matrix, rows)?;
        let combined = self.rule.combine(ecod, iforest);
        trace!(ecod, iforest, combined, rule = %self.rule, "ensemble scored");

        Ok(EnsembleScore {
            ecod,
            iforest,
            combined,
        })
    }
}

fn fit_and_score(
    model: &mut dyn OutlierModel,
    matrix: &[FeatureVector],
    rows: &[FeatureVector],
) -> Result<f64, DetectError> {
    model.fit(matrix)?;
    let scores = model.score(rows)?;
    match scores.first() {
        Some(s) if s.is_finite() => Ok(*s),
        Some(s) => Err(DetectError::Model {
            model: model.name(),
            reason: format!("non-finite score {s}"),
        }),
        None => Err(DetectError::Model {
            model: model.name(),
            reason: "no score returned".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed score regardless of input.
    struct Fixed(f64);

    impl OutlierModel for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn fit(&mut self, _matrix: &[FeatureVector]) -> Result<(), DetectError> {
            Ok(())
        }
        fn score(&self, rows: &[FeatureVector]) -> Result<Vec<f64>, DetectError> {
            Ok(vec![self.0; rows.len()])
        }
    }

    struct Failing;

    impl OutlierModel for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn fit(&mut self, _matrix: &[FeatureVector]) -> Result<(), DetectError> {
            Err(DetectError::DegenerateWindow { distinct: 1 })
        }
        fn score(&self, _rows: &[FeatureVector]) -> Result<Vec<f64>, DetectError> {
            Ok(vec![0.0])
        }
    }

    fn window() -> Vec<FeatureVector> {
        vec![vec![1.0], vec![2.0]]
    }

    #[test]
    fn test_combine_rules() {
        assert_eq!(EnsembleRule::Max.combine(2.0, 5.0), 5.0);
        assert_eq!(EnsembleRule::Mean.combine(2.0, 5.0), 3.5);
    }

    #[test]
    fn test_scorer_combines_model_pair() {
        let mut max = EnsembleScorer::new(Box::new(Fixed(2.0)), Box::new(Fixed(5.0)), EnsembleRule::Max);
        let s = max.score_latest(&window()).unwrap();
        assert_eq!((s.ecod, s.iforest, s.combined), (2.0, 5.0, 5.0));

        let mut mean =
            EnsembleScorer::new(Box::new(Fixed(2.0)), Box::new(Fixed(5.0)), EnsembleRule::Mean);
        assert_eq!(mean.score_latest(&window()).unwrap().combined, 3.5);
    }

    #[test]
    fn test_fit_failure_is_surfaced() {
        let mut scorer = EnsembleScorer::new(Box::new(Failing), Box::new(Fixed(1.0)), EnsembleRule::Max);
        assert!(matches!(
            scorer.score_latest(&window()),
            Err(DetectError::DegenerateWindow { .. })
        ));
    }

    #[test]
    fn test_non_finite_score_rejected() {
        let mut scorer =
            EnsembleScorer::new(Box::new(Fixed(f64::NAN)), Box::new(Fixed(1.0)), EnsembleRule::Max);
        assert!(matches!(
            scorer.score_latest(&window()),
            Err(DetectError::Model { model: "fixed", .. })
        ));
    }

    #[test]
    fn test_default_models_score_window() {
        let mut scorer = EnsembleScorer::with_default_models(EnsembleRule::Max);
        let m = vec![
            vec![10.0, 40.0],
            vec![11.0, 41.0],
            vec![10.5, 39.0],
            vec![10.2, 40.5],
            vec![80.0, 95.0],
        ];
        let s = scorer.score_latest(&m).unwrap();
        assert!(s.ecod > 0.0);
        assert!(s.iforest > 0.0 && s.iforest <= 1.0);
        assert_eq!(s.combined, s.ecod.max(s.iforest));
    }

    #[test]
    fn test_rule_parse() {
        assert_eq!("Mean".parse::<EnsembleRule>().unwrap(), EnsembleRule::Mean);
        assert!("median".parse::<EnsembleRule>().is_err());
    }
}
