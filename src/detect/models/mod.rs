//! Outlier-scoring models used by the ensemble.

pub mod ecod;
pub mod iforest;
pub mod stats;

pub use self::ecod::Ecod;
pub use self::iforest::IsolationForest;

use crate::detect::{DetectError, FeatureVector};

/// A batch outlier model refit on every window.
///
/// Implementations must return larger scores for more anomalous rows and be
/// deterministic for identical input.
pub trait OutlierModel: Send {
    fn name(&self) -> &'static str;

    /// Fit on a window-by-feature matrix.
    fn fit(&mut self, matrix: &[FeatureVector]) -> Result<(), DetectError>;

    /// Score each row against the last fit.
    fn score(&self, rows: &[FeatureVector]) -> Result<Vec<f64>, DetectError>;
}

/// Reject matrices no model can learn from. Returns the feature count.
pub fn validate_matrix(matrix: &[FeatureVector]) -> Result<usize, DetectError> {
    let dims = matrix
        .first()
        .map(|row| row.len())
        .ok_or(DetectError::DegenerateWindow { distinct: 0 })?;

    for row in matrix {
        if row.len() != dims {
            return Err(DetectError::DimensionMismatch {
                expected: dims,
                got: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(DetectError::NonFiniteInput);
        }
    }

    let distinct = count_distinct(matrix);
    if distinct < 2 {
        return Err(DetectError::DegenerateWindow { distinct });
    }
    Ok(dims)
}

/// Check rows to be scored against the fitted feature count.
pub(crate) fn check_rows(rows: &[FeatureVector], dims: usize) -> Result<(), DetectError> {
    for row in rows {
        if row.len() != dims {
            return Err(DetectError::DimensionMismatch {
                expected: dims,
                got: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(DetectError::NonFiniteInput);
        }
    }
    Ok(())
}

fn count_distinct(matrix: &[FeatureVector]) -> usize {
    let mut seen: Vec<&FeatureVector> = Vec::with_capacity(matrix.len());
    for row in matrix {
        if !seen.iter().any(|s| *s == row) {
            seen.push(row);
        }
    }
    seen.len()
}
