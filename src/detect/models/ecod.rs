//! Empirical-CDF outlier detection.
//!
//! Each feature is treated independently: a value far into either tail of its
//! column's empirical distribution contributes `-ln(tail probability)`. Left,
//! right and skew-selected tail sums are computed and the largest is the score.

use crate::detect::models::stats::Column;
use crate::detect::models::{check_rows, validate_matrix, OutlierModel};
use crate::detect::{DetectError, FeatureVector};

#[derive(Debug, Clone)]
struct FittedColumn {
    column: Column,
    left_skewed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Ecod {
    columns: Vec<FittedColumn>,
}

impl Ecod {
    pub fn new() -> Self {
        Self::default()
    }

    fn score_row(&self, row: &[f64]) -> f64 {
        let mut o_left = 0.0;
        let mut o_right = 0.0;
        let mut o_auto = 0.0;
        for (fitted, &x) in self.columns.iter().zip(row) {
            let u_left = -fitted.column.left_tail(x).ln();
            let u_right = -fitted.column.right_tail(x).ln();
            o_left += u_left;
            o_right += u_right;
            o_auto += if fitted.left_skewed { u_left } else { u_right };
        }
        o_left.max(o_right).max(o_auto)
    }
}

impl OutlierModel for Ecod {
    fn name(&self) -> &'static str {
        "ecod"
    }

    fn fit(&mut self, matrix: &[FeatureVector]) -> Result<(), DetectError> {
        let dims = validate_matrix(matrix)?;
        self.columns = (0..dims)
            .map(|j| {
                let column = Column::new(matrix.iter().map(|row| row[j]).collect());
                let left_skewed = column.skewness() < 0.0;
                FittedColumn { column, left_skewed }
            })
            .collect();
        Ok(())
    }

    fn score(&self, rows: &[FeatureVector]) -> Result<Vec<f64>, DetectError> {
        if self.columns.is_empty() {
            return Err(DetectError::NotFitted { model: self.name() });
        }
        check_rows(rows, self.columns.len())?;
        Ok(rows.iter().map(|row| self.score_row(row)).collect())
    }
}
