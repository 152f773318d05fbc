/// One feature column of a fitted window, kept sorted for ECDF lookups.
#[derive(Debug, Clone)]
pub struct Column {
    sorted: Vec<f64>,
}

impl Column {
    pub fn new(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.total_cmp(b));
        Self { sorted: values }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.sorted.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.sorted.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Sample skewness `m3 / m2^1.5`; zero for a constant column.
    pub fn skewness(&self) -> f64 {
        let std = self.std_dev();
        if self.sorted.is_empty() || std == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let m3: f64 =
            self.sorted.iter().map(|&x| (x - mean).powi(3)).sum::<f64>() / self.sorted.len() as f64;
        m3 / std.powi(3)
    }

    /// Fraction of values `<= x`, floored at `1/n`.
    pub fn left_tail(&self, x: f64) -> f64 {
        let n = self.sorted.len();
        let count = self.sorted.partition_point(|&v| v <= x);
        count.max(1) as f64 / n as f64
    }

    /// Fraction of values `>= x`, floored at `1/n`.
    pub fn right_tail(&self, x: f64) -> f64 {
        let n = self.sorted.len();
        let count = n - self.sorted.partition_point(|&v| v < x);
        count.max(1) as f64 / n as f64
    }
}
