use std::collections::VecDeque;

/// Rolling history of ensemble scores with a nearest-rank percentile cutoff.
#[derive(Debug, Clone)]
pub struct PercentileThreshold {
    history: VecDeque<f64>,
    capacity: usize,
}

impl PercentileThreshold {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a score, evicting the oldest beyond capacity.
    pub fn update(&mut self, score: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(score);
    }

    /// Nearest-rank percentile of the current history.
    ///
    /// The rank is `round(pct/100 * (len-1))` with ties rounded to even,
    /// clamped to the history bounds. An empty history yields `+inf` so
    /// nothing can exceed it.
    pub fn percentile(&self, pct: f64) -> f64 {
        if self.history.is_empty() {
            return f64::INFINITY;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let last = sorted.len() - 1;
        let rank = ((pct / 100.0) * last as f64).round_ties_even();
        let idx = if rank.is_nan() || rank <= 0.0 {
            0
        } else {
            (rank as usize).min(last)
        };
        sorted[idx]
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_never_exceeded() {
        let t = PercentileThreshold::new(5);
        let thr = t.percentile(98.0);
        assert!(thr.is_infinite() && thr > 0.0);
        assert!(!(f64::MAX > thr));
    }

    #[test]
    fn test_percentile_is_a_history_member() {
        let mut t = PercentileThreshold::new(100);
        for v in [0.3, 7.1, 2.2, 9.9, 4.4, 1.0, 5.5] {
            t.update(v);
        }
        for pct in [0.0, 12.5, 33.0, 50.0, 67.0, 90.0, 98.0, 100.0] {
            let p = t.percentile(pct);
            assert!(t.history.contains(&p), "pct {pct} gave {p}");
        }
        assert_eq!(t.percentile(0.0), 0.3);
        assert_eq!(t.percentile(100.0), 9.9);
    }

    #[test]
    fn test_rank_ties_round_to_even() {
        let mut t = PercentileThreshold::new(10);
        t.update(2.0);
        t.update(1.0);
        // 0.5 * 1 = 0.5 rounds to rank 0
        assert_eq!(t.percentile(50.0), 1.0);

        t.update(3.0);
        t.update(4.0);
        // 0.5 * 3 = 1.5 rounds to rank 2
        assert_eq!(t.percentile(50.0), 3.0);
    }

    #[test]
    fn test_percentile_clamped() {
        let mut t = PercentileThreshold::new(3);
        t.update(1.0);
        t.update(2.0);
        assert_eq!(t.percentile(250.0), 2.0);
        assert_eq!(t.percentile(-10.0), 1.0);
    }

    #[test]
    fn test_history_capacity_evicts_oldest() {
        let mut t = PercentileThreshold::new(3);
        for v in [100.0, 1.0, 2.0, 3.0] {
            t.update(v);
        }
        assert_eq!(t.len(), 3);
        assert_eq!(t.percentile(100.0), 3.0);
    }
}
