use std::collections::VecDeque;

/// One sample's numeric features, in a fixed column order.
pub type FeatureVector = Vec<f64>;

/// Fixed-capacity FIFO of the most recent feature vectors.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    rows: VecDeque<FeatureVector>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a vector, evicting the oldest once full.
    pub fn push(&mut self, vector: FeatureVector) {
        if self.rows.len() == self.capacity {
            self.rows.pop_front();
        }
        self.rows.push_back(vector);
    }

    pub fn is_ready(&self) -> bool {
        self.rows.len() == self.capacity
    }

    /// Current contents as a window-by-feature matrix, most recent last.
    pub fn as_matrix(&self) -> Vec<FeatureVector> {
        self.rows.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
