//! Isolation forest.
//!
//! Anomalies are isolated by fewer random axis-aligned splits than normal
//! points. The score is `2^(-E[h(x)] / c(psi))`, so it lies in `(0, 1]` and
//! grows as the average path length shrinks.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::detect::models::{check_rows, validate_matrix, OutlierModel};
use crate::detect::{DetectError, FeatureVector};

const DEFAULT_TREES: usize = 200;
const DEFAULT_MAX_SAMPLES: usize = 256;
const DEFAULT_SEED: u64 = 42;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_trees: usize,
    max_samples: usize,
    seed: u64,
    dims: usize,
    sample_size: usize,
    trees: Vec<Node>,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(DEFAULT_TREES, DEFAULT_MAX_SAMPLES, DEFAULT_SEED)
    }
}

impl IsolationForest {
    pub fn new(n_trees: usize, max_samples: usize, seed: u64) -> Self {
        Self {
            n_trees: n_trees.max(1),
            max_samples: max_samples.max(2),
            seed,
            dims: 0,
            sample_size: 0,
            trees: Vec::new(),
        }
    }

    fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
        match node {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let next = if row[*feature] < *threshold { left } else { right };
                Self::path_length(next, row, depth + 1)
            }
        }
    }
}

/// Average unsuccessful-search path length in a binary search tree of `n` nodes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn build_tree(
    matrix: &[FeatureVector],
    indices: &[usize],
    depth: usize,
    height_limit: usize,
    dims: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // Features that still vary within this node.
    let mut splittable: Vec<(usize, f64, f64)> = Vec::with_capacity(dims);
    for feature in 0..dims {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &i in indices {
            let v = matrix[i][feature];
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo < hi {
            splittable.push((feature, lo, hi));
        }
    }
    if splittable.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .copied()
        .partition(|&i| matrix[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(matrix, &left, depth + 1, height_limit, dims, rng)),
        right: Box::new(build_tree(matrix, &right, depth + 1, height_limit, dims, rng)),
    }
}

impl OutlierModel for IsolationForest {
    fn name(&self) -> &'static str {
        "iforest"
    }

    fn fit(&mut self, matrix: &[FeatureVector]) -> Result<(), DetectError> {
        let dims = validate_matrix(matrix)?;
        // Split thresholds are drawn uniformly from each column's span.
        for feature in 0..dims {
            let (lo, hi) = matrix.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                (lo.min(row[feature]), hi.max(row[feature]))
            });
            if !(hi - lo).is_finite() {
                return Err(DetectError::Model {
                    model: self.name(),
                    reason: format!("feature {feature} spans more than f64 can represent"),
                });
            }
        }
        let n = matrix.len();
        let psi = n.min(self.max_samples);
        let height_limit = (psi as f64).log2().ceil() as usize;

        // Re-seeded per fit so identical windows produce identical forests.
        let mut rng = StdRng::seed_from_u64(self.seed);
        let trees = (0..self.n_trees)
            .map(|_| {
                let sample = index::sample(&mut rng, n, psi).into_vec();
                build_tree(matrix, &sample, 0, height_limit, dims, &mut rng)
            })
            .collect();

        self.dims = dims;
        self.sample_size = psi;
        self.trees = trees;
        Ok(())
    }

    fn score(&self, rows: &[FeatureVector]) -> Result<Vec<f64>, DetectError> {
        if self.trees.is_empty() {
            return Err(DetectError::NotFitted { model: self.name() });
        }
        check_rows(rows, self.dims)?;

        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 {
            return Err(DetectError::Model {
                model: self.name(),
                reason: format!("sample size {} too small to normalise", self.sample_size),
            });
        }

        Ok(rows
            .iter()
            .map(|row| {
                let total: f64 = self
                    .trees
                    .iter()
                    .map(|tree| Self::path_length(tree, row, 0))
                    .sum();
                let mean_depth = total / self.trees.len() as f64;
                2f64.powf(-mean_depth / norm)
            })
            .collect())
    }
}
