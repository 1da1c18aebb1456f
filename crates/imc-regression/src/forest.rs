//! Random forest regression.
//!
//! Multi-output CART trees grown on bootstrap resamples, splitting on the
//! weighted sum of squared errors summed over outputs. Trees are grown in
//! parallel; each tree draws from its own generator derived from the forest
//! seed, so a fit is reproducible regardless of thread scheduling.
//!
//! Sample weights multiply the bootstrap counts, so a zero weight removes a
//! sample from every tree.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::regressor::{check_features, check_training_set, Regressor, RegressionError};

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Fraction(f64),
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self, nr_features: usize) -> usize {
        let k = match *self {
            MaxFeatures::All => nr_features,
            MaxFeatures::Sqrt => (nr_features as f64).sqrt().round() as usize,
            MaxFeatures::Fraction(f) => (f * nr_features as f64).round() as usize,
            MaxFeatures::Count(k) => k,
        };
        k.clamp(1, nr_features.max(1))
    }
}

/// Hyperparameters of a forest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 10,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            seed: 0,
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> Result<(), RegressionError> {
        if self.n_estimators == 0 {
            return Err(RegressionError::InvalidHyperparameter(
                "n_estimators must be at least 1".into(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(RegressionError::InvalidHyperparameter(
                "min_samples_leaf must be at least 1".into(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(RegressionError::InvalidHyperparameter(
                "min_samples_split must be at least 2".into(),
            ));
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(RegressionError::InvalidHyperparameter(format!(
                    "max_features fraction {} not in (0, 1]",
                    f
                )));
            }
        }
        Ok(())
    }

    /// Fit a forest to `x` (samples × features) and `y` (samples × outputs).
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        weights: Option<ArrayView1<'_, f64>>,
    ) -> Result<RandomForest, RegressionError> {
        self.validate()?;
        check_training_set(x, y, weights)?;
        let sample_weights: Vec<f64> = match weights {
            Some(w) => w.to_vec(),
            None => vec![1.0; x.nrows()],
        };
        if !(sample_weights.iter().sum::<f64>() > 0.0) {
            return Err(RegressionError::InvalidHyperparameter(
                "sample weights sum to zero".into(),
            ));
        }

        let builder = TreeBuilder {
            x,
            y,
            params: self,
            max_features: self.max_features.resolve(x.ncols()),
        };
        let trees: Vec<Tree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(self.seed, t));
                builder.build(&sample_weights, &mut rng)
            })
            .collect();

        log::debug!(
            "Fitted forest: {} trees, {} samples, {} features, {} outputs",
            trees.len(),
            x.nrows(),
            x.ncols(),
            y.ncols()
        );

        Ok(RandomForest {
            params: *self,
            nr_features: x.ncols(),
            nr_outputs: y.ncols(),
            trees,
        })
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_value(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max = max.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[id] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max
    }
}

struct Split {
    feature: usize,
    threshold: f64,
}

/// Bootstrap draws per tree before falling back to the unsampled weights.
const MAX_BOOTSTRAP_DRAWS: usize = 32;

struct TreeBuilder<'p, 'x, 'y> {
    x: ArrayView2<'x, f64>,
    y: ArrayView2<'y, f64>,
    params: &'p RandomForestParams,
    max_features: usize,
}

impl TreeBuilder<'_, '_, '_> {
    /// Sample weights of one tree. A bootstrap draw that misses every
    /// positively weighted row is redrawn.
    fn tree_weights(&self, sample_weights: &[f64], rng: &mut StdRng) -> Vec<f64> {
        if !self.params.bootstrap {
            return sample_weights.to_vec();
        }
        let n = sample_weights.len();
        for _ in 0..MAX_BOOTSTRAP_DRAWS {
            let mut counts = vec![0u32; n];
            for _ in 0..n {
                counts[rng.random_range(0..n)] += 1;
            }
            let w: Vec<f64> = sample_weights
                .iter()
                .zip(counts)
                .map(|(wi, c)| wi * c as f64)
                .collect();
            if w.iter().sum::<f64>() > 0.0 {
                return w;
            }
        }
        log::debug!("Bootstrap kept no weighted sample; using all samples");
        sample_weights.to_vec()
    }

    fn build(&self, sample_weights: &[f64], rng: &mut StdRng) -> Tree {
        let n = self.x.nrows();
        let w = self.tree_weights(sample_weights, rng);
        let root: Vec<usize> = (0..n).filter(|&i| w[i] > 0.0).collect();

        let mut nodes = vec![Node::Leaf {
            value: self.mean(&root, &w),
        }];
        let mut work = vec![(0usize, root, 0usize)];
        while let Some((id, indices, depth)) = work.pop() {
            if !self.may_split(indices.len(), depth) {
                continue;
            }
            let Some(split) = self.best_split(&indices, &w, rng) else {
                continue;
            };
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| self.x[[i, split.feature]] <= split.threshold);

            let left_id = nodes.len();
            nodes.push(Node::Leaf {
                value: self.mean(&left, &w),
            });
            let right_id = nodes.len();
            nodes.push(Node::Leaf {
                value: self.mean(&right, &w),
            });
            nodes[id] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_id,
                right: right_id,
            };
            work.push((left_id, left, depth + 1));
            work.push((right_id, right, depth + 1));
        }
        Tree { nodes }
    }

    fn may_split(&self, nr_samples: usize, depth: usize) -> bool {
        if self.params.max_depth.is_some_and(|d| depth >= d) {
            return false;
        }
        nr_samples >= self.params.min_samples_split
            && nr_samples >= 2 * self.params.min_samples_leaf
    }

    fn mean(&self, indices: &[usize], w: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.y.ncols()];
        let mut total = 0.0;
        for &i in indices {
            total += w[i];
            for (a, v) in acc.iter_mut().zip(self.y.row(i)) {
                *a += w[i] * v;
            }
        }
        if total > 0.0 {
            acc.iter_mut().for_each(|a| *a /= total);
        }
        acc
    }

    /// Split minimising the weighted squared error of both children, over a
    /// random subset of features. `None` if the node is pure or no feature
    /// separates it.
    fn best_split(&self, indices: &[usize], w: &[f64], rng: &mut StdRng) -> Option<Split> {
        let nr_outputs = self.y.ncols();
        let min_leaf = self.params.min_samples_leaf;

        let mut total_w = 0.0;
        let mut sum = vec![0.0; nr_outputs];
        let mut sum_sq = vec![0.0; nr_outputs];
        for &i in indices {
            total_w += w[i];
            for (k, v) in self.y.row(i).iter().enumerate() {
                sum[k] += w[i] * v;
                sum_sq[k] += w[i] * v * v;
            }
        }
        let parent: f64 = (0..nr_outputs)
            .map(|k| sum_sq[k] - sum[k] * sum[k] / total_w)
            .sum();
        if parent <= 1e-12 * total_w {
            return None;
        }

        let mut best: Option<Split> = None;
        let mut best_sse = parent * (1.0 - 1e-12);
        let features = sample_indices(rng, self.x.ncols(), self.max_features).into_vec();
        let mut order = indices.to_vec();
        let mut left_sum = vec![0.0; nr_outputs];
        let mut left_sq = vec![0.0; nr_outputs];

        for feature in features {
            let col = self.x.column(feature);
            order.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
            left_sum.iter_mut().for_each(|v| *v = 0.0);
            left_sq.iter_mut().for_each(|v| *v = 0.0);
            let mut left_w = 0.0;

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left_w += w[i];
                for (k, v) in self.y.row(i).iter().enumerate() {
                    left_sum[k] += w[i] * v;
                    left_sq[k] += w[i] * v * v;
                }
                let nr_left = pos + 1;
                if nr_left < min_leaf {
                    continue;
                }
                if order.len() - nr_left < min_leaf {
                    break;
                }
                let (xv, xn) = (col[i], col[order[pos + 1]]);
                if xn <= xv {
                    continue;
                }
                let right_w = total_w - left_w;
                if left_w <= 0.0 || right_w <= 0.0 {
                    continue;
                }
                let sse: f64 = (0..nr_outputs)
                    .map(|k| {
                        let rs = sum[k] - left_sum[k];
                        let rq = sum_sq[k] - left_sq[k];
                        (left_sq[k] - left_sum[k] * left_sum[k] / left_w) + (rq - rs * rs / right_w)
                    })
                    .sum();
                if sse < best_sse {
                    best_sse = sse;
                    let mid = 0.5 * (xv + xn);
                    best = Some(Split {
                        feature,
                        threshold: if mid >= xn { xv } else { mid },
                    });
                }
            }
        }
        best
    }
}

/// A fitted random forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: RandomForestParams,
    nr_features: usize,
    nr_outputs: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn nr_trees(&self) -> usize {
        self.trees.len()
    }

    /// Deepest tree in the forest.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut acc = vec![0.0; self.nr_outputs];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.leaf_value(row)) {
                *a += v;
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn nr_features(&self) -> usize {
        self.nr_features
    }

    fn nr_outputs(&self) -> usize {
        self.nr_outputs
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError> {
        check_features(x, self.nr_features)?;
        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(x.row(i)))
            .collect();
        Array2::from_shape_vec((x.nrows(), self.nr_outputs), rows.concat())
            .map_err(|e| RegressionError::ShapeMismatch(e.to_string()))
    }
}
