//! Gradient-boosted regression trees
//!
//! Least-squares boosting of shallow CART trees. Fitting is deterministic:
//! every split is chosen by exhaustive search, no subsampling.

use super::Regressor;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Boosting hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting stages
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Shrinkage applied to each tree's contribution
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Maximum depth of each tree
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum samples a node needs before it may be split
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
}

fn default_n_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_max_depth() -> usize {
    3
}

fn default_min_samples_split() -> usize {
    2
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
        }
    }
}

/// Tree node in array representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A single least-squares regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], max_depth: usize, min_samples_split: usize) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        let indices: Vec<usize> = (0..y.len()).collect();
        tree.build(x, y, &indices, 0, max_depth, min_samples_split);
        tree
    }

    fn build(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        min_samples_split: usize,
    ) -> usize {
        let node_index = self.nodes.len();
        let value = mean(indices.iter().map(|&i| y[i]));
        self.nodes.push(TreeNode::Leaf { value });

        if depth >= max_depth || indices.len() < min_samples_split.max(2) {
            return node_index;
        }
        let Some((feature, threshold)) = best_split(x, y, indices) else {
            return node_index;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().copied().partition(|&i| x[i][feature] <= threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return node_index;
        }

        let left = self.build(x, y, &left_idx, depth + 1, max_depth, min_samples_split);
        let right = self.build(x, y, &right_idx, depth + 1, max_depth, min_samples_split);
        self.nodes[node_index] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_index
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Split maximizing the reduction in squared error, as (feature, threshold)
fn best_split(x: &[Vec<f64>], y: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
    let n = indices.len() as f64;
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let num_features = x[indices[0]].len();

    // Maximizing sum_l^2/n_l + sum_r^2/n_r minimizes the children's SSE
    let parent_score = total_sum * total_sum / n;
    let mut best: Option<(usize, f64, f64)> = None;

    for feature in 0..num_features {
        let mut order: Vec<usize> = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[a][feature]
                .partial_cmp(&x[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        for (k, pair) in order.windows(2).enumerate() {
            left_sum += y[pair[0]];
            let (lo, hi) = (x[pair[0]][feature], x[pair[1]][feature]);
            if hi - lo <= f64::EPSILON * lo.abs().max(1.0) {
                continue;
            }
            let left_n = (k + 1) as f64;
            let right_n = n - left_n;
            let right_sum = total_sum - left_sum;
            let score = left_sum * left_sum / left_n + right_sum * right_sum / right_n;
            if score > parent_score + 1e-12 && best.map_or(true, |(_, _, s)| score > s) {
                best = Some((feature, (lo + hi) / 2.0, score));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Boosted ensemble with a constant initial prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    config: BoostingConfig,
    init: Option<f64>,
    num_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            init: None,
            num_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.init.is_some()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(BoostingConfig::default())
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ForecastError::Model(format!(
                "cannot fit on {} feature rows and {} targets",
                x.len(),
                y.len()
            )));
        }
        let num_features = x[0].len();
        if num_features == 0 || x.iter().any(|row| row.len() != num_features) {
            return Err(ForecastError::Model(
                "feature rows must share a non-zero width".to_string(),
            ));
        }
        if self.config.learning_rate <= 0.0 {
            return Err(ForecastError::Model(format!(
                "learning rate {} must be positive",
                self.config.learning_rate
            )));
        }

        let init = mean(y.iter().copied());
        let mut current = vec![init; y.len()];
        let mut trees = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let tree = RegressionTree::fit(
                x,
                &residuals,
                self.config.max_depth,
                self.config.min_samples_split,
            );
            for (pred, row) in current.iter_mut().zip(x) {
                *pred += self.config.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);
        }

        self.init = Some(init);
        self.num_features = num_features;
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let init = self
            .init
            .ok_or_else(|| ForecastError::Model("regressor has not been fitted".to_string()))?;
        x.iter()
            .map(|row| {
                if row.len() != self.num_features {
                    return Err(ForecastError::Model(format!(
                        "expected {} features, got {}",
                        self.num_features,
                        row.len()
                    )));
                }
                Ok(init
                    + self
                        .trees
                        .iter()
                        .map(|t| self.config.learning_rate * t.predict_row(row))
                        .sum::<f64>())
            })
            .collect()
    }
}
