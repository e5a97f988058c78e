//! CART regression tree with multi-output leaves.
//!
//! # Design
//!
//! Array-based tree representation with node traversal: children are
//! indices into one `Vec<TreeNode>`, so a fitted tree serializes as a flat
//! list. Training is greedy top-down: at each node the split minimising the
//! summed squared error over all outputs is taken, among a (possibly random)
//! subset of features. Leaves store the mean of every output over their
//! training rows.
//!
//! Callers that mix outputs on different scales (nanometres next to
//! arbitrary intensity units) should standardise them first; the forest
//! does.

use serde::{Deserialize, Serialize};

use super::rng::SimpleRng;

/// A node in the regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Feature index to split on (`None` for leaf nodes).
    pub feature: Option<usize>,
    /// Split threshold (features <= threshold go left).
    pub threshold: f64,
    /// Index of left child (unused for leaves).
    pub left: usize,
    /// Index of right child (unused for leaves).
    pub right: usize,
    /// Mean of each output over the node's training rows.
    pub value: Vec<f64>,
    /// Training rows that reached this node (bootstrap duplicates counted).
    n_samples: usize,
}

impl TreeNode {
    /// Returns `true` if this node is a leaf (no children).
    pub fn is_leaf(&self) -> bool {
        self.feature.is_none()
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features tried at each split.
    pub max_features: usize,
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    n_outputs: usize,
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [Vec<f64>],
    params: TreeParams,
    n_features: usize,
    n_outputs: usize,
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Fit a tree on the rows of `x`/`y` listed in `rows` (duplicates allowed,
    /// which is how bootstrap samples are passed in).
    ///
    /// `x` rows must all have the same length, as must `y` rows; `rows`
    /// must be non-empty.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[Vec<f64>],
        rows: &[usize],
        params: &TreeParams,
        rng: &mut SimpleRng,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let n_outputs = y.first().map_or(0, Vec::len);
        let mut builder = Builder {
            x,
            y,
            params: TreeParams {
                max_features: params.max_features.clamp(1, n_features.max(1)),
                ..*params
            },
            n_features,
            n_outputs,
            nodes: Vec::new(),
        };
        builder.grow(rows.to_vec(), 0, rng);

        Self {
            nodes: builder.nodes,
            n_features,
            n_outputs,
        }
    }

    /// Predict all outputs for a single sample.
    ///
    /// Traverses from root to leaf. Missing trailing features read as 0.0.
    pub fn predict(&self, features: &[f64]) -> &[f64] {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let Some(feature) = node.feature else {
                return &node.value;
            };
            let feat_val = features.get(feature).copied().unwrap_or(0.0);
            idx = if feat_val <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }

    /// Number of nodes in the tree.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Tree depth (longest root-to-leaf path).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.node_depth(0)
    }

    /// Check that a deserialized tree can be walked for `n_features`
    /// inputs and yields `n_outputs` values.
    ///
    /// Children must come after their parent, which rules out cycles.
    pub(crate) fn check_shape(&self, n_features: usize, n_outputs: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        if self.n_features != n_features || self.n_outputs != n_outputs {
            return Err(format!(
                "tree expects {} features and {} outputs, model has {n_features} and {n_outputs}",
                self.n_features, self.n_outputs
            ));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.value.len() != n_outputs {
                return Err(format!(
                    "node {idx} holds {} values, expected {n_outputs}",
                    node.value.len()
                ));
            }
            if let Some(feature) = node.feature {
                let in_range = |child: usize| child > idx && child < self.nodes.len();
                if feature >= n_features || !in_range(node.left) || !in_range(node.right) {
                    return Err(format!("node {idx} has an invalid split"));
                }
            }
        }
        Ok(())
    }

    fn node_depth(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return 0;
        }
        1 + self.node_depth(node.left).max(self.node_depth(node.right))
    }
}

impl Builder<'_> {
    /// Grow the subtree for `rows` and return its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize, rng: &mut SimpleRng) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode {
            feature: None,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: self.mean(&rows),
            n_samples: rows.len(),
        });

        let depth_left = self.params.max_depth.map_or(true, |max| depth < max);
        let splittable = rows.len() >= self.params.min_samples_split
            && rows.len() >= 2 * self.params.min_samples_leaf;
        if !depth_left || !splittable {
            return idx;
        }

        let Some(split) = self.best_split(&rows, rng) else {
            return idx;
        };
        drop(rows);

        let left = self.grow(split.left, depth + 1, rng);
        let right = self.grow(split.right, depth + 1, rng);
        let node = &mut self.nodes[idx];
        node.feature = Some(split.feature);
        node.threshold = split.threshold;
        node.left = left;
        node.right = right;
        idx
    }

    fn mean(&self, rows: &[usize]) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_outputs];
        for &r in rows {
            for (s, v) in sums.iter_mut().zip(&self.y[r]) {
                *s += v;
            }
        }
        let n = rows.len().max(1) as f64;
        sums.iter().map(|s| s / n).collect()
    }

    /// Squared error of a group given per-output sums and sums of squares.
    fn sse(sum: &[f64], sum_sq: &[f64], n: usize) -> f64 {
        let n = n as f64;
        sum.iter()
            .zip(sum_sq)
            .map(|(s, sq)| (sq - s * s / n).max(0.0))
            .sum()
    }

    fn best_split(&self, rows: &[usize], rng: &mut SimpleRng) -> Option<Split> {
        let n = rows.len();
        let k = self.n_outputs;
        let min_leaf = self.params.min_samples_leaf;

        let mut total = vec![0.0; k];
        let mut total_sq = vec![0.0; k];
        for &r in rows {
            for (o, &v) in self.y[r].iter().enumerate() {
                total[o] += v;
                total_sq[o] += v * v;
            }
        }
        let parent_sse = Self::sse(&total, &total_sq, n);
        if parent_sse <= f64::EPSILON {
            return None;
        }

        let mut candidates: Vec<usize> = (0..self.n_features).collect();
        if self.params.max_features < self.n_features {
            rng.shuffle(&mut candidates);
            candidates.truncate(self.params.max_features);
        }

        // (sse, feature, threshold)
        let mut best: Option<(f64, usize, f64)> = None;
        let mut order = rows.to_vec();
        let mut left_sum = vec![0.0; k];
        let mut left_sq = vec![0.0; k];
        let mut right_sum = vec![0.0; k];
        let mut right_sq = vec![0.0; k];

        for &f in &candidates {
            order.sort_by(|&a, &b| self.x[a][f].total_cmp(&self.x[b][f]));
            left_sum.iter_mut().for_each(|v| *v = 0.0);
            left_sq.iter_mut().for_each(|v| *v = 0.0);

            for i in 0..n - 1 {
                for (o, &v) in self.y[order[i]].iter().enumerate() {
                    left_sum[o] += v;
                    left_sq[o] += v * v;
                }
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let lo = self.x[order[i]][f];
                let hi = self.x[order[i + 1]][f];
                if hi <= lo {
                    continue;
                }

                for o in 0..k {
                    right_sum[o] = total[o] - left_sum[o];
                    right_sq[o] = total_sq[o] - left_sq[o];
                }
                let sse = Self::sse(&left_sum, &left_sq, n_left)
                    + Self::sse(&right_sum, &right_sq, n_right);

                if best.map_or(true, |(b, _, _)| sse < b) {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some((sse, f, threshold));
                }
            }
        }

        let (sse, feature, threshold) = best?;
        if sse >= parent_sse - 1e-12 * parent_sse.max(1.0) {
            return None;
        }

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.x[r][feature] <= threshold);
        Some(Split {
            feature,
            threshold,
            left,
            right,
        })
    }
}
