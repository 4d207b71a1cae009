//! CART-style regression tree with variance-reduction splits

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_one(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict_one(row)
                } else {
                    right.predict_one(row)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; None means all
    pub max_features: Option<usize>,
    pub seed: u64,
    root: Option<TreeNode>,
}

impl RegressionTree {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
            root: None,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(
            params,
            &["max_depth", "min_samples_split", "min_samples_leaf", "max_features"],
        );
        let mut tree = Self::new(param_usize(params, "max_depth", 10)?);
        tree.min_samples_split = param_usize(params, "min_samples_split", 2)?.max(2);
        tree.min_samples_leaf = param_usize(params, "min_samples_leaf", 1)?.max(1);
        if let Some(v) = params.get("max_features") {
            if !v.is_null() {
                tree.max_features = Some(param_usize(params, "max_features", 0)?);
            }
        }
        Ok(tree)
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map(|r| r.depth()).unwrap_or(0)
    }

    pub(crate) fn fit_indices(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(EmbedError::TrainingError("empty dataset".to_string()));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.root = Some(self.build_node(x, y, indices, 0, &mut rng));
        Ok(())
    }

    fn build_node(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64;

        if depth >= self.max_depth
            || indices.len() < self.min_samples_split
            || indices.len() < 2 * self.min_samples_leaf
        {
            return TreeNode::Leaf { value: mean };
        }

        let features = self.candidate_features(x.ncols(), rng);
        let best = self.best_split(x, y, indices, &features);

        let Some(split) = best else {
            return TreeNode::Leaf { value: mean };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        if left_idx.len() < self.min_samples_leaf || right_idx.len() < self.min_samples_leaf {
            return TreeNode::Leaf { value: mean };
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build_node(x, y, &left_idx, depth + 1, rng)),
            right: Box::new(self.build_node(x, y, &right_idx, depth + 1, rng)),
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k > 0 && k < n_features => {
                let mut all: Vec<usize> = (0..n_features).collect();
                all.shuffle(rng);
                all.truncate(k);
                all
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Scan features in parallel, maintaining running sums so each
    /// candidate threshold is evaluated in O(1).
    fn best_split(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n;

        let best = features
            .par_iter()
            .filter_map(|&feature| {
                let mut sorted: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
                sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let mut left_sum = 0.0;
                let mut left_sq = 0.0;
                let mut best_for_feature: Option<SplitCandidate> = None;

                for i in 0..sorted.len() - 1 {
                    let (value, target) = sorted[i];
                    left_sum += target;
                    left_sq += target * target;

                    let next_value = sorted[i + 1].0;
                    if next_value <= value {
                        continue;
                    }

                    let n_left = (i + 1) as f64;
                    let n_right = n - n_left;
                    if (n_left as usize) < self.min_samples_leaf
                        || (n_right as usize) < self.min_samples_leaf
                    {
                        continue;
                    }

                    let right_sum = total_sum - left_sum;
                    let right_sq = total_sq - left_sq;
                    let sse = (left_sq - left_sum * left_sum / n_left)
                        + (right_sq - right_sum * right_sum / n_right);
                    let gain = parent_sse - sse;

                    if gain > 1e-12
                        && best_for_feature.map(|b| gain > b.score).unwrap_or(true)
                    {
                        best_for_feature = Some(SplitCandidate {
                            feature,
                            threshold: (value + next_value) / 2.0,
                            score: gain,
                        });
                    }
                }

                best_for_feature
            })
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

        best
    }
}

impl Estimator for RegressionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(EmbedError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_indices(x.view(), y.view(), &indices)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(EmbedError::ModelNotFitted)?;
        Ok(Array1::from_iter(
            x.outer_iter().map(|row| root.predict_one(row)),
        ))
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("max_depth".to_string(), serde_json::json!(self.max_depth));
        map.insert(
            "min_samples_split".to_string(),
            serde_json::json!(self.min_samples_split),
        );
        map.insert(
            "min_samples_leaf".to_string(),
            serde_json::json!(self.min_samples_leaf),
        );
        map.insert(
            "max_features".to_string(),
            match self.max_features {
                Some(k) => serde_json::json!(k),
                None => Value::Null,
            },
        );
        map
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_step_function_split() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];

        let mut tree = RegressionTree::new(3);
        tree.fit(&x, &y).unwrap();

        let preds = tree.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_depth_zero_is_mean() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];

        let mut tree = RegressionTree::new(0);
        tree.fit(&x, &y).unwrap();

        let preds = tree.predict(&array![[99.0]]).unwrap();
        assert!((preds[0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 10.0, 10.0];

        let mut tree = RegressionTree::new(10);
        tree.min_samples_leaf = 3;
        tree.fit(&x, &y).unwrap();

        // No legal split leaves 3 per side, so the tree is a single leaf
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_constant_target_single_leaf() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![7.0, 7.0, 7.0, 7.0];

        let mut tree = RegressionTree::new(5);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), 1);
    }
}
