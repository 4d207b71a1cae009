//! K-nearest neighbors regression

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{param_str, param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnWeights {
    Uniform,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnnMetric {
    Euclidean,
    Manhattan,
}

/// Distance paired with the neighbor's target, ordered so a max-heap
/// keeps the k smallest distances seen so far.
#[derive(Debug, Clone, Copy)]
struct DistTarget {
    dist: f64,
    target: f64,
}

impl PartialEq for DistTarget {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist
    }
}

impl Eq for DistTarget {}

impl PartialOrd for DistTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.partial_cmp(&other.dist).unwrap_or(Ordering::Equal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnRegressor {
    pub n_neighbors: usize,
    pub weights: KnnWeights,
    pub metric: KnnMetric,
    train_x: Option<Array2<f64>>,
    train_y: Option<Array1<f64>>,
}

impl KnnRegressor {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            weights: KnnWeights::Uniform,
            metric: KnnMetric::Euclidean,
            train_x: None,
            train_y: None,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(params, &["n_neighbors", "weights", "metric", "p"]);
        let mut model = Self::new(param_usize(params, "n_neighbors", 5)?);
        if model.n_neighbors == 0 {
            return Err(EmbedError::InvalidInput(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        model.weights = match param_str(params, "weights", "uniform")? {
            "uniform" => KnnWeights::Uniform,
            "distance" => KnnWeights::Distance,
            other => {
                return Err(EmbedError::InvalidInput(format!(
                    "unknown KNN weights: {}",
                    other
                )))
            }
        };
        model.metric = match param_str(params, "metric", "euclidean")? {
            "euclidean" | "minkowski" | "l2" => KnnMetric::Euclidean,
            "manhattan" | "cityblock" | "l1" => KnnMetric::Manhattan,
            other => {
                return Err(EmbedError::InvalidInput(format!(
                    "unknown KNN metric: {}",
                    other
                )))
            }
        };
        Ok(model)
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.metric {
            KnnMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            KnnMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
        }
    }

    /// O(n log k) scan keeping the k nearest in a bounded max-heap
    fn find_k_nearest(&self, query: &[f64], x: &Array2<f64>, y: &Array1<f64>) -> Vec<DistTarget> {
        let k = self.n_neighbors.min(x.nrows());
        let mut heap: BinaryHeap<DistTarget> = BinaryHeap::with_capacity(k + 1);

        for (row, &target) in x.outer_iter().zip(y.iter()) {
            let dist = match row.as_slice() {
                Some(s) => self.distance(query, s),
                None => self.distance(query, &row.to_vec()),
            };
            if heap.len() < k {
                heap.push(DistTarget { dist, target });
            } else if let Some(top) = heap.peek() {
                if dist < top.dist {
                    heap.pop();
                    heap.push(DistTarget { dist, target });
                }
            }
        }

        heap.into_sorted_vec()
    }

    fn aggregate(&self, neighbors: &[DistTarget]) -> f64 {
        if neighbors.is_empty() {
            return 0.0;
        }
        match self.weights {
            KnnWeights::Uniform => {
                neighbors.iter().map(|n| n.target).sum::<f64>() / neighbors.len() as f64
            }
            KnnWeights::Distance => {
                // Exact match short-circuits to that neighbor's target
                if let Some(exact) = neighbors.iter().find(|n| n.dist < 1e-12) {
                    return exact.target;
                }
                let mut num = 0.0;
                let mut den = 0.0;
                for n in neighbors {
                    let w = 1.0 / n.dist;
                    num += w * n.target;
                    den += w;
                }
                num / den
            }
        }
    }
}

impl Estimator for KnnRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(EmbedError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(EmbedError::TrainingError("empty dataset".to_string()));
        }
        self.train_x = Some(x.to_owned());
        self.train_y = Some(y.to_owned());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let train_x = self.train_x.as_ref().ok_or(EmbedError::ModelNotFitted)?;
        let train_y = self.train_y.as_ref().ok_or(EmbedError::ModelNotFitted)?;

        let queries: Vec<Vec<f64>> = x.outer_iter().map(|r| r.to_vec()).collect();
        let preds: Vec<f64> = queries
            .par_iter()
            .map(|q| {
                let neighbors = self.find_k_nearest(q, train_x, train_y);
                self.aggregate(&neighbors)
            })
            .collect();

        Ok(Array1::from_vec(preds))
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("n_neighbors".to_string(), serde_json::json!(self.n_neighbors));
        map.insert(
            "weights".to_string(),
            Value::String(
                match self.weights {
                    KnnWeights::Uniform => "uniform",
                    KnnWeights::Distance => "distance",
                }
                .to_string(),
            ),
        );
        map.insert(
            "metric".to_string(),
            Value::String(
                match self.metric {
                    KnnMetric::Euclidean => "euclidean",
                    KnnMetric::Manhattan => "manhattan",
                }
                .to_string(),
            ),
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
    fn test_single_neighbor_memorizes() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![10.0, 20.0, 30.0, 40.0];

        let mut model = KnnRegressor::new(1);
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uniform_average() {
        let x = array![[0.0], [1.0], [10.0]];
        let y = array![2.0, 4.0, 100.0];

        let mut model = KnnRegressor::new(2);
        model.fit(&x, &y).unwrap();

        // Query at 0.5: two nearest are 0.0 and 1.0
        let pred = model.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting_prefers_closer() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 10.0];

        let mut model = KnnRegressor::new(2);
        model.weights = KnnWeights::Distance;
        model.fit(&x, &y).unwrap();

        // Query at 0.2 is four times closer to the first point
        let pred = model.predict(&array![[0.2]]).unwrap();
        assert!(pred[0] < 5.0);
    }

    #[test]
    fn test_k_larger_than_dataset() {
        let x = array![[0.0], [1.0]];
        let y = array![1.0, 3.0];

        let mut model = KnnRegressor::new(10);
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[0.5]]).unwrap();
        assert!((pred[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let mut params = Map::new();
        params.insert("n_neighbors".to_string(), serde_json::json!(0));
        assert!(KnnRegressor::from_params(&params).is_err());
    }
}
