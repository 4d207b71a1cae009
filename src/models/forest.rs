//! Random forest regression over bagged trees

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::tree::RegressionTree;
use super::{param_str, param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// "sqrt", "log2", "all", or a feature count as a string/number
    pub max_features: String,
    pub seed: u64,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize, max_depth: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: "sqrt".to_string(),
            seed,
            trees: Vec::new(),
        }
    }

    pub fn from_params(params: &Map<String, Value>, seed: u64) -> Result<Self> {
        warn_unknown_keys(
            params,
            &[
                "n_estimators",
                "max_depth",
                "min_samples_split",
                "min_samples_leaf",
                "max_features",
                "random_state",
            ],
        );
        let seed = params
            .get("random_state")
            .and_then(|v| v.as_u64())
            .unwrap_or(seed);
        let mut model = Self::new(
            param_usize(params, "n_estimators", 100)?,
            param_usize(params, "max_depth", 10)?,
            seed,
        );
        if model.n_estimators == 0 {
            return Err(EmbedError::InvalidInput(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        model.min_samples_split = param_usize(params, "min_samples_split", 2)?.max(2);
        model.min_samples_leaf = param_usize(params, "min_samples_leaf", 1)?.max(1);
        model.max_features = param_str(params, "max_features", "sqrt")?.to_string();
        Ok(model)
    }

}

/// Resolve a "sqrt"/"log2"/"all"/numeric max_features spec to a feature
/// count per split
pub(crate) fn resolve_max_features(spec: &str, n_features: usize) -> Result<Option<usize>> {
    match spec {
        "sqrt" | "auto" => Ok(Some((n_features as f64).sqrt().ceil() as usize)),
        "log2" => Ok(Some((n_features as f64).log2().ceil().max(1.0) as usize)),
        "all" | "none" => Ok(None),
        other => other
            .parse::<usize>()
            .map(Some)
            .map_err(|_| EmbedError::InvalidInput(format!("invalid max_features: {}", other))),
    }
}

impl Estimator for RandomForestRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(EmbedError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n == 0 {
            return Err(EmbedError::TrainingError("empty dataset".to_string()));
        }

        let max_features = resolve_max_features(&self.max_features, x.ncols())?;

        // Each tree gets a deterministic seed derived from the base
        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|idx| {
                let tree_seed = self.seed.wrapping_add(idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(tree_seed);
                let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

                let mut tree = RegressionTree::new(self.max_depth);
                tree.min_samples_split = self.min_samples_split;
                tree.min_samples_leaf = self.min_samples_leaf;
                tree.max_features = max_features;
                tree.seed = tree_seed;
                tree.fit_indices(x.view(), y.view(), &indices)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(EmbedError::ModelNotFitted);
        }

        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total = total + tree.predict(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("n_estimators".to_string(), serde_json::json!(self.n_estimators));
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
            Value::String(self.max_features.clone()),
        );
        map.insert("random_state".to_string(), serde_json::json!(self.seed));
        map
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn ramp_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 3.0 * i as f64);
        (x, y)
    }

    #[test]
    fn test_forest_fits_ramp() {
        let (x, y) = ramp_data(60);
        let mut model = RandomForestRegressor::new(20, 8, 42);
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 20.0, "pred {} vs {}", p, t);
        }
    }

    #[test]
    fn test_seed_determinism() {
        let (x, y) = ramp_data(40);

        let mut a = RandomForestRegressor::new(10, 6, 7);
        let mut b = RandomForestRegressor::new(10, 6, 7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        let pa = a.predict(&x).unwrap();
        let pb = b.predict(&x).unwrap();
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_random_state_param_overrides_seed() {
        let mut params = Map::new();
        params.insert("n_estimators".to_string(), serde_json::json!(5));
        params.insert("random_state".to_string(), serde_json::json!(123));
        let model = RandomForestRegressor::from_params(&params, 42).unwrap();
        assert_eq!(model.seed, 123);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = RandomForestRegressor::new(5, 3, 42);
        assert!(model.predict(&Array2::zeros((2, 1))).is_err());
    }
}
