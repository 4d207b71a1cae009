//! Gradient boosting with shallow regression trees on residuals

use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::forest::resolve_max_features;
use super::tree::RegressionTree;
use super::{param_f64, param_str, param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled per boosting round
    pub subsample: f64,
    /// Features scanned per split: "sqrt", "log2", "all", or a count
    pub max_features: String,
    pub seed: u64,
    base_prediction: f64,
    trees: Vec<RegressionTree>,
    is_fitted: bool,
}

impl GradientBoostingRegressor {
    pub fn new(n_estimators: usize, learning_rate: f64, max_depth: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: "all".to_string(),
            seed,
            base_prediction: 0.0,
            trees: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn from_params(params: &Map<String, Value>, seed: u64) -> Result<Self> {
        warn_unknown_keys(
            params,
            &[
                "n_estimators",
                "learning_rate",
                "max_depth",
                "min_samples_split",
                "min_samples_leaf",
                "subsample",
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
            param_f64(params, "learning_rate", 0.1)?,
            param_usize(params, "max_depth", 3)?,
            seed,
        );
        if model.n_estimators == 0 {
            return Err(EmbedError::InvalidInput(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        model.min_samples_split = param_usize(params, "min_samples_split", 2)?.max(2);
        model.min_samples_leaf = param_usize(params, "min_samples_leaf", 1)?.max(1);
        model.subsample = param_f64(params, "subsample", 1.0)?;
        model.max_features = param_str(params, "max_features", "all")?.to_string();
        if model.subsample <= 0.0 || model.subsample > 1.0 {
            return Err(EmbedError::InvalidInput(format!(
                "subsample must be in (0, 1], got {}",
                model.subsample
            )));
        }
        Ok(model)
    }
}

impl Estimator for GradientBoostingRegressor {
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

        self.base_prediction = y.mean().unwrap_or(0.0);
        self.trees = Vec::with_capacity(self.n_estimators);
        let max_features = resolve_max_features(&self.max_features, x.ncols())?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut current = Array1::from_elem(n, self.base_prediction);
        let sample_size = ((n as f64 * self.subsample).round() as usize).clamp(1, n);

        for round in 0..self.n_estimators {
            // Squared loss: negative gradient is the plain residual
            let residuals = y - &current;

            let indices: Vec<usize> = if sample_size < n {
                let mut all: Vec<usize> = (0..n).collect();
                all.shuffle(&mut rng);
                all.truncate(sample_size);
                all
            } else {
                (0..n).collect()
            };

            let mut tree = RegressionTree::new(self.max_depth);
            tree.min_samples_split = self.min_samples_split;
            tree.min_samples_leaf = self.min_samples_leaf;
            tree.max_features = max_features;
            tree.seed = self.seed.wrapping_add(round as u64);
            tree.fit_indices(x.view(), residuals.view(), &indices)?;

            let update = tree.predict(x)?;
            current = current + update * self.learning_rate;
            self.trees.push(tree);
        }

        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(EmbedError::ModelNotFitted);
        }

        let mut preds = Array1::from_elem(x.nrows(), self.base_prediction);
        for tree in &self.trees {
            preds = preds + tree.predict(x)? * self.learning_rate;
        }
        Ok(preds)
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("n_estimators".to_string(), serde_json::json!(self.n_estimators));
        map.insert(
            "learning_rate".to_string(),
            serde_json::json!(self.learning_rate),
        );
        map.insert("max_depth".to_string(), serde_json::json!(self.max_depth));
        map.insert(
            "min_samples_split".to_string(),
            serde_json::json!(self.min_samples_split),
        );
        map.insert(
            "min_samples_leaf".to_string(),
            serde_json::json!(self.min_samples_leaf),
        );
        map.insert("subsample".to_string(), serde_json::json!(self.subsample));
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

    fn quadratic_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64 / 10.0);
        let y = Array1::from_shape_fn(n, |i| {
            let v = i as f64 / 10.0;
            v * v
        });
        (x, y)
    }

    #[test]
    fn test_boosting_reduces_error_over_mean() {
        let (x, y) = quadratic_data(50);

        let mut model = GradientBoostingRegressor::new(50, 0.1, 3, 42);
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        let mean = y.mean().unwrap();
        let mse_model: f64 =
            preds.iter().zip(y.iter()).map(|(p, t)| (p - t) * (p - t)).sum::<f64>() / y.len() as f64;
        let mse_mean: f64 = y.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / y.len() as f64;
        assert!(mse_model < mse_mean * 0.1);
    }

    #[test]
    fn test_seed_determinism_with_subsampling() {
        let (x, y) = quadratic_data(40);

        let mut a = GradientBoostingRegressor::new(20, 0.1, 3, 11);
        a.subsample = 0.7;
        let mut b = GradientBoostingRegressor::new(20, 0.1, 3, 11);
        b.subsample = 0.7;

        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_column_subsampling_still_learns() {
        // Three features, only the first is informative; restricting
        // each split to one candidate feature must still beat the mean
        let x = Array2::from_shape_fn((60, 3), |(i, j)| match j {
            0 => i as f64 / 10.0,
            _ => ((i * 7 + j * 13) % 10) as f64,
        });
        let y = Array1::from_shape_fn(60, |i| (i as f64 / 10.0).powi(2));

        let mut params = Map::new();
        params.insert("n_estimators".to_string(), serde_json::json!(40));
        params.insert("max_features".to_string(), serde_json::json!("1"));
        let mut model = GradientBoostingRegressor::from_params(&params, 42).unwrap();
        assert_eq!(model.max_features, "1");

        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let mean = y.mean().unwrap();
        let mse_model: f64 =
            preds.iter().zip(y.iter()).map(|(p, t)| (p - t) * (p - t)).sum::<f64>() / y.len() as f64;
        let mse_mean: f64 = y.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / y.len() as f64;
        assert!(mse_model < mse_mean);
    }

    #[test]
    fn test_invalid_subsample_rejected() {
        let mut params = Map::new();
        params.insert("subsample".to_string(), serde_json::json!(1.5));
        assert!(GradientBoostingRegressor::from_params(&params, 42).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GradientBoostingRegressor::new(10, 0.1, 3, 42);
        assert!(model.predict(&Array2::zeros((2, 1))).is_err());
    }
}
