//! Gaussian process regression with a composable kernel

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::linear::cholesky_solve;
use super::{param_f64, param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

/// Cap on rows kept for the kernel matrix; larger sets are strided down.
const MAX_TRAINING_SIZE: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GpKernelTerm {
    Rbf { length_scale: f64 },
    White { noise_level: f64 },
}

impl GpKernelTerm {
    fn value(&self, a: &[f64], b: &[f64], same_point: bool) -> f64 {
        match self {
            GpKernelTerm::Rbf { length_scale } => {
                let sq_dist: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                (-sq_dist / (2.0 * length_scale * length_scale)).exp()
            }
            GpKernelTerm::White { noise_level } => {
                if same_point {
                    *noise_level
                } else {
                    0.0
                }
            }
        }
    }
}

/// Product of a constant amplitude and a sum of base terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpKernel {
    pub constant: f64,
    pub terms: Vec<GpKernelTerm>,
}

impl GpKernel {
    pub fn default_rbf() -> Self {
        Self {
            constant: 1.0,
            terms: vec![GpKernelTerm::Rbf { length_scale: 1.0 }],
        }
    }

    fn value(&self, a: &[f64], b: &[f64], same_point: bool) -> f64 {
        let sum: f64 = self
            .terms
            .iter()
            .map(|t| t.value(a, b, same_point))
            .sum();
        self.constant * sum
    }
}

/// First number of a comma-separated list is the parameter value; the
/// remainder is optimizer bounds metadata and is ignored here. The
/// literal "fixed" leaves the default in place.
fn kernel_arg_f64(args: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    let Some(raw) = args.get(key) else {
        return Ok(default);
    };
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            EmbedError::InvalidInput(format!("kernel argument {} is not a number", key))
        }),
        Value::String(s) => {
            let first = s.split(',').next().unwrap_or("").trim();
            if first == "fixed" || first.is_empty() {
                return Ok(default);
            }
            first.parse::<f64>().map_err(|_| {
                EmbedError::InvalidInput(format!("invalid kernel argument {}: {}", key, s))
            })
        }
        Value::Array(items) => items
            .first()
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                EmbedError::InvalidInput(format!("kernel argument {} has no numeric value", key))
            }),
        Value::Null => Ok(default),
        other => Err(EmbedError::InvalidInput(format!(
            "unsupported kernel argument {}: {}",
            key, other
        ))),
    }
}

/// Parse a nested kernel description mapping term names to their
/// arguments, e.g. `{"Constant": {"constant_value": "1.0,fixed"},
/// "RBF": {"length_scale": 1.0}}`.
pub fn parse_kernel_spec(spec: &Map<String, Value>) -> Result<GpKernel> {
    let mut constant = 1.0;
    let mut terms = Vec::new();

    for (name, raw_args) in spec {
        let empty = Map::new();
        let args = raw_args.as_object().unwrap_or(&empty);

        match name.as_str() {
            "Constant" | "ConstantKernel" => {
                constant = kernel_arg_f64(args, "constant_value", 1.0)?;
            }
            "RBF" => {
                terms.push(GpKernelTerm::Rbf {
                    length_scale: kernel_arg_f64(args, "length_scale", 1.0)?,
                });
            }
            "WhiteKernel" | "White" => {
                terms.push(GpKernelTerm::White {
                    noise_level: kernel_arg_f64(args, "noise_level", 1.0)?,
                });
            }
            other => {
                return Err(EmbedError::InvalidInput(format!(
                    "unknown kernel term: {}",
                    other
                )));
            }
        }
    }

    if terms.is_empty() {
        terms.push(GpKernelTerm::Rbf { length_scale: 1.0 });
    }

    Ok(GpKernel { constant, terms })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianProcessRegressor {
    pub kernel: GpKernel,
    /// Diagonal jitter added to the training kernel matrix
    pub alpha: f64,
    pub max_training_size: usize,
    train_x: Option<Array2<f64>>,
    weights: Option<Array1<f64>>,
    y_mean: f64,
    is_fitted: bool,
}

impl GaussianProcessRegressor {
    pub fn new(kernel: GpKernel) -> Self {
        Self {
            kernel,
            alpha: 1e-10,
            max_training_size: MAX_TRAINING_SIZE,
            train_x: None,
            weights: None,
            y_mean: 0.0,
            is_fitted: false,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(params, &["kernel", "alpha", "max_training_size"]);
        let kernel = match params.get("kernel") {
            Some(Value::Object(spec)) => parse_kernel_spec(spec)?,
            Some(Value::Null) | None => GpKernel::default_rbf(),
            Some(other) => {
                return Err(EmbedError::InvalidInput(format!(
                    "kernel must be an object, got {}",
                    other
                )));
            }
        };
        let mut model = Self::new(kernel);
        model.alpha = param_f64(params, "alpha", 1e-10)?;
        model.max_training_size =
            param_usize(params, "max_training_size", MAX_TRAINING_SIZE)?.max(1);
        Ok(model)
    }
}

impl Estimator for GaussianProcessRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_total = x.nrows();
        if n_total != y.len() {
            return Err(EmbedError::ShapeError {
                expected: format!("y length = {}", n_total),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_total == 0 {
            return Err(EmbedError::TrainingError("empty dataset".to_string()));
        }

        let (x_fit, y_fit) = if n_total > self.max_training_size {
            let step = n_total / self.max_training_size;
            let idx: Vec<usize> = (0..n_total).step_by(step.max(1)).collect();
            (
                x.select(Axis(0), &idx),
                Array1::from_iter(idx.iter().map(|&i| y[i])),
            )
        } else {
            (x.to_owned(), y.to_owned())
        };
        let n = x_fit.nrows();

        self.y_mean = y_fit.mean().unwrap_or(0.0);
        let y_centered = &y_fit - self.y_mean;

        let rows: Vec<Vec<f64>> = x_fit.outer_iter().map(|r| r.to_vec()).collect();
        let mut k = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let v = self.kernel.value(&rows[i], &rows[j], i == j);
                k[[i, j]] = v;
                k[[j, i]] = v;
            }
            k[[i, i]] += self.alpha;
        }

        let weights = cholesky_solve(&k, &y_centered).ok_or_else(|| {
            EmbedError::ComputationError("kernel matrix is not positive definite".to_string())
        })?;

        self.train_x = Some(x_fit);
        self.weights = Some(weights);
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let train_x = self.train_x.as_ref().ok_or(EmbedError::ModelNotFitted)?;
        let weights = self.weights.as_ref().ok_or(EmbedError::ModelNotFitted)?;

        let train_rows: Vec<Vec<f64>> = train_x.outer_iter().map(|r| r.to_vec()).collect();
        let preds: Vec<f64> = x
            .outer_iter()
            .map(|row| {
                let r = row.to_vec();
                let mut value = self.y_mean;
                for (w, tr) in weights.iter().zip(train_rows.iter()) {
                    value += w * self.kernel.value(&r, tr, false);
                }
                value
            })
            .collect();

        Ok(Array1::from_vec(preds))
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "kernel".to_string(),
            serde_json::to_value(&self.kernel).unwrap_or(Value::Null),
        );
        map.insert("alpha".to_string(), serde_json::json!(self.alpha));
        map.insert(
            "max_training_size".to_string(),
            serde_json::json!(self.max_training_size),
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
    fn test_interpolates_training_points() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 4.0, 9.0];

        let mut model = GaussianProcessRegressor::new(GpKernel::default_rbf());
        model.alpha = 1e-8;
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 0.1, "pred {} vs {}", p, t);
        }
    }

    #[test]
    fn test_far_query_reverts_to_mean() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![4.0, 6.0, 8.0];

        let mut model = GaussianProcessRegressor::new(GpKernel::default_rbf());
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&array![[1000.0]]).unwrap();
        assert!((pred[0] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_kernel_spec_composition() {
        let spec: Map<String, Value> = serde_json::from_str(
            r#"{"Constant": {"constant_value": "2.0,1e-5,1e5"},
                "RBF": {"length_scale": "0.5,fixed"}}"#,
        )
        .unwrap();
        let kernel = parse_kernel_spec(&spec).unwrap();
        assert!((kernel.constant - 2.0).abs() < 1e-12);
        assert_eq!(kernel.terms, vec![GpKernelTerm::Rbf { length_scale: 0.5 }]);
    }

    #[test]
    fn test_parse_kernel_spec_fixed_keeps_default() {
        let spec: Map<String, Value> =
            serde_json::from_str(r#"{"RBF": {"length_scale": "fixed"}}"#).unwrap();
        let kernel = parse_kernel_spec(&spec).unwrap();
        assert_eq!(kernel.terms, vec![GpKernelTerm::Rbf { length_scale: 1.0 }]);
    }

    #[test]
    fn test_parse_kernel_spec_unknown_term() {
        let spec: Map<String, Value> =
            serde_json::from_str(r#"{"Matern": {"nu": 1.5}}"#).unwrap();
        assert!(parse_kernel_spec(&spec).is_err());
    }
}
