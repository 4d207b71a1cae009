//! Epsilon-insensitive support vector regression

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{param_f64, param_str, param_usize, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

/// Cap on rows used to build the dense kernel matrix. Larger training
/// sets are subsampled with a fixed stride before fitting.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvrKernel {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
}

impl SvrKernel {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(Self::Linear),
            "rbf" => Ok(Self::Rbf),
            "poly" | "polynomial" => Ok(Self::Poly),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(EmbedError::InvalidInput(format!(
                "unknown SVR kernel: {}",
                other
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Rbf => "rbf",
            Self::Poly => "poly",
            Self::Sigmoid => "sigmoid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvrRegressor {
    pub c: f64,
    pub epsilon: f64,
    pub kernel: SvrKernel,
    pub gamma: Option<f64>,
    pub degree: usize,
    pub coef0: f64,
    pub max_iter: usize,
    pub tol: f64,
    support_vectors: Option<Array2<f64>>,
    dual_coefs: Vec<f64>,
    bias: f64,
    resolved_gamma: f64,
    is_fitted: bool,
}

impl SvrRegressor {
    pub fn new(c: f64, epsilon: f64, kernel: SvrKernel) -> Self {
        Self {
            c,
            epsilon,
            kernel,
            gamma: None,
            degree: 3,
            coef0: 0.0,
            max_iter: 1000,
            tol: 1e-3,
            support_vectors: None,
            dual_coefs: Vec::new(),
            bias: 0.0,
            resolved_gamma: 1.0,
            is_fitted: false,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(
            params,
            &["C", "epsilon", "kernel", "gamma", "degree", "coef0", "max_iter", "tol"],
        );
        let kernel_name = param_str(params, "kernel", "rbf")?;
        let mut model = Self::new(
            param_f64(params, "C", 1.0)?,
            param_f64(params, "epsilon", 0.1)?,
            SvrKernel::parse(&kernel_name)?,
        );
        model.degree = param_usize(params, "degree", 3)?;
        model.coef0 = param_f64(params, "coef0", 0.0)?;
        model.max_iter = param_usize(params, "max_iter", 1000)?;
        model.tol = param_f64(params, "tol", 1e-3)?;
        // "scale"/"auto" resolve against the data at fit time
        if let Some(v) = params.get("gamma") {
            if let Some(g) = v.as_f64() {
                model.gamma = Some(g);
            } else if let Some(s) = v.as_str() {
                if s != "scale" && s != "auto" {
                    if let Ok(g) = s.parse::<f64>() {
                        model.gamma = Some(g);
                    } else {
                        return Err(EmbedError::InvalidInput(format!(
                            "invalid gamma value: {}",
                            s
                        )));
                    }
                }
            }
        }
        Ok(model)
    }

    fn kernel_value(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.kernel {
            SvrKernel::Linear => dot(a, b),
            SvrKernel::Rbf => {
                let sq_dist: f64 = a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                (-self.resolved_gamma * sq_dist).exp()
            }
            SvrKernel::Poly => {
                (self.resolved_gamma * dot(a, b) + self.coef0).powi(self.degree as i32)
            }
            SvrKernel::Sigmoid => (self.resolved_gamma * dot(a, b) + self.coef0).tanh(),
        }
    }

    fn resolve_gamma(&mut self, x: &Array2<f64>) {
        self.resolved_gamma = match self.gamma {
            Some(g) => g,
            None => {
                // sklearn's "scale": 1 / (n_features * Var(X))
                let var = x.var(0.0);
                if var > 1e-12 {
                    1.0 / (x.ncols() as f64 * var)
                } else {
                    1.0 / x.ncols().max(1) as f64
                }
            }
        };
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

impl Estimator for SvrRegressor {
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

        // Strided subsample keeps the kernel matrix bounded
        let (x_fit, y_fit) = if n_total > MAX_KERNEL_MATRIX_SAMPLES {
            let step = n_total / MAX_KERNEL_MATRIX_SAMPLES;
            let idx: Vec<usize> = (0..n_total).step_by(step.max(1)).collect();
            (
                x.select(Axis(0), &idx),
                Array1::from_iter(idx.iter().map(|&i| y[i])),
            )
        } else {
            (x.to_owned(), y.to_owned())
        };
        let n = x_fit.nrows();

        self.resolve_gamma(&x_fit);

        let rows: Vec<Vec<f64>> = x_fit.outer_iter().map(|r| r.to_vec()).collect();
        let mut kernel = Array2::zeros((n, n));
        for i in 0..n {
            for j in i..n {
                let k = self.kernel_value(&rows[i], &rows[j]);
                kernel[[i, j]] = k;
                kernel[[j, i]] = k;
            }
        }

        // Gradient descent on the dual variables with epsilon-insensitive loss
        let mut alphas = vec![0.0_f64; n];
        let mut alphas_star = vec![0.0_f64; n];
        let mut bias = 0.0;
        let learning_rate = 0.01;

        for _ in 0..self.max_iter {
            let mut max_change = 0.0_f64;

            for i in 0..n {
                let mut pred = bias;
                for j in 0..n {
                    pred += (alphas[j] - alphas_star[j]) * kernel[[i, j]];
                }
                let error = pred - y_fit[i];

                if error > self.epsilon {
                    let delta = learning_rate * (error - self.epsilon);
                    let new_alpha_star = (alphas_star[i] + delta).min(self.c);
                    max_change = max_change.max((new_alpha_star - alphas_star[i]).abs());
                    alphas_star[i] = new_alpha_star;
                } else if error < -self.epsilon {
                    let delta = learning_rate * (-error - self.epsilon);
                    let new_alpha = (alphas[i] + delta).min(self.c);
                    max_change = max_change.max((new_alpha - alphas[i]).abs());
                    alphas[i] = new_alpha;
                }

                bias -= learning_rate * 0.1 * error;
            }

            if max_change < self.tol {
                break;
            }
        }

        // Keep only points with non-negligible dual weight
        let mut sv_idx: Vec<usize> = (0..n)
            .filter(|&i| (alphas[i] - alphas_star[i]).abs() > 1e-8)
            .collect();
        if sv_idx.is_empty() {
            sv_idx = (0..n).collect();
        }

        self.dual_coefs = sv_idx.iter().map(|&i| alphas[i] - alphas_star[i]).collect();
        self.support_vectors = Some(x_fit.select(Axis(0), &sv_idx));
        self.bias = bias;
        self.is_fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let svs = self.support_vectors.as_ref().ok_or(EmbedError::ModelNotFitted)?;
        let sv_rows: Vec<Vec<f64>> = svs.outer_iter().map(|r| r.to_vec()).collect();

        let preds: Vec<f64> = x
            .outer_iter()
            .map(|row| {
                let r = row.to_vec();
                let mut value = self.bias;
                for (coef, sv) in self.dual_coefs.iter().zip(sv_rows.iter()) {
                    value += coef * self.kernel_value(&r, sv);
                }
                value
            })
            .collect();

        Ok(Array1::from_vec(preds))
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("C".to_string(), serde_json::json!(self.c));
        map.insert("epsilon".to_string(), serde_json::json!(self.epsilon));
        map.insert("kernel".to_string(), Value::String(self.kernel.name().to_string()));
        map.insert(
            "gamma".to_string(),
            match self.gamma {
                Some(g) => serde_json::json!(g),
                None => Value::String("scale".to_string()),
            },
        );
        map.insert("degree".to_string(), serde_json::json!(self.degree));
        map.insert("coef0".to_string(), serde_json::json!(self.coef0));
        map.insert("max_iter".to_string(), serde_json::json!(self.max_iter));
        map.insert("tol".to_string(), serde_json::json!(self.tol));
        map
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
