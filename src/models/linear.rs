//! Ordinary least squares and ridge regression

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{param_bool, param_f64, warn_unknown_keys, Estimator};
use crate::error::{EmbedError, Result};

/// Solve the symmetric positive-definite system Ax = b via Cholesky,
/// retrying with a small diagonal ridge when the matrix is near-singular.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    match cholesky_factor(a) {
        Some(l) => Some(solve_from_factor(&l, b)),
        None => {
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
            let mut a_reg = a.clone();
            for k in 0..n {
                a_reg[[k, k]] += ridge;
            }
            cholesky_factor(&a_reg).map(|l| solve_from_factor(&l, b))
        }
    }
}

fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

fn solve_from_factor(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    x
}

/// Gauss-Jordan inverse, fallback for systems Cholesky rejects
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                let tmp = aug[[col, j]];
                aug[[col, j]] = aug[[max_row, j]];
                aug[[max_row, j]] = tmp;
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    let mut inv = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }

    Some(inv)
}

/// Normal equations (X^T X + alpha I) w = X^T y
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Option<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    if alpha > 0.0 {
        for k in 0..xtx.nrows() {
            xtx[[k, k]] += alpha;
        }
    }

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Some(w);
    }

    matrix_inverse(&xtx).map(|inv| inv.dot(&xty))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
    is_fitted: bool,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            coefficients: None,
            intercept: 0.0,
            is_fitted: false,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(params, &["fit_intercept"]);
        Ok(Self {
            fit_intercept: param_bool(params, "fit_intercept", true)?,
            ..Self::new()
        })
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    fn fit_with_alpha(&mut self, x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples != y.len() {
            return Err(EmbedError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(EmbedError::TrainingError("empty dataset".to_string()));
        }

        // Center data so the intercept falls out of the solve
        let (w, intercept) = if self.fit_intercept {
            let x_mean = x
                .mean_axis(Axis(0))
                .ok_or_else(|| EmbedError::TrainingError("empty dataset".to_string()))?;
            let y_mean = y.mean().unwrap_or(0.0);
            let x_centered = x - &x_mean.clone().insert_axis(Axis(0));
            let y_centered = y - y_mean;

            let w = solve_normal_equations(&x_centered, &y_centered, alpha).ok_or_else(|| {
                EmbedError::ComputationError("singular normal equations".to_string())
            })?;
            let intercept = y_mean - w.dot(&x_mean);
            (w, intercept)
        } else {
            let w = solve_normal_equations(x, y, alpha).ok_or_else(|| {
                EmbedError::ComputationError("singular normal equations".to_string())
            })?;
            (w, 0.0)
        };

        self.coefficients = Some(w);
        self.intercept = intercept;
        self.is_fitted = true;
        Ok(())
    }

    fn predict_linear(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let w = self.coefficients.as_ref().ok_or(EmbedError::ModelNotFitted)?;
        Ok(x.dot(w) + self.intercept)
    }
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_alpha(x, y, 0.0)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_linear(x)
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("fit_intercept".to_string(), Value::Bool(self.fit_intercept));
        map
    }

    fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    pub fit_intercept: bool,
    inner: LinearRegression,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fit_intercept: true,
            inner: LinearRegression::new(),
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        warn_unknown_keys(params, &["alpha", "fit_intercept"]);
        let fit_intercept = param_bool(params, "fit_intercept", true)?;
        let mut inner = LinearRegression::new();
        inner.fit_intercept = fit_intercept;
        Ok(Self {
            alpha: param_f64(params, "alpha", 1.0)?,
            fit_intercept,
            inner,
        })
    }
}

impl Estimator for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner.fit_with_alpha(x, y, self.alpha)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner.predict_linear(x)
    }

    fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("alpha".to_string(), serde_json::json!(self.alpha));
        map.insert("fit_intercept".to_string(), Value::Bool(self.fit_intercept));
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
    fn test_perfect_linear_fit() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![10.0, 20.0, 30.0, 40.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        for (p, t) in preds.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6, "pred {} vs {}", p, t);
        }

        let w = model.coefficients().unwrap();
        assert!((w[0] - 10.0).abs() < 1e-6);
        assert!(model.intercept.abs() < 1e-6);
    }

    #[test]
    fn test_intercept_recovered() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![5.0, 7.0, 9.0, 11.0]; // y = 2x + 5

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        assert!((model.intercept - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0];

        let mut ols = LinearRegression::new();
        ols.fit(&x, &y).unwrap();

        let mut ridge = RidgeRegression::new(10.0);
        ridge.fit(&x, &y).unwrap();

        let w_ols = ols.coefficients().unwrap()[0];
        let w_ridge = ridge.inner.coefficients().unwrap()[0];
        assert!(w_ridge.abs() < w_ols.abs());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearRegression::new();
        assert!(model.fit(&x, &y).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
