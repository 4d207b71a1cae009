//! Regression metrics and hold-out evaluation

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::models::Estimator;
use crate::transform::{FittedScaler, FittedTransform};

pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.0);
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    if ss_tot <= f64::EPSILON {
        if ss_res <= f64::EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum::<f64>()
        / y_true.len() as f64
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Least squares line y = m·x + c through the (y_true, y_pred) scatter
pub fn fit_line(x: &Array1<f64>, y: &Array1<f64>) -> (f64, f64) {
    let n = x.len() as f64;
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let x_mean = x.mean().unwrap_or(0.0);
    let y_mean = y.mean().unwrap_or(0.0);
    let cov: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (a - x_mean) * (b - y_mean))
        .sum::<f64>()
        / n;
    let var: f64 = x.iter().map(|a| (a - x_mean) * (a - x_mean)).sum::<f64>() / n;
    if var <= f64::EPSILON {
        return (0.0, y_mean);
    }
    let slope = cov / var;
    (slope, y_mean - slope * x_mean)
}

/// Undoes the label pipeline before metrics are computed
#[derive(Debug, Clone, Default)]
pub struct Inversion {
    pub scaler: Option<FittedScaler>,
    pub transform: Option<FittedTransform>,
    pub clamp_negative: bool,
}

impl Inversion {
    /// Map values back to natural units. True labels take this path, so
    /// no clamping happens here.
    pub fn invert(&self, y: &Array1<f64>) -> Result<Array1<f64>> {
        let mut out = y.to_owned();
        if let Some(scaler) = &self.scaler {
            out = scaler.inverse(&out);
        }
        if let Some(transform) = &self.transform {
            out = transform.inverse(&out)?;
        }
        Ok(out)
    }

    /// Inversion for predictions: negatives are clamped to zero when
    /// the request asks for it.
    pub fn apply(&self, y: &Array1<f64>) -> Result<Array1<f64>> {
        let mut out = self.invert(y)?;
        if self.clamp_negative {
            out.mapv_inplace(|v| v.max(0.0));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub r2: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Calibration line y_pred = slope * y_true + intercept
    pub slope: f64,
    pub intercept: f64,
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
    pub y_linear_fit: Vec<f64>,
}

/// Predict on `x`, map both labels and predictions back to natural
/// units, then score.
pub fn evaluate(
    estimator: &dyn Estimator,
    x: &Array2<f64>,
    y: &Array1<f64>,
    inversion: &Inversion,
) -> Result<Evaluation> {
    if x.nrows() != y.len() {
        return Err(EmbedError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }

    let y_pred = inversion.apply(&estimator.predict(x)?)?;
    let y_true = inversion.invert(y)?;

    let mse = mean_squared_error(&y_true, &y_pred);
    let (slope, intercept) = fit_line(&y_true, &y_pred);
    let y_linear_fit: Vec<f64> = y_true.iter().map(|t| slope * t + intercept).collect();

    Ok(Evaluation {
        r2: r2_score(&y_true, &y_pred),
        mse,
        rmse: mse.sqrt(),
        mae: mean_absolute_error(&y_true, &y_pred),
        slope,
        intercept,
        y_true: y_true.to_vec(),
        y_pred: y_pred.to_vec(),
        y_linear_fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearRegression;
    use crate::transform::YTransform;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert_eq!(mean_squared_error(&y, &y), 0.0);
        assert_eq!(mean_absolute_error(&y, &y), 0.0);
    }

    #[test]
    fn test_mean_prediction_r2_zero() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![2.0, 2.0, 2.0];
        assert!(r2_score(&y_true, &y_pred).abs() < 1e-12);
    }

    #[test]
    fn test_fit_line_recovers_identity() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let (m, c) = fit_line(&y_true, &y_true);
        assert!((m - 1.0).abs() < 1e-12);
        assert!(c.abs() < 1e-12);
    }

    #[test]
    fn test_metrics_in_natural_units() {
        // Train on log-transformed labels, evaluate in natural units
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y_natural = array![1.0, (1.0_f64.exp() - 1.0), (2.0_f64.exp() - 1.0), (3.0_f64.exp() - 1.0)];
        let (y_trans, fitted) = YTransform::Log1p.apply(&y_natural).unwrap();

        let mut model = LinearRegression::new();
        model.fit(&x, &y_trans).unwrap();

        let inversion = Inversion {
            scaler: None,
            transform: Some(fitted),
            clamp_negative: false,
        };
        let eval = evaluate(&model, &x, &y_trans, &inversion).unwrap();

        for (t, n) in eval.y_true.iter().zip(y_natural.iter()) {
            assert!((t - n).abs() < 1e-9);
        }
        assert!(eval.r2 > 0.99);
    }

    #[test]
    fn test_clamp_applies_to_predictions_only() {
        let inversion = Inversion {
            scaler: None,
            transform: None,
            clamp_negative: true,
        };
        let out = inversion.apply(&array![-1.0, 2.0, -0.5]).unwrap();
        assert_eq!(out, array![0.0, 2.0, 0.0]);
        // The label path must keep genuine negative targets
        let labels = inversion.invert(&array![-5.0, 2.0]).unwrap();
        assert_eq!(labels, array![-5.0, 2.0]);
    }

    #[test]
    fn test_negative_targets_survive_clamped_evaluation() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![-3.0, -1.0, 1.0, 3.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let inversion = Inversion {
            scaler: None,
            transform: None,
            clamp_negative: true,
        };
        let eval = evaluate(&model, &x, &y, &inversion).unwrap();

        assert_eq!(eval.y_true, vec![-3.0, -1.0, 1.0, 3.0]);
        assert!(eval.y_pred.iter().all(|&p| p >= 0.0));
    }
}
