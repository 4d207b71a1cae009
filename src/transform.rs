//! Label transforms and scalers
//!
//! Scalar transforms applied to y before training, each recording whatever
//! fitted state is needed to invert predictions back to natural units.

use ndarray::Array1;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{EmbedError, Result};

/// Scalar transform applied to the label vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YTransform {
    Log1p,
    Sqrt,
    #[serde(alias = "inverse")]
    Reciprocal,
    Square,
    Exp,
    Boxcox,
    YeoJohnson,
}

impl YTransform {
    /// Parse a transform name. Unknown names are passed through as `None`
    /// (the run proceeds on untransformed labels) rather than raising.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "log1p" => Some(Self::Log1p),
            "sqrt" => Some(Self::Sqrt),
            "reciprocal" | "inverse" => Some(Self::Reciprocal),
            "square" => Some(Self::Square),
            "exp" => Some(Self::Exp),
            "boxcox" => Some(Self::Boxcox),
            "yeo_johnson" => Some(Self::YeoJohnson),
            "" => None,
            other => {
                tracing::warn!("unrecognized y-transform {:?}, leaving labels unchanged", other);
                None
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Log1p => "log1p",
            Self::Sqrt => "sqrt",
            Self::Reciprocal => "reciprocal",
            Self::Square => "square",
            Self::Exp => "exp",
            Self::Boxcox => "boxcox",
            Self::YeoJohnson => "yeo_johnson",
        }
    }

    /// All supported transform names, for CLI listings
    pub fn all_names() -> &'static [&'static str] {
        &["log1p", "sqrt", "reciprocal", "square", "exp", "boxcox", "yeo_johnson"]
    }

    /// Apply the transform, returning the transformed vector and the fitted
    /// state required for inversion.
    pub fn apply(&self, y: &Array1<f64>) -> Result<(Array1<f64>, FittedTransform)> {
        match self {
            Self::Log1p => Ok((y.mapv(|v| (v + 1.0).ln()), FittedTransform::Log1p)),
            Self::Sqrt => {
                if y.iter().any(|&v| v < 0.0) {
                    return Err(EmbedError::InvalidInput(
                        "sqrt transform requires non-negative labels".to_string(),
                    ));
                }
                Ok((y.mapv(f64::sqrt), FittedTransform::Sqrt))
            }
            Self::Reciprocal => Ok((y.mapv(|v| 1.0 / (v + 1.0)), FittedTransform::Reciprocal)),
            Self::Square => Ok((y.mapv(|v| v * v), FittedTransform::Square)),
            Self::Exp => Ok((y.mapv(f64::exp), FittedTransform::Exp)),
            Self::Boxcox => {
                if y.iter().any(|&v| v <= 0.0) {
                    return Err(EmbedError::InvalidInput(
                        "boxcox transform requires strictly positive labels".to_string(),
                    ));
                }
                let values: Vec<f64> = y.to_vec();
                let lambda = estimate_lambda(&values, boxcox_log_likelihood);
                let transformed = y.mapv(|v| boxcox_value(v, lambda));
                Ok((transformed, FittedTransform::Boxcox { lambda }))
            }
            Self::YeoJohnson => {
                let values: Vec<f64> = y.to_vec();
                let lambda = estimate_lambda(&values, yeojohnson_log_likelihood);
                let transformed = y.mapv(|v| yeojohnson_value(v, lambda));
                Ok((transformed, FittedTransform::YeoJohnson { lambda }))
            }
        }
    }
}

/// Fitted state of an applied transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum FittedTransform {
    Log1p,
    Sqrt,
    Reciprocal,
    Square,
    Exp,
    Boxcox { lambda: f64 },
    YeoJohnson { lambda: f64 },
}

impl FittedTransform {
    /// Map transformed values back to natural units
    pub fn inverse(&self, y: &Array1<f64>) -> Result<Array1<f64>> {
        let out = match self {
            Self::Log1p => y.mapv(|v| v.exp() - 1.0),
            Self::Sqrt => y.mapv(|v| v * v),
            Self::Reciprocal => y.mapv(|v| 1.0 / v - 1.0),
            Self::Square => {
                if y.iter().any(|&v| v < 0.0) {
                    return Err(EmbedError::InvalidInput(
                        "cannot invert square transform on negative values".to_string(),
                    ));
                }
                y.mapv(f64::sqrt)
            }
            Self::Exp => {
                if y.iter().any(|&v| v <= 0.0) {
                    return Err(EmbedError::InvalidInput(
                        "cannot invert exp transform on non-positive values".to_string(),
                    ));
                }
                y.mapv(f64::ln)
            }
            Self::Boxcox { lambda } => y.mapv(|v| boxcox_inverse(v, *lambda)),
            Self::YeoJohnson { lambda } => y.mapv(|v| yeojohnson_inverse(v, *lambda)),
        };
        Ok(out)
    }
}

/// Grid-search lambda via maximum likelihood over [-2, 2]
fn estimate_lambda(values: &[f64], log_likelihood: fn(&[f64], f64) -> f64) -> f64 {
    let mut best_lambda = 1.0;
    let mut best_ll = f64::NEG_INFINITY;

    for lambda_int in -20..=20 {
        let lambda = lambda_int as f64 * 0.1;
        let ll = log_likelihood(values, lambda);
        if ll > best_ll {
            best_ll = ll;
            best_lambda = lambda;
        }
    }

    best_lambda
}

fn boxcox_value(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

fn boxcox_inverse(y: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        y.exp()
    } else {
        (y * lambda + 1.0).powf(1.0 / lambda)
    }
}

fn boxcox_log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| boxcox_value(x, lambda)).collect();

    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n;
    if variance <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let log_jacobian: f64 = values.iter().map(|&x| x.ln()).sum();
    -n / 2.0 * variance.ln() + (lambda - 1.0) * log_jacobian
}

fn yeojohnson_value(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-10 {
            (x + 1.0).ln()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-10 {
        -((-x + 1.0).ln())
    } else {
        -(((-x + 1.0).powf(2.0 - lambda) - 1.0) / (2.0 - lambda))
    }
}

/// Inverse Yeo-Johnson via Newton-Raphson on the forward map
fn yeojohnson_inverse(y: f64, lambda: f64) -> f64 {
    let mut x = y;

    for _ in 0..30 {
        let fx = yeojohnson_value(x, lambda) - y;
        if fx.abs() < 1e-12 {
            break;
        }

        let h = 1e-8;
        let dfx = (yeojohnson_value(x + h, lambda) - yeojohnson_value(x - h, lambda)) / (2.0 * h);
        if dfx.abs() < 1e-12 {
            break;
        }

        x -= fx / dfx;
    }

    x
}

fn yeojohnson_log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| yeojohnson_value(x, lambda)).collect();

    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n;
    if variance <= 0.0 {
        return f64::NEG_INFINITY;
    }

    let log_jacobian: f64 = values.iter().map(|&x| (x.abs() + 1.0).ln().copysign(x)).sum();
    -n / 2.0 * variance.ln() + (lambda - 1.0) * log_jacobian
}

/// Lenient deserializer for optional transform fields: unknown names become
/// `None` instead of failing the whole payload.
pub fn lenient_transform<'de, D>(deserializer: D) -> std::result::Result<Option<YTransform>, D::Error>
where
    D: Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(YTransform::parse))
}

/// Lenient deserializer for optional scaler fields: unknown names become
/// `None` instead of failing the whole payload.
pub fn lenient_scaler<'de, D>(deserializer: D) -> std::result::Result<Option<ScalerKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(ScalerKind::parse))
}

// ============================================================================
// Label scalers
// ============================================================================

/// Scaler applied to the (already transformed) label vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    Standard,
    MinMax,
    MaxAbs,
    Robust,
    /// Empirical-CDF map onto [0, 1]
    Quantile,
    /// Yeo-Johnson followed by standardization
    Power,
}

impl ScalerKind {
    /// Parse a scaler name. Both the short names the CLI lists and the
    /// sklearn-style class names used by the original payloads are
    /// accepted; unknown names are passed through as `None` (the run
    /// proceeds on unscaled labels) rather than raising.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "standard" | "StandardScaler" => Some(Self::Standard),
            "minmax" | "min_max" | "MinMaxScaler" => Some(Self::MinMax),
            "maxabs" | "max_abs" | "MaxAbsScaler" => Some(Self::MaxAbs),
            "robust" | "RobustScaler" => Some(Self::Robust),
            "quantile" | "QuantileTransformer" => Some(Self::Quantile),
            "power" | "PowerTransformer" => Some(Self::Power),
            "" => None,
            other => {
                tracing::warn!("unrecognized y-scaler {:?}, leaving labels unscaled", other);
                None
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::MinMax => "minmax",
            Self::MaxAbs => "maxabs",
            Self::Robust => "robust",
            Self::Quantile => "quantile",
            Self::Power => "power",
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["standard", "minmax", "maxabs", "robust", "quantile", "power"]
    }

    /// Fit scaler parameters and apply in one step
    pub fn fit_transform(&self, y: &Array1<f64>) -> (Array1<f64>, FittedScaler) {
        let fitted = match self {
            Self::Standard => {
                let mean = y.mean().unwrap_or(0.0);
                let std = y.std(1.0);
                FittedScaler::affine(*self, mean, std)
            }
            Self::MinMax => {
                let min = y.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                FittedScaler::affine(*self, min, max - min)
            }
            Self::MaxAbs => {
                let max_abs = y.iter().fold(0.0f64, |a, &b| a.max(b.abs()));
                FittedScaler::affine(*self, 0.0, max_abs)
            }
            Self::Robust => {
                let mut sorted = y.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let median = quantile_sorted(&sorted, 0.5);
                let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);
                FittedScaler::affine(*self, median, iqr)
            }
            Self::Quantile => {
                let mut references = y.to_vec();
                references.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                FittedScaler::Quantile { references }
            }
            Self::Power => {
                let values = y.to_vec();
                let lambda = estimate_lambda(&values, yeojohnson_log_likelihood);
                let transformed: Vec<f64> =
                    values.iter().map(|&v| yeojohnson_value(v, lambda)).collect();
                let n = transformed.len().max(1) as f64;
                let mean = transformed.iter().sum::<f64>() / n;
                let std =
                    (transformed.iter().map(|&t| (t - mean).powi(2)).sum::<f64>() / n).sqrt();
                let std = if std == 0.0 || !std.is_finite() { 1.0 } else { std };
                FittedScaler::Power { lambda, mean, std }
            }
        };
        (fitted.transform(y), fitted)
    }
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Parameters of a fitted scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scaler", rename_all = "snake_case")]
pub enum FittedScaler {
    Affine {
        kind: ScalerKind,
        center: f64,
        scale: f64,
    },
    /// Sorted training values, the interpolation knots of the CDF
    Quantile { references: Vec<f64> },
    Power { lambda: f64, mean: f64, std: f64 },
}

impl FittedScaler {
    fn affine(kind: ScalerKind, center: f64, scale: f64) -> Self {
        // Constant columns get scale 1.0 so they pass through unchanged
        let scale = if scale == 0.0 || !scale.is_finite() { 1.0 } else { scale };
        Self::Affine { kind, center, scale }
    }

    pub fn transform(&self, y: &Array1<f64>) -> Array1<f64> {
        match self {
            Self::Affine { center, scale, .. } => y.mapv(|v| (v - *center) / *scale),
            Self::Quantile { references } => y.mapv(|v| quantile_rank(references, v)),
            Self::Power { lambda, mean, std } => {
                y.mapv(|v| (yeojohnson_value(v, *lambda) - *mean) / *std)
            }
        }
    }

    pub fn inverse(&self, y: &Array1<f64>) -> Array1<f64> {
        match self {
            Self::Affine { center, scale, .. } => y.mapv(|v| v * *scale + *center),
            Self::Quantile { references } => {
                y.mapv(|v| quantile_sorted(references, v.clamp(0.0, 1.0)))
            }
            Self::Power { lambda, mean, std } => {
                y.mapv(|v| yeojohnson_inverse(v * *std + *mean, *lambda))
            }
        }
    }
}

/// Interpolated empirical-CDF position of `v` in [0, 1]
fn quantile_rank(sorted: &[f64], v: f64) -> f64 {
    let n = sorted.len();
    if n < 2 {
        return 0.0;
    }
    if v <= sorted[0] {
        return 0.0;
    }
    if v >= sorted[n - 1] {
        return 1.0;
    }
    let idx = sorted.partition_point(|&r| r < v);
    let lo = sorted[idx - 1];
    let hi = sorted[idx];
    let frac = if hi > lo { (v - lo) / (hi - lo) } else { 0.0 };
    ((idx - 1) as f64 + frac) / (n - 1) as f64
}
