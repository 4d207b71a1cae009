//! Model registry and estimator trait

pub mod boosting;
pub mod forest;
pub mod gp;
pub mod knn;
pub mod linear;
pub mod svr;
pub mod tree;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{EmbedError, Result};

pub use boosting::GradientBoostingRegressor;
pub use forest::RandomForestRegressor;
pub use gp::{parse_kernel_spec, GaussianProcessRegressor, GpKernel};
pub use knn::KnnRegressor;
pub use linear::{LinearRegression, RidgeRegression};
pub use svr::SvrRegressor;
pub use tree::RegressionTree;

/// Closed set of supported regressors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "linear_regression")]
    LinearRegression,
    #[serde(rename = "ridge")]
    Ridge,
    #[serde(rename = "svr")]
    Svr,
    #[serde(rename = "knn")]
    Knn,
    #[serde(rename = "rfr")]
    RandomForest,
    #[serde(rename = "gbr")]
    GradientBoosting,
    #[serde(rename = "gpr")]
    GaussianProcess,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinearRegression => "linear_regression",
            Self::Ridge => "ridge",
            Self::Svr => "svr",
            Self::Knn => "knn",
            Self::RandomForest => "rfr",
            Self::GradientBoosting => "gbr",
            Self::GaussianProcess => "gpr",
        }
    }

    /// All registry names, for CLI listings
    pub fn all_names() -> &'static [&'static str] {
        &["linear_regression", "ridge", "svr", "knn", "rfr", "gbr", "gpr"]
    }
}

impl FromStr for ModelKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear_regression" => Ok(Self::LinearRegression),
            "ridge" => Ok(Self::Ridge),
            "svr" => Ok(Self::Svr),
            "knn" => Ok(Self::Knn),
            "rfr" => Ok(Self::RandomForest),
            "gbr" => Ok(Self::GradientBoosting),
            "gpr" => Ok(Self::GaussianProcess),
            other => Err(EmbedError::UnknownModel(other.to_string())),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Uniform interface every supported regressor implements
pub trait Estimator: Send + Sync {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
    /// Effective hyperparameters, including defaults the user did not set
    fn params(&self) -> Map<String, Value>;
    /// Serialized model state for persistence
    fn to_json(&self) -> Result<Value>;
}

/// Construct an estimator from a JSON parameter map. Unknown keys are
/// ignored with a warning so search spaces can carry extra bookkeeping.
pub fn build(kind: ModelKind, params: &Map<String, Value>, seed: u64) -> Result<Box<dyn Estimator>> {
    let estimator: Box<dyn Estimator> = match kind {
        ModelKind::LinearRegression => Box::new(LinearRegression::from_params(params)?),
        ModelKind::Ridge => Box::new(RidgeRegression::from_params(params)?),
        ModelKind::Svr => Box::new(SvrRegressor::from_params(params)?),
        ModelKind::Knn => Box::new(KnnRegressor::from_params(params)?),
        ModelKind::RandomForest => Box::new(RandomForestRegressor::from_params(params, seed)?),
        ModelKind::GradientBoosting => Box::new(GradientBoostingRegressor::from_params(params, seed)?),
        ModelKind::GaussianProcess => Box::new(GaussianProcessRegressor::from_params(params)?),
    };
    Ok(estimator)
}

// ─── JSON parameter coercion helpers ───────────────────────────────────────────

pub(crate) fn param_f64(params: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid_param(key, params)),
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| invalid_param(key, params)),
        Some(_) => Err(invalid_param(key, params)),
    }
}

pub(crate) fn param_usize(params: &Map<String, Value>, key: &str, default: usize) -> Result<usize> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| v as usize)
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as usize))
            .ok_or_else(|| invalid_param(key, params)),
        Some(Value::String(s)) => s.parse::<usize>().map_err(|_| invalid_param(key, params)),
        Some(_) => Err(invalid_param(key, params)),
    }
}

pub(crate) fn param_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
    default: &'a str,
) -> Result<&'a str> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(invalid_param(key, params)),
    }
}

pub(crate) fn param_bool(params: &Map<String, Value>, key: &str, default: bool) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid_param(key, params)),
    }
}

fn invalid_param(key: &str, params: &Map<String, Value>) -> EmbedError {
    EmbedError::InvalidInput(format!(
        "invalid value for parameter {:?}: {:?}",
        key,
        params.get(key)
    ))
}

pub(crate) fn warn_unknown_keys(params: &Map<String, Value>, known: &[&str]) {
    for key in params.keys() {
        if !known.contains(&key.as_str()) {
            tracing::warn!("ignoring unknown hyperparameter {:?}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_model_kind_from_str() {
        assert_eq!(ModelKind::from_str("rfr").unwrap(), ModelKind::RandomForest);
        assert_eq!(ModelKind::from_str("gpr").unwrap(), ModelKind::GaussianProcess);
        assert!(matches!(
            ModelKind::from_str("not_a_model"),
            Err(EmbedError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_factory_builds_every_kind() {
        let params = Map::new();
        for name in ModelKind::all_names() {
            let kind = ModelKind::from_str(name).unwrap();
            assert!(build(kind, &params, 42).is_ok(), "failed to build {}", name);
        }
    }

    #[test]
    fn test_factory_fit_predict_contract() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0, 12.0];

        for name in ModelKind::all_names() {
            let kind = ModelKind::from_str(name).unwrap();
            let mut model = build(kind, &Map::new(), 42).unwrap();
            model.fit(&x, &y).unwrap();
            let preds = model.predict(&x).unwrap();
            assert_eq!(preds.len(), 6, "wrong prediction length for {}", name);
        }
    }

    #[test]
    fn test_param_coercion() {
        let params: Map<String, Value> = serde_json::from_str(
            r#"{"alpha": "0.5", "n_estimators": 20.0, "weights": "distance"}"#,
        )
        .unwrap();

        assert_eq!(param_f64(&params, "alpha", 1.0).unwrap(), 0.5);
        assert_eq!(param_usize(&params, "n_estimators", 100).unwrap(), 20);
        assert_eq!(param_str(&params, "weights", "uniform").unwrap(), "distance");
        assert_eq!(param_f64(&params, "missing", 2.0).unwrap(), 2.0);
    }
}
