//! Hyperparameter search strategies

pub mod grid;
pub mod study;

use std::path::Path;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::TrainingRequest;
use crate::error::{EmbedError, Result};
use crate::models::{self, Estimator, ModelKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMethod {
    GridSearchCV,
    RandomizedSearchCV,
    Optuna,
}

impl SearchMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GridSearchCV => "GridSearchCV",
            Self::RandomizedSearchCV => "RandomizedSearchCV",
            Self::Optuna => "Optuna",
        }
    }

    pub fn all_names() -> &'static [&'static str] {
        &["GridSearchCV", "RandomizedSearchCV", "Optuna"]
    }
}

impl FromStr for SearchMethod {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GridSearchCV" => Ok(Self::GridSearchCV),
            "RandomizedSearchCV" => Ok(Self::RandomizedSearchCV),
            "Optuna" => Ok(Self::Optuna),
            other => Err(EmbedError::UnknownSearchMethod(other.to_string())),
        }
    }
}

/// One evaluated candidate, kept for the ranked report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: Map<String, Value>,
    pub score: f64,
    pub rank: usize,
}

pub struct SearchOutcome {
    pub estimator: Box<dyn Estimator>,
    pub best_params: Map<String, Value>,
    pub history: Vec<CandidateResult>,
}

/// Fixed parameters shared by every candidate. The GP kernel spec is
/// not a plain tuning parameter, so it is dropped from the sweep and
/// reinstated only for the final refit.
pub(crate) fn fixed_params(kind: ModelKind, params: &Map<String, Value>) -> Map<String, Value> {
    let mut fixed = params.clone();
    if kind == ModelKind::GaussianProcess {
        fixed.remove("kernel");
    }
    fixed
}

/// No tuning: build with the user's parameters and fit once.
pub fn direct_fit(
    kind: ModelKind,
    params: &Map<String, Value>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    seed: u64,
) -> Result<SearchOutcome> {
    let mut estimator = models::build(kind, params, seed)?;
    estimator.fit(x, y)?;
    let best_params = estimator.params();
    Ok(SearchOutcome {
        estimator,
        best_params,
        history: Vec::new(),
    })
}

/// Dispatch to the requested strategy. `output_stem` receives the side
/// artifacts (ranked grid CSV, resumable study state).
pub fn run(
    request: &TrainingRequest,
    x: &Array2<f64>,
    y: &Array1<f64>,
    output_stem: Option<&Path>,
) -> Result<SearchOutcome> {
    let kind = request.model;

    if !request.fine_tune_model {
        return direct_fit(kind, &request.parameters, x, y, request.seed);
    }

    let method = request
        .grid_search_method
        .ok_or_else(|| EmbedError::ValidationError("fine-tuning requires a search method".to_string()))?;

    match method {
        SearchMethod::GridSearchCV => grid::search(request, x, y, output_stem, false),
        SearchMethod::RandomizedSearchCV => grid::search(request, x, y, output_stem, true),
        SearchMethod::Optuna => study::search(request, x, y, output_stem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            SearchMethod::from_str("GridSearchCV").unwrap(),
            SearchMethod::GridSearchCV
        );
        assert!(matches!(
            SearchMethod::from_str("HalvingGridSearch"),
            Err(EmbedError::UnknownSearchMethod(_))
        ));
    }

    #[test]
    fn test_direct_fit_reports_params() {
        use ndarray::array;
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];

        let outcome = direct_fit(ModelKind::LinearRegression, &Map::new(), &x, &y, 42).unwrap();
        assert!(outcome.best_params.contains_key("fit_intercept"));
        assert!(outcome.history.is_empty());
    }
}
