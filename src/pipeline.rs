//! End-to-end training orchestration

use std::time::Instant;

use ndarray::{Array1, Axis};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::augment;
use crate::config::TrainingRequest;
use crate::cross_validation::{self, train_test_split};
use crate::data;
use crate::error::{EmbedError, Result};
use crate::evaluate::{self, Evaluation, Inversion};
use crate::explain;
use crate::learning_curve;
use crate::persist::{ArtifactWriter, DatReport};
use crate::search;
use crate::transform::{FittedScaler, FittedTransform};

#[derive(Debug, Clone, Serialize)]
pub struct SplitMetrics {
    pub r2: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
}

impl From<&Evaluation> for SplitMetrics {
    fn from(eval: &Evaluation) -> Self {
        Self {
            r2: eval.r2,
            mse: eval.mse,
            rmse: eval.rmse,
            mae: eval.mae,
        }
    }
}

/// Serializable outcome handed back to the caller on success
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub done: bool,
    pub model: String,
    pub n_samples: usize,
    pub n_features: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub train: SplitMetrics,
    pub test: SplitMetrics,
    pub best_params: Option<Map<String, Value>>,
    pub timestamp: String,
    pub elapsed_seconds: f64,
    pub output_stem: String,
}

/// The invocation contract for failures
pub fn failure_summary(message: &str) -> Value {
    serde_json::json!({
        "done": false,
        "error": true,
        "message": message,
    })
}

fn prepare_labels(
    request: &TrainingRequest,
    y: &Array1<f64>,
) -> Result<(Array1<f64>, Option<FittedTransform>, Option<FittedScaler>)> {
    let (y, fitted_transform) = match request.ytransformation {
        Some(transform) => {
            let (transformed, fitted) = transform.apply(y)?;
            tracing::info!(transform = transform.name(), "labels transformed");
            (transformed, Some(fitted))
        }
        None => (y.to_owned(), None),
    };

    let (y, fitted_scaler) = match request.yscaling {
        Some(kind) => {
            let (scaled, fitted) = kind.fit_transform(&y);
            tracing::info!(scaler = kind.name(), "labels scaled");
            (scaled, Some(fitted))
        }
        None => (y, None),
    };

    Ok((y, fitted_transform, fitted_scaler))
}

/// Validate, load, train, evaluate, persist. Nothing is written to
/// disk until the request itself is known to be well-formed.
///
/// `n_jobs` bounds the worker threads used by the parallel fit and
/// predict paths; 0 leaves the global pool in charge.
pub fn run(request: &TrainingRequest, raw_request: Option<&Value>) -> Result<RunSummary> {
    request.validate()?;

    if request.n_jobs > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(request.n_jobs)
            .build()
            .map_err(|e| EmbedError::ComputationError(e.to_string()))?;
        return pool.install(|| run_inner(request, raw_request));
    }
    run_inner(request, raw_request)
}

fn run_inner(request: &TrainingRequest, raw_request: Option<&Value>) -> Result<RunSummary> {
    let started = Instant::now();

    let kind = request.model;
    tracing::info!(model = %kind, "starting training run");

    // Load features and labels
    let x = data::load_features(&request.vectors_file)?;
    let table = data::load_table(&request.training_file)?;
    let (labels, mask) = data::extract_labels(
        &table,
        &request.training_column_name_y,
        request.skip_invalid_y_values,
    )?;
    let (x, y) = data::filter_valid(&x, &labels, &mask)?;
    let (n_samples, n_features) = x.dim();
    tracing::info!(n_samples, n_features, "dataset loaded");

    // Label pipeline
    let (y, fitted_transform, fitted_scaler) = prepare_labels(request, &y)?;

    // Train/test split
    let (train_idx, test_idx) = train_test_split(n_samples, request.test_size, request.seed)?;
    let x_test = x.select(Axis(0), &test_idx);
    let y_test = Array1::from_iter(test_idx.iter().map(|&i| y[i]));
    let mut x_train = x.select(Axis(0), &train_idx);
    let mut y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));

    if request.bootstrap {
        let (xa, ya) = augment::augment(
            &x_train,
            &y_train,
            request.bootstrap_nsamples,
            request.noise_percentage,
            request.seed,
        )?;
        tracing::info!(
            n_before = train_idx.len(),
            n_after = xa.nrows(),
            noise_percentage = request.noise_percentage,
            "training split augmented"
        );
        x_train = xa;
        y_train = ya;
    }

    // Model selection and fit
    let writer = ArtifactWriter::new(request.output_stem());
    let outcome = search::run(request, &x_train, &y_train, Some(writer.stem()))?;

    // Score both splits in natural units
    let inversion = Inversion {
        scaler: if request.inverse_scaling {
            fitted_scaler.clone()
        } else {
            None
        },
        transform: if request.inverse_transform {
            fitted_transform.clone()
        } else {
            None
        },
        clamp_negative: request.clamp_negative_predictions,
    };
    let train_eval = evaluate::evaluate(outcome.estimator.as_ref(), &x_train, &y_train, &inversion)?;
    let test_eval = evaluate::evaluate(outcome.estimator.as_ref(), &x_test, &y_test, &inversion)?;
    tracing::info!(
        train_r2 = train_eval.r2,
        test_r2 = test_eval.r2,
        "evaluation finished"
    );

    // Artifacts
    if let Some(raw) = raw_request {
        writer.arguments(raw)?;
    } else {
        writer.arguments(&serde_json::to_value(request)?)?;
    }
    writer.parameters_user(&request.parameters)?;
    writer.parameters_trained(&outcome.estimator.params())?;
    writer.dat(&DatReport {
        train: (&train_eval).into(),
        test: (&test_eval).into(),
    })?;
    writer.model(&outcome.estimator.to_json()?, request.save_pretrained_model)?;

    let best_params = if request.fine_tune_model {
        if let Some(method) = request.grid_search_method {
            writer.best_params(method.name(), &outcome.best_params)?;
        }
        Some(outcome.best_params.clone())
    } else {
        None
    };

    // Effective parameters for the diagnostics below
    let mut diag_params = request.parameters.clone();
    if let Some(best) = &best_params {
        for (k, v) in best {
            diag_params.insert(k.clone(), v.clone());
        }
    }

    if request.cross_validation {
        let report = cross_validation::cross_validate(
            kind,
            &diag_params,
            &x_train,
            &y_train,
            request.cv_folds,
            request.seed,
            &inversion,
        )?;
        writer.cv_scores(&report)?;
        tracing::info!(
            n_folds = report.n_folds,
            test_r2 = report.test.r2.mean,
            "cross-validation finished"
        );
    }

    if request.learning_curve {
        let fractions = request.learning_curve_sizes();
        let curve = learning_curve::learning_curve(
            kind,
            &diag_params,
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &fractions,
            request.cv_folds,
            request.seed,
        )?;
        writer.learning_curve(&curve)?;
    }

    if request.analyse_shapley_values {
        let summary = explain::shap_summary(outcome.estimator.as_ref(), &x_train, request.seed)?;
        writer.shapely(&summary)?;
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let elapsed_seconds = started.elapsed().as_secs_f64();

    let summary = RunSummary {
        done: true,
        model: kind.name().to_string(),
        n_samples,
        n_features,
        n_train: x_train.nrows(),
        n_test: x_test.nrows(),
        train: (&train_eval).into(),
        test: (&test_eval).into(),
        best_params,
        timestamp,
        elapsed_seconds,
        output_stem: writer.stem().display().to_string(),
    };
    writer.results(&serde_json::to_value(&summary)?)?;

    tracing::info!(elapsed_seconds, "run complete");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_summary_contract() {
        let value = failure_summary("Model not implemented: xgboost");
        assert_eq!(value["done"], Value::Bool(false));
        assert_eq!(value["error"], Value::Bool(true));
        assert!(value["message"].as_str().unwrap().contains("xgboost"));
    }
}
