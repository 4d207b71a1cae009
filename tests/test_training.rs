//! Integration test: estimators and search strategies on shared data

use embedml::config::TrainingRequest;
use embedml::cross_validation::{cross_validate, cv_mean_r2};
use embedml::evaluate::Inversion;
use embedml::models::{build, ModelKind};
use embedml::search::{self, SearchMethod};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Map;

/// Noisy y = 4·x0 - 2·x1 + 1
fn noisy_linear(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 2), |_| rng.gen_range(-2.0..2.0));
    let y = Array1::from_iter(
        x.outer_iter()
            .map(|r| 4.0 * r[0] - 2.0 * r[1] + 1.0 + rng.gen_range(-0.05..0.05)),
    );
    (x, y)
}

#[test]
fn test_all_models_beat_mean_baseline() {
    let (x, y) = noisy_linear(80, 42);
    let mean = y.mean().unwrap();
    let baseline_mse =
        y.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / y.len() as f64;

    for name in ModelKind::all_names() {
        let kind: ModelKind = name.parse().unwrap();
        let mut model = build(kind, &Map::new(), 42).unwrap();
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();

        let mse = preds
            .iter()
            .zip(y.iter())
            .map(|(p, t)| (p - t) * (p - t))
            .sum::<f64>()
            / y.len() as f64;
        assert!(
            mse < baseline_mse,
            "{} did not beat the mean baseline: {} vs {}",
            name,
            mse,
            baseline_mse
        );
    }
}

#[test]
fn test_model_json_state_is_self_contained() {
    let (x, y) = noisy_linear(50, 1);
    let mut model = build(ModelKind::LinearRegression, &Map::new(), 42).unwrap();
    model.fit(&x, &y).unwrap();

    let state = model.to_json().unwrap();
    assert!(state.is_object());
    // Coefficients survive a serialize/deserialize cycle
    let restored: embedml::models::LinearRegression =
        serde_json::from_value(state).unwrap();
    let a = model.predict(&x).unwrap();
    let b = embedml::models::Estimator::predict(&restored, &x).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_cv_report_confidence_intervals_bracket_mean() {
    let (x, y) = noisy_linear(60, 3);
    let report = cross_validate(
        ModelKind::LinearRegression,
        &Map::new(),
        &x,
        &y,
        5,
        42,
        &Inversion::default(),
    )
    .unwrap();

    let r2 = &report.test.r2;
    assert!(r2.ci95.0 <= r2.mean && r2.mean <= r2.ci95.1);
    assert_eq!(r2.scores.len(), 5);
}

#[test]
fn test_grid_prefers_weak_regularization_on_clean_data() {
    let (x, y) = noisy_linear(60, 5);
    let request = TrainingRequest::new(ModelKind::Ridge)
        .with_fine_tuning(
            SearchMethod::GridSearchCV,
            serde_json::from_str(r#"{"alpha": [1e-6, 1000.0]}"#).unwrap(),
        )
        .with_cross_validation(4);

    let outcome = search::run(&request, &x, &y, None).unwrap();
    let alpha = outcome.best_params["alpha"].as_f64().unwrap();
    assert!(alpha < 1.0, "expected the weak penalty to win, got {}", alpha);
}

#[test]
fn test_cv_mean_r2_matches_direct_scoring() {
    let (x, y) = noisy_linear(40, 9);
    let score = cv_mean_r2(ModelKind::LinearRegression, &Map::new(), &x, &y, 4, 42).unwrap();
    assert!(score > 0.99, "cv mean r2 = {}", score);
}
