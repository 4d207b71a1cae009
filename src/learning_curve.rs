//! Learning curves over growing training fractions

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cross_validation::MetricSummary;
use crate::error::{EmbedError, Result};
use crate::evaluate::r2_score;
use crate::models::{self, ModelKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningCurve {
    pub train_sizes: Vec<usize>,
    pub train_fractions: Vec<f64>,
    pub train_scores: Vec<MetricSummary>,
    pub test_scores: Vec<MetricSummary>,
}

/// Fit on deterministically subsampled fractions of the training split
/// and score R² on both splits, repeated over shuffled draws.
pub fn learning_curve(
    kind: ModelKind,
    params: &Map<String, Value>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    fractions: &[f64],
    repetitions: usize,
    seed: u64,
) -> Result<LearningCurve> {
    let n = x_train.nrows();
    if n < 2 {
        return Err(EmbedError::DataError(format!(
            "learning curve needs at least 2 training rows, got {}",
            n
        )));
    }
    let repetitions = repetitions.max(1);

    let mut train_sizes = Vec::with_capacity(fractions.len());
    let mut train_scores = Vec::with_capacity(fractions.len());
    let mut test_scores = Vec::with_capacity(fractions.len());

    for (fi, &fraction) in fractions.iter().enumerate() {
        if !(0.0..=1.0).contains(&fraction) || fraction == 0.0 {
            return Err(EmbedError::ValidationError(format!(
                "train fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        let size = ((n as f64 * fraction).round() as usize).clamp(2, n);
        train_sizes.push(size);

        let mut rep_train = Vec::with_capacity(repetitions);
        let mut rep_test = Vec::with_capacity(repetitions);

        for rep in 0..repetitions {
            let draw_seed = seed
                .wrapping_add((fi as u64) << 16)
                .wrapping_add(rep as u64);
            let mut indices: Vec<usize> = (0..n).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(draw_seed);
            indices.shuffle(&mut rng);
            indices.truncate(size);

            let x_sub = x_train.select(Axis(0), &indices);
            let y_sub = Array1::from_iter(indices.iter().map(|&i| y_train[i]));

            let mut estimator = models::build(kind, params, draw_seed)?;
            estimator.fit(&x_sub, &y_sub)?;

            rep_train.push(r2_score(&y_sub, &estimator.predict(&x_sub)?));
            rep_test.push(r2_score(y_test, &estimator.predict(x_test)?));
        }

        train_scores.push(MetricSummary::from_scores(rep_train));
        test_scores.push(MetricSummary::from_scores(rep_test));
    }

    Ok(LearningCurve {
        train_sizes,
        train_fractions: fractions.to_vec(),
        train_scores,
        test_scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 2.0 * i as f64 + 1.0);
        (x, y)
    }

    #[test]
    fn test_curve_shape_matches_fractions() {
        let (x_train, y_train) = linear_data(40);
        let (x_test, y_test) = linear_data(10);

        let fractions = [0.25, 0.5, 1.0];
        let curve = learning_curve(
            ModelKind::LinearRegression,
            &Map::new(),
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &fractions,
            3,
            42,
        )
        .unwrap();

        assert_eq!(curve.train_sizes, vec![10, 20, 40]);
        assert_eq!(curve.train_scores.len(), 3);
        assert_eq!(curve.test_scores.len(), 3);
        assert_eq!(curve.test_scores[0].scores.len(), 3);
    }

    #[test]
    fn test_linear_model_scores_high_everywhere() {
        let (x_train, y_train) = linear_data(30);
        let (x_test, y_test) = linear_data(8);

        let curve = learning_curve(
            ModelKind::LinearRegression,
            &Map::new(),
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &[0.5, 1.0],
            2,
            42,
        )
        .unwrap();

        for summary in &curve.test_scores {
            assert!(summary.mean > 0.99);
        }
    }

    #[test]
    fn test_bad_fraction_rejected() {
        let (x, y) = linear_data(10);
        assert!(learning_curve(
            ModelKind::LinearRegression,
            &Map::new(),
            &x,
            &y,
            &x,
            &y,
            &[0.0],
            1,
            42
        )
        .is_err());
    }
}
