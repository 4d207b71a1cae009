//! Monte-Carlo feature attribution

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::models::Estimator;

/// Rows analysed per summary; keeps attribution cost bounded on large
/// training sets.
const MAX_EXPLAINED_ROWS: usize = 100;
/// Background draws per feature per row
const N_BACKGROUND_DRAWS: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapSummary {
    /// Mean |phi| per feature over the sampled rows
    pub feature_importances: Vec<f64>,
    /// Mean prediction over the background data
    pub base_value: f64,
    pub n_rows_analysed: usize,
}

/// Attribution for a single row: for each feature, the mean drop in
/// prediction when that feature is replaced by background draws.
fn explain_row(
    estimator: &dyn Estimator,
    row: &Array1<f64>,
    background: &Array2<f64>,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<f64>> {
    let n_features = row.len();
    let n_background = background.nrows();

    let own_pred = estimator.predict(&row.clone().insert_axis(Axis(0)))?[0];

    let mut phi = Vec::with_capacity(n_features);
    for feature in 0..n_features {
        // Batch the perturbed copies into one predict call
        let mut perturbed = Array2::zeros((N_BACKGROUND_DRAWS, n_features));
        for draw in 0..N_BACKGROUND_DRAWS {
            let source = rng.gen_range(0..n_background);
            for f in 0..n_features {
                perturbed[[draw, f]] = if f == feature {
                    background[[source, f]]
                } else {
                    row[f]
                };
            }
        }
        let preds = estimator.predict(&perturbed)?;
        let mean_perturbed = preds.mean().unwrap_or(own_pred);
        phi.push(own_pred - mean_perturbed);
    }

    Ok(phi)
}

/// Summarize per-feature attribution over a bounded sample of rows,
/// using the training data itself as the background distribution.
pub fn shap_summary(
    estimator: &dyn Estimator,
    x: &Array2<f64>,
    seed: u64,
) -> Result<ShapSummary> {
    let n = x.nrows();
    if n == 0 {
        return Err(EmbedError::DataError(
            "cannot explain an empty dataset".to_string(),
        ));
    }
    let n_features = x.ncols();

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let rows: Vec<usize> = if n > MAX_EXPLAINED_ROWS {
        (0..MAX_EXPLAINED_ROWS).map(|_| rng.gen_range(0..n)).collect()
    } else {
        (0..n).collect()
    };

    let base_value = estimator.predict(x)?.mean().unwrap_or(0.0);

    let mut totals = vec![0.0_f64; n_features];
    for &row_idx in &rows {
        let row = x.row(row_idx).to_owned();
        let phi = explain_row(estimator, &row, x, &mut rng)?;
        for (total, contribution) in totals.iter_mut().zip(phi.iter()) {
            *total += contribution.abs();
        }
    }

    let n_rows = rows.len();
    for total in &mut totals {
        *total /= n_rows as f64;
    }

    Ok(ShapSummary {
        feature_importances: totals,
        base_value,
        n_rows_analysed: n_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinearRegression;
    use ndarray::{Array1, Array2};
    use rand::Rng;

    #[test]
    fn test_informative_feature_dominates() {
        // y depends only on the first feature; the second is noise
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let x = Array2::from_shape_fn((80, 2), |_| rng.gen_range(-1.0..1.0));
        let y = Array1::from_iter(x.outer_iter().map(|r| 5.0 * r[0]));

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let summary = shap_summary(&model, &x, 42).unwrap();
        assert_eq!(summary.feature_importances.len(), 2);
        assert!(summary.feature_importances[0] > 10.0 * summary.feature_importances[1]);
    }

    #[test]
    fn test_row_cap_applies() {
        let x = Array2::from_shape_fn((300, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(300, |i| i as f64);

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let summary = shap_summary(&model, &x, 42).unwrap();
        assert_eq!(summary.n_rows_analysed, MAX_EXPLAINED_ROWS);
    }

    #[test]
    fn test_empty_rejected() {
        let model = LinearRegression::new();
        assert!(shap_summary(&model, &Array2::zeros((0, 2)), 42).is_err());
    }
}
