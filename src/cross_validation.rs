//! Shuffled k-fold cross-validation

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EmbedError, Result};
use crate::evaluate::{self, Inversion};
use crate::models::{self, ModelKind};

/// Seeded shuffle split into train and held-out index sets.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(EmbedError::DataError(format!(
            "need at least 2 samples to split, got {}",
            n
        )));
    }
    if test_size <= 0.0 || test_size >= 1.0 {
        return Err(EmbedError::ValidationError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_size).round() as usize).clamp(1, n - 1);
    let test = indices.split_off(n - n_test);
    Ok((indices, test))
}

/// Shuffled fold index sets; the remainder rows go to the leading folds
/// so fold sizes differ by at most one.
pub fn k_fold_split(n: usize, k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(EmbedError::ValidationError(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if n < k {
        return Err(EmbedError::DataError(format!(
            "cannot split {} samples into {} folds",
            n, k
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let base = n / k;
    let remainder = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < remainder);
        folds.push(indices[start..start + size].to_vec());
        start += size;
    }
    Ok(folds)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    /// Sample standard deviation (ddof = 1)
    pub std: f64,
    pub ci95: (f64, f64),
    pub scores: Vec<f64>,
}

impl MetricSummary {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std = if scores.len() > 1 {
            (scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let half = 1.96 * std;
        Self {
            mean,
            std,
            ci95: (mean - half, mean + half),
            scores,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitSummary {
    pub r2: MetricSummary,
    pub mse: MetricSummary,
    pub rmse: MetricSummary,
    pub mae: MetricSummary,
}

impl SplitSummary {
    fn from_folds(r2: Vec<f64>, mse: Vec<f64>, mae: Vec<f64>) -> Self {
        // RMSE is aggregated from per-fold values, not from mean MSE
        let rmse: Vec<f64> = mse.iter().map(|m| m.sqrt()).collect();
        Self {
            r2: MetricSummary::from_scores(r2),
            mse: MetricSummary::from_scores(mse),
            rmse: MetricSummary::from_scores(rmse),
            mae: MetricSummary::from_scores(mae),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvReport {
    pub n_folds: usize,
    pub timestamp: String,
    pub test: SplitSummary,
    pub train: SplitSummary,
}

/// Run shuffled k-fold CV with a fresh estimator per fold.
pub fn cross_validate(
    kind: ModelKind,
    params: &Map<String, Value>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_folds: usize,
    seed: u64,
    inversion: &Inversion,
) -> Result<CvReport> {
    let folds = k_fold_split(x.nrows(), n_folds, seed)?;

    let mut test_r2 = Vec::with_capacity(n_folds);
    let mut test_mse = Vec::with_capacity(n_folds);
    let mut test_mae = Vec::with_capacity(n_folds);
    let mut train_r2 = Vec::with_capacity(n_folds);
    let mut train_mse = Vec::with_capacity(n_folds);
    let mut train_mae = Vec::with_capacity(n_folds);

    for held_out in 0..n_folds {
        let test_idx = &folds[held_out];
        let train_idx: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != held_out)
            .flat_map(|(_, f)| f.iter().copied())
            .collect();

        let x_train = x.select(Axis(0), &train_idx);
        let y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));
        let x_test = x.select(Axis(0), test_idx);
        let y_test = Array1::from_iter(test_idx.iter().map(|&i| y[i]));

        let mut estimator = models::build(kind, params, seed.wrapping_add(held_out as u64))?;
        estimator.fit(&x_train, &y_train)?;

        let test_eval = evaluate::evaluate(estimator.as_ref(), &x_test, &y_test, inversion)?;
        let train_eval = evaluate::evaluate(estimator.as_ref(), &x_train, &y_train, inversion)?;

        test_r2.push(test_eval.r2);
        test_mse.push(test_eval.mse);
        test_mae.push(test_eval.mae);
        train_r2.push(train_eval.r2);
        train_mse.push(train_eval.mse);
        train_mae.push(train_eval.mae);
    }

    Ok(CvReport {
        n_folds,
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        test: SplitSummary::from_folds(test_r2, test_mse, test_mae),
        train: SplitSummary::from_folds(train_r2, train_mse, train_mae),
    })
}

/// Mean held-out R² for a candidate parameter set, used by the search
/// strategies to rank candidates.
pub fn cv_mean_r2(
    kind: ModelKind,
    params: &Map<String, Value>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_folds: usize,
    seed: u64,
) -> Result<f64> {
    let folds = k_fold_split(x.nrows(), n_folds, seed)?;
    let mut total = 0.0;

    for held_out in 0..n_folds {
        let test_idx = &folds[held_out];
        let train_idx: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != held_out)
            .flat_map(|(_, f)| f.iter().copied())
            .collect();

        let x_train = x.select(Axis(0), &train_idx);
        let y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));
        let x_test = x.select(Axis(0), test_idx);
        let y_test = Array1::from_iter(test_idx.iter().map(|&i| y[i]));

        let mut estimator = models::build(kind, params, seed.wrapping_add(held_out as u64))?;
        estimator.fit(&x_train, &y_train)?;
        let y_pred = estimator.predict(&x_test)?;
        total += evaluate::r2_score(&y_test, &y_pred);
    }

    Ok(total / n_folds as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_deterministic() {
        let a = train_test_split(50, 0.3, 7).unwrap();
        let b = train_test_split(50, 0.3, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_k_fold_remainder_distribution() {
        // 10 rows over 3 folds: sizes 4, 3, 3
        let folds = k_fold_split(10, 3, 42).unwrap();
        assert_eq!(folds.iter().map(|f| f.len()).collect::<Vec<_>>(), vec![4, 3, 3]);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_few_samples_rejected() {
        assert!(k_fold_split(3, 5, 42).is_err());
        assert!(k_fold_split(10, 1, 42).is_err());
    }

    #[test]
    fn test_metric_summary_ddof1() {
        let summary = MetricSummary::from_scores(vec![1.0, 2.0, 3.0]);
        assert!((summary.mean - 2.0).abs() < 1e-12);
        assert!((summary.std - 1.0).abs() < 1e-12);
        assert!((summary.ci95.0 - (2.0 - 1.96)).abs() < 1e-12);
        assert!((summary.ci95.1 - (2.0 + 1.96)).abs() < 1e-12);
    }

    #[test]
    fn test_cross_validate_linear_data() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| 2.0 * i as f64 + 1.0);

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

        assert_eq!(report.n_folds, 5);
        assert!(report.test.r2.mean > 0.99);
        assert_eq!(report.test.rmse.scores.len(), 5);
        for (rmse, mse) in report.test.rmse.scores.iter().zip(report.test.mse.scores.iter()) {
            assert!((rmse - mse.sqrt()).abs() < 1e-12);
        }
    }
}
