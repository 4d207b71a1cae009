//! Bootstrap augmentation of the training split

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{EmbedError, Result};

/// Resample (X, y) with replacement to exactly `n_samples` rows, then add
/// zero-mean Gaussian noise to each resampled label with standard deviation
/// `noise_percentage / 100 * |y|`.
pub fn augment(
    x: &Array2<f64>,
    y: &Array1<f64>,
    n_samples: usize,
    noise_percentage: f64,
    seed: u64,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let n = x.nrows();
    if n == 0 {
        return Err(EmbedError::InvalidInput(
            "cannot augment an empty dataset".to_string(),
        ));
    }
    if n != y.len() {
        return Err(EmbedError::ShapeError {
            expected: format!("y length = {}", n),
            actual: format!("y length = {}", y.len()),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let indices: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n)).collect();
    let x_boot = x.select(Axis(0), &indices);

    let y_boot: Vec<f64> = indices
        .iter()
        .map(|&i| {
            let value = y[i];
            let sigma = noise_percentage / 100.0 * value.abs();
            if sigma > 0.0 {
                // Normal::new only fails on non-finite sigma, excluded above
                let normal = Normal::new(0.0, sigma)
                    .map_err(|e| EmbedError::ComputationError(e.to_string()))?;
                Ok(value + normal.sample(&mut rng))
            } else {
                Ok(value)
            }
        })
        .collect::<Result<Vec<f64>>>()?;

    tracing::debug!(
        "augmented {} rows to {} with {}% noise",
        n,
        n_samples,
        noise_percentage
    );

    Ok((x_boot, Array1::from_vec(y_boot)))
}
