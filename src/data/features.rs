//! Feature matrix I/O
//!
//! The feature matrix is a serialized `.npy` array, one row per sample,
//! aligned positionally with the label table before filtering.

use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::File;
use std::path::Path;

use crate::error::{EmbedError, Result};

/// Read a 2D f64 feature matrix from a `.npy` file
pub fn load_features(path: &Path) -> Result<Array2<f64>> {
    if !path.exists() {
        return Err(EmbedError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("feature file not found: {}", path.display()),
        )));
    }

    let file = File::open(path)?;
    let matrix = Array2::<f64>::read_npy(file)?;
    tracing::debug!(
        "loaded feature matrix {} x {} from {}",
        matrix.nrows(),
        matrix.ncols(),
        path.display()
    );
    Ok(matrix)
}

/// Write a feature matrix as `.npy`
pub fn save_features(path: &Path, matrix: &Array2<f64>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    matrix.write_npy(file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_npy_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.npy");

        let matrix = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        save_features(&path, &matrix).unwrap();

        let loaded = load_features(&path).unwrap();
        assert_eq!(loaded, matrix);
    }

    #[test]
    fn test_missing_file() {
        let err = load_features(Path::new("/nonexistent/vectors.npy")).unwrap_err();
        assert!(matches!(err, EmbedError::IoError(_)));
    }
}
