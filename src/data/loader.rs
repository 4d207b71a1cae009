//! Label table loading and row validation

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::Serialize;
use std::path::Path;

use crate::config::SourceFile;
use crate::error::{EmbedError, Result};

/// Supported label-table formats
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
    Json,
    Hdf { key: String },
    /// Whitespace-delimited SMILES list: no header, columns SMILES and y
    Smi,
}

impl SourceFormat {
    /// Resolve the format from an explicit tag, falling back to the extension
    pub fn resolve(source: &SourceFile) -> Result<Self> {
        let tag = match &source.filetype {
            Some(t) => t.clone(),
            None => source
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
        };

        match tag.as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            "hdf" | "h5" | "hdf5" => {
                let key = source.key.clone().ok_or_else(|| {
                    EmbedError::InvalidInput("hdf sources require a dataset key".to_string())
                })?;
                Ok(Self::Hdf { key })
            }
            "smi" => Ok(Self::Smi),
            other => Err(EmbedError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Load the label table into a DataFrame
pub fn load_table(source: &SourceFile) -> Result<DataFrame> {
    let format = SourceFormat::resolve(source)?;
    let path = &source.path;

    if !path.exists() {
        return Err(EmbedError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("training file not found: {}", path.display()),
        )));
    }

    let df = match format {
        SourceFormat::Csv => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.clone()))?
            .finish()?,
        SourceFormat::Parquet => ParquetReader::new(std::fs::File::open(path)?).finish()?,
        SourceFormat::Json => JsonReader::new(std::fs::File::open(path)?).finish()?,
        SourceFormat::Smi => read_smi(path)?,
        SourceFormat::Hdf { key } => read_hdf(path, &key)?,
    };

    tracing::debug!(
        "loaded label table {} rows x {} cols from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Whitespace-delimited SMILES list: first column the molecule, second the label
fn read_smi(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(false)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(b' ')
                .with_truncate_ragged_lines(true),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    if df.width() < 2 {
        return Err(EmbedError::DataError(format!(
            "smi file {} needs a SMILES and a label column, got {} columns",
            path.display(),
            df.width()
        )));
    }

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut df = df;
    df.rename(&names[0], "SMILES")?;
    df.rename(&names[1], "y")?;
    Ok(df)
}

#[cfg(feature = "hdf5-tables")]
fn read_hdf(path: &Path, key: &str) -> Result<DataFrame> {
    let file = hdf5::File::open(path).map_err(|e| EmbedError::DataError(e.to_string()))?;
    let group = file
        .group(key)
        .map_err(|e| EmbedError::DataError(format!("hdf key {:?}: {}", key, e)))?;

    let mut columns: Vec<Series> = Vec::new();
    for name in group
        .member_names()
        .map_err(|e| EmbedError::DataError(e.to_string()))?
    {
        let dataset = group
            .dataset(&name)
            .map_err(|e| EmbedError::DataError(e.to_string()))?;
        let values: Vec<f64> = dataset
            .read_1d::<f64>()
            .map_err(|e| EmbedError::DataError(e.to_string()))?
            .to_vec();
        columns.push(Series::new(&name, values));
    }

    DataFrame::new(columns).map_err(Into::into)
}

#[cfg(not(feature = "hdf5-tables"))]
fn read_hdf(_path: &Path, _key: &str) -> Result<DataFrame> {
    Err(EmbedError::UnsupportedFormat(
        "hdf tables require the hdf5-tables feature".to_string(),
    ))
}

/// Extract the label column as f64 values plus a per-row validity mask.
///
/// String labels are coerced per row; ranges like "188.0-189.0" are averaged.
/// With `lenient` set, rows that fail coercion are masked out; otherwise the
/// first failure aborts.
pub fn extract_labels(df: &DataFrame, column: &str, lenient: bool) -> Result<(Vec<f64>, Vec<bool>)> {
    let series = df
        .column(column)
        .map_err(|_| EmbedError::ColumnNotFound(column.to_string()))?;

    let mut values = Vec::with_capacity(series.len());
    let mut mask = Vec::with_capacity(series.len());

    if series.dtype().is_numeric() {
        let ca = series.cast(&DataType::Float64)?;
        for v in ca.f64()?.into_iter() {
            match v {
                Some(x) if x.is_finite() => {
                    values.push(x);
                    mask.push(true);
                }
                _ if lenient => {
                    values.push(f64::NAN);
                    mask.push(false);
                }
                _ => {
                    return Err(EmbedError::DataError(format!(
                        "null or non-finite label in column {:?}",
                        column
                    )))
                }
            }
        }
    } else {
        let ca = series.str().map_err(|_| {
            EmbedError::DataError(format!(
                "column {:?} is neither numeric nor string",
                column
            ))
        })?;
        for v in ca.into_iter() {
            match v.and_then(coerce_label) {
                Some(x) => {
                    values.push(x);
                    mask.push(true);
                }
                None if lenient => {
                    values.push(f64::NAN);
                    mask.push(false);
                }
                None => {
                    return Err(EmbedError::DataError(format!(
                        "could not coerce label {:?} in column {:?}",
                        v.unwrap_or(""),
                        column
                    )))
                }
            }
        }
    }

    let dropped = mask.iter().filter(|&&m| !m).count();
    if dropped > 0 {
        tracing::warn!("{} labels failed coercion and will be dropped", dropped);
    }

    Ok((values, mask))
}

/// Parse one label string; ranges "a-b" are averaged
fn coerce_label(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return v.is_finite().then_some(v);
    }

    // A '-' past the first character separates a range (not a minus sign)
    if trimmed.len() < 2 {
        return None;
    }
    if let Some(sep) = trimmed[1..].find('-').map(|i| i + 1) {
        let lo = trimmed[..sep].trim().parse::<f64>().ok()?;
        let hi = trimmed[sep + 1..].trim().parse::<f64>().ok()?;
        let mean = (lo + hi) / 2.0;
        return mean.is_finite().then_some(mean);
    }

    None
}

/// Drop rows whose feature vector is entirely zero or whose label is masked
/// out, in one vectorized pass. The surviving X and y lengths always match.
pub fn filter_valid(
    x: &Array2<f64>,
    labels: &[f64],
    label_mask: &[bool],
) -> Result<(Array2<f64>, Array1<f64>)> {
    if x.nrows() != labels.len() || labels.len() != label_mask.len() {
        return Err(EmbedError::ShapeError {
            expected: format!("{} rows", x.nrows()),
            actual: format!("{} labels, {} mask entries", labels.len(), label_mask.len()),
        });
    }

    let keep: Vec<usize> = (0..x.nrows())
        .filter(|&i| label_mask[i] && x.row(i).iter().any(|&v| v != 0.0))
        .collect();

    let dropped = x.nrows() - keep.len();
    if dropped > 0 {
        tracing::info!("dropped {} invalid rows ({} remain)", dropped, keep.len());
    }
    if keep.is_empty() {
        return Err(EmbedError::DataError(
            "no valid rows remain after filtering".to_string(),
        ));
    }

    let x_valid = x.select(Axis(0), &keep);
    let y_valid = Array1::from_vec(keep.iter().map(|&i| labels[i]).collect());
    Ok((x_valid, y_valid))
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Summary of a label table, for the inspect command
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub rows: usize,
    pub columns: usize,
    pub estimated_size_bytes: usize,
    pub column_info: Vec<ColumnInfo>,
}

/// Inspect a label table without loading features
pub fn inspect(source: &SourceFile) -> Result<FileInfo> {
    let df = load_table(source)?;

    let column_info = df
        .get_columns()
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            dtype: format!("{:?}", c.dtype()),
            null_count: c.null_count(),
        })
        .collect();

    Ok(FileInfo {
        rows: df.height(),
        columns: df.width(),
        estimated_size_bytes: df.estimated_size(),
        column_info,
    })
}
