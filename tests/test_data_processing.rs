//! Integration test: label tables, feature matrices and row filtering

use embedml::config::SourceFile;
use embedml::data::{
    extract_labels, filter_valid, inspect, load_features, load_table, save_features,
};
use ndarray::{array, Array2};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, body: &str) -> SourceFile {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    SourceFile::new(path)
}

#[test]
fn test_features_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vecs.npy");

    let x = Array2::from_shape_fn((5, 3), |(i, j)| (i * 3 + j) as f64);
    save_features(&path, &x).unwrap();
    let loaded = load_features(&path).unwrap();
    assert_eq!(loaded, x);
}

#[test]
fn test_csv_labels_with_ranges() {
    let dir = TempDir::new().unwrap();
    let source = write_file(
        &dir,
        "labels.csv",
        "name,bp\nwater,100\nethanol,78.4\nmixture,60-80\n",
    );

    let df = load_table(&source).unwrap();
    let (labels, mask) = extract_labels(&df, "bp", false).unwrap();

    assert_eq!(mask, vec![true, true, true]);
    assert!((labels[0] - 100.0).abs() < 1e-12);
    assert!((labels[2] - 70.0).abs() < 1e-12);
}

#[test]
fn test_lenient_masks_bad_labels() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "labels.csv", "name,y\na,1.0\nb,unknown\nc,3.0\n");

    let df = load_table(&source).unwrap();
    assert!(extract_labels(&df, "y", false).is_err());

    let (labels, mask) = extract_labels(&df, "y", true).unwrap();
    assert_eq!(mask, vec![true, false, true]);
    assert!(labels[1].is_nan());
}

#[test]
fn test_smi_table_columns() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "mols.smi", "CCO 78.4\nCC 12.1\nC 2.5\n");

    let df = load_table(&source).unwrap();
    assert_eq!(df.height(), 3);
    let names = df.get_column_names();
    assert!(names.contains(&"SMILES"));
    assert!(names.contains(&"y"));
}

#[test]
fn test_filetype_override_beats_extension() {
    let dir = TempDir::new().unwrap();
    let mut source = write_file(&dir, "labels.dat", "a,b\n1,2\n");
    source.filetype = Some("csv".to_string());

    let df = load_table(&source).unwrap();
    assert_eq!(df.height(), 1);
    assert_eq!(df.width(), 2);
}

#[test]
fn test_zero_feature_rows_dropped() {
    let x = array![[1.0, 2.0], [0.0, 0.0], [3.0, 4.0]];
    let labels = vec![10.0, 20.0, 30.0];
    let mask = vec![true, true, true];

    let (x_valid, y_valid) = filter_valid(&x, &labels, &mask).unwrap();
    assert_eq!(x_valid.nrows(), 2);
    assert_eq!(y_valid, array![10.0, 30.0]);
}

#[test]
fn test_mask_and_zero_filter_combine() {
    let x = array![[1.0], [2.0], [0.0]];
    let labels = vec![1.0, f64::NAN, 3.0];
    let mask = vec![true, false, true];

    let (x_valid, y_valid) = filter_valid(&x, &labels, &mask).unwrap();
    assert_eq!(x_valid.nrows(), 1);
    assert_eq!(y_valid, array![1.0]);
}

#[test]
fn test_all_rows_invalid_is_error() {
    let x = array![[0.0], [0.0]];
    let labels = vec![1.0, 2.0];
    let mask = vec![true, true];
    assert!(filter_valid(&x, &labels, &mask).is_err());
}

#[test]
fn test_inspect_reports_shape() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "labels.csv", "name,y\na,1.0\nb,2.0\nc,3.0\n");

    let info = inspect(&source).unwrap();
    assert_eq!(info.rows, 3);
    assert_eq!(info.columns, 2);
    assert!(info.estimated_size_bytes > 0);
    assert_eq!(info.column_info[0].name, "name");
}

#[test]
fn test_unsupported_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let source = write_file(&dir, "labels.xlsx", "not a table");
    assert!(load_table(&source).is_err());
}
