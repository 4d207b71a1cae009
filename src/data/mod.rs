//! Data loading: label tables, feature matrices, validity filtering

pub mod features;
pub mod loader;

pub use features::{load_features, save_features};
pub use loader::{
    extract_labels, filter_valid, inspect, load_table, ColumnInfo, FileInfo, SourceFormat,
};
