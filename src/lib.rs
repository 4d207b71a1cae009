//! embedml - training orchestrator for embedding-based property regression
//!
//! Takes a JSON training request, a precomputed feature matrix (`.npy`)
//! and a label table, trains one of the native regressors, and writes a
//! family of JSON artifacts next to the requested output location for a
//! desktop frontend to pick up.
//!
//! # Modules
//!
//! - [`config`] - The training request and its validation
//! - [`data`] - Feature matrix and label table loading
//! - [`transform`] - Label transformations and scalers
//! - [`augment`] - Bootstrap resampling with heteroscedastic noise
//! - [`models`] - Native regressors behind the [`models::Estimator`] trait
//! - [`search`] - Direct fit, grid/randomized sweeps and pruned studies
//! - [`evaluate`] - Metrics computed in natural units
//! - [`cross_validation`] - Shuffled k-fold scoring
//! - [`learning_curve`] - Scores over growing training fractions
//! - [`explain`] - Monte-Carlo feature attribution
//! - [`persist`] - The JSON artifact family
//! - [`pipeline`] - End-to-end orchestration
//! - [`cli`] - Command-line interface

pub mod error;

pub mod augment;
pub mod config;
pub mod cross_validation;
pub mod data;
pub mod evaluate;
pub mod explain;
pub mod learning_curve;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod search;
pub mod transform;

pub mod cli;

pub use error::{EmbedError, Result};

pub mod prelude {
    pub use crate::config::{SourceFile, TrainingRequest};
    pub use crate::error::{EmbedError, Result};
    pub use crate::models::{Estimator, ModelKind};
    pub use crate::pipeline::{run, RunSummary};
    pub use crate::search::SearchMethod;
    pub use crate::transform::{ScalerKind, YTransform};
}
