//! Training run configuration
//!
//! A single immutable `TrainingRequest` describes one training run end to
//! end and is threaded explicitly through every stage. Requests serialize
//! to/from JSON so the CLI can accept a payload file from the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{EmbedError, Result};
use crate::models::ModelKind;
use crate::search::SearchMethod;
use crate::transform::{ScalerKind, YTransform};

/// Where the label table comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Format tag; inferred from the extension when omitted
    #[serde(default)]
    pub filetype: Option<String>,
    /// Dataset key, used for HDF sources only
    #[serde(default)]
    pub key: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filetype: None,
            key: None,
        }
    }
}

fn default_test_size() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

fn default_n_jobs() -> usize {
    0
}

/// Full configuration for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    /// Which regressor to train
    pub model: ModelKind,

    /// User-supplied hyperparameters (passed through to the model factory)
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Whether to run a hyperparameter search instead of a direct fit
    #[serde(default)]
    pub fine_tune_model: bool,

    /// Search strategy, required when `fine_tune_model` is set
    #[serde(default)]
    pub grid_search_method: Option<SearchMethod>,

    /// Search space for tuned hyperparameters: name -> list of candidates
    #[serde(default)]
    pub fine_tuned_values: Map<String, Value>,

    /// Bound on randomized/sequential search trials
    #[serde(default)]
    pub n_trials: Option<usize>,

    /// Fraction of samples held out for the test split
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Bootstrap augmentation of the training split
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub bootstrap_nsamples: usize,
    /// Gaussian noise level as a percentage of |y|
    #[serde(default)]
    pub noise_percentage: f64,

    /// Scalar transform applied to y before training. Unknown names in a
    /// payload are demoted to no-transform rather than rejected.
    #[serde(default, deserialize_with = "crate::transform::lenient_transform")]
    pub ytransformation: Option<YTransform>,
    /// Scaler applied to y after the transform. Accepts both the short
    /// names and the sklearn-style class names; unknown names are
    /// demoted to no-scaling rather than rejected.
    #[serde(default, deserialize_with = "crate::transform::lenient_scaler")]
    pub yscaling: Option<ScalerKind>,
    /// Invert scaling/transform before computing metrics
    #[serde(default = "default_true")]
    pub inverse_scaling: bool,
    #[serde(default = "default_true")]
    pub inverse_transform: bool,

    #[serde(default)]
    pub cross_validation: bool,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    #[serde(default)]
    pub learning_curve: bool,
    /// Train-set fractions for the learning curve; defaults to 0.1..=1.0
    #[serde(default)]
    pub learning_curve_train_sizes: Vec<f64>,

    #[serde(default)]
    pub analyse_shapley_values: bool,

    /// Worker threads for the parallel fit/predict paths; 0 uses every
    /// available core
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Feature matrix (.npy), one row per sample
    pub vectors_file: PathBuf,
    /// Label table
    pub training_file: SourceFile,
    /// Target column in the label table
    pub training_column_name_y: String,
    /// Drop rows whose label fails coercion instead of aborting
    #[serde(default)]
    pub skip_invalid_y_values: bool,

    /// Base path for all output artifacts (extension is stripped)
    pub pre_trained_file: PathBuf,
    /// Also write a timestamped copy of the fitted model
    #[serde(default)]
    pub save_pretrained_model: bool,
    /// Clamp negative predictions to zero before scoring
    #[serde(default)]
    pub clamp_negative_predictions: bool,
}

impl Default for TrainingRequest {
    fn default() -> Self {
        Self {
            model: ModelKind::LinearRegression,
            parameters: Map::new(),
            fine_tune_model: false,
            grid_search_method: None,
            fine_tuned_values: Map::new(),
            n_trials: None,
            test_size: default_test_size(),
            bootstrap: false,
            bootstrap_nsamples: 0,
            noise_percentage: 0.0,
            ytransformation: None,
            yscaling: None,
            inverse_scaling: true,
            inverse_transform: true,
            cross_validation: false,
            cv_folds: default_cv_folds(),
            learning_curve: false,
            learning_curve_train_sizes: Vec::new(),
            analyse_shapley_values: false,
            n_jobs: default_n_jobs(),
            seed: default_seed(),
            vectors_file: PathBuf::new(),
            training_file: SourceFile::new(""),
            training_column_name_y: String::new(),
            skip_invalid_y_values: false,
            pre_trained_file: PathBuf::new(),
            save_pretrained_model: false,
            clamp_negative_predictions: false,
        }
    }
}

impl TrainingRequest {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_fine_tuning(mut self, method: SearchMethod, values: Map<String, Value>) -> Self {
        self.fine_tune_model = true;
        self.grid_search_method = Some(method);
        self.fine_tuned_values = values;
        self
    }

    pub fn with_bootstrap(mut self, n_samples: usize, noise_percentage: f64) -> Self {
        self.bootstrap = true;
        self.bootstrap_nsamples = n_samples;
        self.noise_percentage = noise_percentage;
        self
    }

    pub fn with_ytransformation(mut self, transform: YTransform) -> Self {
        self.ytransformation = Some(transform);
        self
    }

    pub fn with_yscaling(mut self, scaler: ScalerKind) -> Self {
        self.yscaling = Some(scaler);
        self
    }

    pub fn with_cross_validation(mut self, folds: usize) -> Self {
        self.cross_validation = true;
        self.cv_folds = folds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Load a request from a JSON payload file
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let request: TrainingRequest = serde_json::from_str(&text)?;
        request.validate()?;
        Ok(request)
    }

    /// Check invariants before any expensive work begins
    pub fn validate(&self) -> Result<()> {
        if self.fine_tune_model && self.grid_search_method.is_none() {
            return Err(EmbedError::ValidationError(
                "fine_tune_model requires grid_search_method".to_string(),
            ));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(EmbedError::ValidationError(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.cv_folds < 2 {
            return Err(EmbedError::ValidationError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.bootstrap && self.bootstrap_nsamples == 0 {
            return Err(EmbedError::ValidationError(
                "bootstrap requires bootstrap_nsamples > 0".to_string(),
            ));
        }
        if self.training_column_name_y.is_empty() {
            return Err(EmbedError::ValidationError(
                "training_column_name_y must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Output base path with any extension stripped
    pub fn output_stem(&self) -> PathBuf {
        self.pre_trained_file.with_extension("")
    }

    /// Learning-curve fractions, with the default grid when unset
    pub fn learning_curve_sizes(&self) -> Vec<f64> {
        if self.learning_curve_train_sizes.is_empty() {
            (1..=10).map(|i| i as f64 / 10.0).collect()
        } else {
            self.learning_curve_train_sizes.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_request() -> TrainingRequest {
        let mut req = TrainingRequest::new(ModelKind::Ridge);
        req.vectors_file = PathBuf::from("features.npy");
        req.training_file = SourceFile::new("labels.csv");
        req.training_column_name_y = "y".to_string();
        req.pre_trained_file = PathBuf::from("out/model.json");
        req
    }

    #[test]
    fn test_validate_ok() {
        assert!(minimal_request().validate().is_ok());
    }

    #[test]
    fn test_fine_tune_requires_method() {
        let mut req = minimal_request();
        req.fine_tune_model = true;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_test_size_bounds() {
        let mut req = minimal_request();
        req.test_size = 1.5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let req = minimal_request()
            .with_test_size(0.3)
            .with_ytransformation(YTransform::Log1p)
            .with_yscaling(ScalerKind::Quantile)
            .with_cross_validation(4);
        let json = serde_json::to_string(&req).unwrap();
        let back: TrainingRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.test_size, 0.3);
        assert_eq!(back.cv_folds, 4);
        assert!(matches!(back.ytransformation, Some(YTransform::Log1p)));
        assert!(matches!(back.yscaling, Some(ScalerKind::Quantile)));
    }

    fn request_with_yscaling(name: &str) -> TrainingRequest {
        let json = format!(
            r#"{{"model": "ridge", "vectors_file": "v.npy",
                 "training_file": {{"path": "l.csv"}},
                 "training_column_name_y": "y",
                 "pre_trained_file": "out/run.json",
                 "yscaling": "{}"}}"#,
            name
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_yscaling_accepts_listed_names() {
        // Payloads written from the info listing must parse
        assert!(matches!(
            request_with_yscaling("minmax").yscaling,
            Some(ScalerKind::MinMax)
        ));
        assert!(matches!(
            request_with_yscaling("QuantileTransformer").yscaling,
            Some(ScalerKind::Quantile)
        ));
        assert!(matches!(
            request_with_yscaling("PowerTransformer").yscaling,
            Some(ScalerKind::Power)
        ));
    }

    #[test]
    fn test_unknown_yscaling_is_passthrough() {
        let req = request_with_yscaling("NotAScaler");
        assert!(req.yscaling.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_output_stem_strips_extension() {
        let req = minimal_request();
        assert_eq!(req.output_stem(), PathBuf::from("out/model"));
    }

    #[test]
    fn test_default_learning_curve_sizes() {
        let req = minimal_request();
        let sizes = req.learning_curve_sizes();
        assert_eq!(sizes.len(), 10);
        assert!((sizes[0] - 0.1).abs() < 1e-12);
        assert!((sizes[9] - 1.0).abs() < 1e-12);
    }
}
