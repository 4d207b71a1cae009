//! JSON artifact writing for the desktop consumer

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cross_validation::CvReport;
use crate::error::Result;
use crate::evaluate::Evaluation;
use crate::explain::ShapSummary;
use crate::learning_curve::LearningCurve;

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

/// Scatter arrays for one split of the parity plot
#[derive(Debug, Clone, Serialize)]
pub struct SplitData {
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
    pub y_linear_fit: Vec<f64>,
}

impl From<&Evaluation> for SplitData {
    fn from(eval: &Evaluation) -> Self {
        Self {
            y_true: eval.y_true.clone(),
            y_pred: eval.y_pred.clone(),
            y_linear_fit: eval.y_linear_fit.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatReport {
    pub train: SplitData,
    pub test: SplitData,
}

/// Writes the `<stem>.*.json` artifact family next to the requested
/// output location.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    stem: PathBuf,
}

impl ArtifactWriter {
    pub fn new(stem: impl Into<PathBuf>) -> Self {
        Self { stem: stem.into() }
    }

    pub fn stem(&self) -> &Path {
        &self.stem
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.stem.with_extension(suffix)
    }

    pub fn arguments(&self, raw_request: &Value) -> Result<()> {
        write_json(&self.path("arguments.json"), raw_request)
    }

    pub fn parameters_user(&self, params: &Map<String, Value>) -> Result<()> {
        write_json(&self.path("parameters.user.json"), params)
    }

    pub fn parameters_trained(&self, params: &Map<String, Value>) -> Result<()> {
        write_json(&self.path("parameters.trained.json"), params)
    }

    pub fn results(&self, results: &Value) -> Result<()> {
        write_json(&self.path("results.json"), results)
    }

    pub fn dat(&self, report: &DatReport) -> Result<()> {
        write_json(&self.path("dat.json"), report)
    }

    pub fn learning_curve(&self, curve: &LearningCurve) -> Result<()> {
        write_json(&self.path("learning_curve.json"), curve)
    }

    pub fn shapely(&self, summary: &ShapSummary) -> Result<()> {
        write_json(&self.path("shapely.json"), summary)
    }

    pub fn best_params(&self, method: &str, params: &Map<String, Value>) -> Result<()> {
        write_json(&self.path(&format!("{}.best_params.json", method)), params)
    }

    /// Merge the report into any existing scores file, keyed by fold
    /// count. Entries for other fold counts survive.
    pub fn cv_scores(&self, report: &CvReport) -> Result<()> {
        let path = self.path("cv_scores.json");

        let mut existing: Map<String, Value> = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.as_object().cloned())
                .unwrap_or_default()
        } else {
            Map::new()
        };

        existing.insert(report.n_folds.to_string(), serde_json::to_value(report)?);
        write_json(&path, &existing)
    }

    /// Serialized model state, with an optional timestamped copy for
    /// the pretrained archive.
    pub fn model(&self, state: &Value, timestamped_copy: bool) -> Result<PathBuf> {
        let path = self.path("model.json");
        write_json(&path, state)?;

        if timestamped_copy {
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
            let copy = self.path(&format!("{}.model.json", stamp));
            write_json(&copy, state)?;
        }

        Ok(path)
    }
}
