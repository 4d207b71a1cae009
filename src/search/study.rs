//! Sequential random-sampling study with median pruning

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{fixed_params, CandidateResult, SearchOutcome};
use crate::config::TrainingRequest;
use crate::cross_validation::k_fold_split;
use crate::error::{EmbedError, Result};
use crate::evaluate::mean_squared_error;
use crate::models;

const DEFAULT_N_TRIALS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    Complete,
    Pruned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub number: usize,
    pub params: Map<String, Value>,
    /// Mean CV MSE; present only for completed trials
    pub value: Option<f64>,
    /// Running objective after each fold
    pub intermediate: Vec<f64>,
    pub state: TrialState,
}

/// Prunes a trial whose running objective is worse than the median of
/// previously completed trials at the same fold, once enough history
/// exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianPruner {
    pub n_startup_trials: usize,
    pub n_warmup_steps: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 1,
        }
    }
}

impl MedianPruner {
    pub fn should_prune(&self, completed: &[&TrialResult], step: usize, value: f64) -> bool {
        if step < self.n_warmup_steps || completed.len() < self.n_startup_trials {
            return false;
        }

        let mut at_step: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.intermediate.get(step).copied())
            .collect();
        if at_step.is_empty() {
            return false;
        }

        at_step.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = at_step[at_step.len() / 2];
        value > median
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub pruner: MedianPruner,
}

impl Study {
    pub fn new() -> Self {
        Self {
            trials: Vec::new(),
            pruner: MedianPruner::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn completed(&self) -> Vec<&TrialResult> {
        self.trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect()
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.completed()
            .into_iter()
            .min_by(|a, b| {
                let av = a.value.unwrap_or(f64::INFINITY);
                let bv = b.value.unwrap_or(f64::INFINITY);
                av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

impl Default for Study {
    fn default() -> Self {
        Self::new()
    }
}

/// A two-number array is a continuous range, anything else a
/// categorical choice.
fn sample_param(raw: &Value, rng: &mut ChaCha8Rng) -> Value {
    match raw {
        Value::Array(items) if items.len() == 2 => {
            match (items[0].as_f64(), items[1].as_f64()) {
                (Some(low), Some(high)) if low < high => {
                    let both_int = items[0].is_i64() && items[1].is_i64();
                    if both_int {
                        let v = rng.gen_range(items[0].as_i64().unwrap()..=items[1].as_i64().unwrap());
                        Value::from(v)
                    } else {
                        Value::from(rng.gen_range(low..high))
                    }
                }
                _ => items[rng.gen_range(0..items.len())].clone(),
            }
        }
        Value::Array(items) if !items.is_empty() => items[rng.gen_range(0..items.len())].clone(),
        other => other.clone(),
    }
}

/// Run (or resume) a bounded study minimizing mean CV MSE, then refit
/// the best trial's parameters on the full training split.
pub fn search(
    request: &TrainingRequest,
    x: &Array2<f64>,
    y: &Array1<f64>,
    output_stem: Option<&Path>,
) -> Result<SearchOutcome> {
    let kind = request.model;
    let fixed = fixed_params(kind, &request.parameters);

    if request.fine_tuned_values.is_empty() {
        return Err(EmbedError::SearchError(
            "fine_tuned_values is empty, nothing to search".to_string(),
        ));
    }

    let study_path = output_stem.map(|stem| stem.with_extension("study.json"));
    let mut study = match &study_path {
        Some(path) if path.exists() => {
            let loaded = Study::load(path)?;
            tracing::info!(
                path = %path.display(),
                n_trials = loaded.trials.len(),
                "resuming existing study"
            );
            loaded
        }
        _ => Study::new(),
    };

    let target_trials = request.n_trials.unwrap_or(DEFAULT_N_TRIALS).max(1);
    let folds = k_fold_split(x.nrows(), request.cv_folds, request.seed)?;

    while study.trials.len() < target_trials {
        let number = study.trials.len();
        let mut rng = ChaCha8Rng::seed_from_u64(request.seed.wrapping_add(number as u64));

        let mut tuned = Map::new();
        for (key, raw) in &request.fine_tuned_values {
            tuned.insert(key.clone(), sample_param(raw, &mut rng));
        }

        let mut params = fixed.clone();
        for (k, v) in &tuned {
            params.insert(k.clone(), v.clone());
        }

        let mut fold_mse = Vec::with_capacity(request.cv_folds);
        let mut intermediate = Vec::with_capacity(request.cv_folds);
        let mut pruned = false;

        for (step, test_idx) in folds.iter().enumerate() {
            let train_idx: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != step)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();

            let x_train = x.select(Axis(0), &train_idx);
            let y_train = Array1::from_iter(train_idx.iter().map(|&i| y[i]));
            let x_test = x.select(Axis(0), test_idx);
            let y_test = Array1::from_iter(test_idx.iter().map(|&i| y[i]));

            let mut estimator = models::build(kind, &params, request.seed.wrapping_add(step as u64))?;
            estimator.fit(&x_train, &y_train)?;
            let y_pred = estimator.predict(&x_test)?;
            fold_mse.push(mean_squared_error(&y_test, &y_pred));

            let running = fold_mse.iter().sum::<f64>() / fold_mse.len() as f64;
            intermediate.push(running);

            if study.pruner.should_prune(&study.completed(), step, running) {
                tracing::debug!(trial = number, step, running, "trial pruned");
                pruned = true;
                break;
            }
        }

        let trial = if pruned {
            TrialResult {
                number,
                params: tuned,
                value: None,
                intermediate,
                state: TrialState::Pruned,
            }
        } else {
            let value = fold_mse.iter().sum::<f64>() / fold_mse.len() as f64;
            tracing::debug!(trial = number, value, "trial complete");
            TrialResult {
                number,
                params: tuned,
                value: Some(value),
                intermediate,
                state: TrialState::Complete,
            }
        };
        study.trials.push(trial);
    }

    if let Some(path) = &study_path {
        study.save(path)?;
        tracing::info!(path = %path.display(), "study state written");
    }

    let best = study
        .best_trial()
        .ok_or_else(|| EmbedError::SearchError("no trial completed".to_string()))?;
    let best_tuned = best.params.clone();
    let best_value = best.value;

    let history: Vec<CandidateResult> = {
        let mut completed: Vec<&TrialResult> = study.completed();
        completed.sort_by(|a, b| {
            let av = a.value.unwrap_or(f64::INFINITY);
            let bv = b.value.unwrap_or(f64::INFINITY);
            av.partial_cmp(&bv).unwrap_or(std::cmp::Ordering::Equal)
        });
        completed
            .iter()
            .enumerate()
            .map(|(i, t)| CandidateResult {
                params: t.params.clone(),
                score: t.value.unwrap_or(f64::INFINITY),
                rank: i + 1,
            })
            .collect()
    };

    let shown = Value::Object(best_tuned.clone());
    tracing::info!(best_mse = ?best_value, best_params = %shown, "study finished");

    let mut best_params = request.parameters.clone();
    for (k, v) in &best_tuned {
        best_params.insert(k.clone(), v.clone());
    }
    let mut estimator = models::build(kind, &best_params, request.seed)?;
    estimator.fit(x, y)?;

    Ok(SearchOutcome {
        estimator,
        best_params: best_tuned,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use crate::search::SearchMethod;
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    fn trial(number: usize, value: f64, intermediate: Vec<f64>) -> TrialResult {
        TrialResult {
            number,
            params: Map::new(),
            value: Some(value),
            intermediate,
            state: TrialState::Complete,
        }
    }

    #[test]
    fn test_pruner_respects_startup_and_warmup() {
        let pruner = MedianPruner {
            n_startup_trials: 2,
            n_warmup_steps: 1,
        };
        let t0 = trial(0, 1.0, vec![1.0, 1.0]);
        let completed = vec![&t0];

        // Too few completed trials
        assert!(!pruner.should_prune(&completed, 1, 100.0));

        let t1 = trial(1, 2.0, vec![2.0, 2.0]);
        let completed = vec![&t0, &t1];

        // Step below warmup
        assert!(!pruner.should_prune(&completed, 0, 100.0));
        // Worse than median at step 1
        assert!(pruner.should_prune(&completed, 1, 100.0));
        // Better than median at step 1
        assert!(!pruner.should_prune(&completed, 1, 0.5));
    }

    #[test]
    fn test_sample_param_range_and_choice() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let range: Value = serde_json::json!([0.0, 1.0]);
        for _ in 0..20 {
            let v = sample_param(&range, &mut rng).as_f64().unwrap();
            assert!((0.0..1.0).contains(&v));
        }

        let choice: Value = serde_json::json!(["a", "b", "c"]);
        let v = sample_param(&choice, &mut rng);
        assert!(["a", "b", "c"].contains(&v.as_str().unwrap()));

        let int_range: Value = serde_json::json!([1, 10]);
        let v = sample_param(&int_range, &mut rng).as_i64().unwrap();
        assert!((1..=10).contains(&v));
    }

    #[test]
    fn test_study_resume_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.study.json");

        let mut study = Study::new();
        study.trials.push(trial(0, 0.5, vec![0.5]));
        study.save(&path).unwrap();

        let loaded = Study::load(&path).unwrap();
        assert_eq!(loaded.trials.len(), 1);
        assert_eq!(loaded.best_trial().unwrap().value, Some(0.5));
    }

    #[test]
    fn test_search_improves_over_worst_candidate() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| 3.0 * i as f64);

        let mut request = TrainingRequest::new(ModelKind::Ridge)
            .with_fine_tuning(
                SearchMethod::Optuna,
                serde_json::from_str(r#"{"alpha": [1e-4, 10.0]}"#).unwrap(),
            )
            .with_cross_validation(3);
        request.n_trials = Some(10);

        let outcome = search(&request, &x, &y, None).unwrap();
        assert!(outcome.best_params.contains_key("alpha"));
        assert_eq!(outcome.history.first().map(|c| c.rank), Some(1));
    }
}
