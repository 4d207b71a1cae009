//! Exhaustive and randomized grid sweeps ranked by CV score

use std::fs::File;
use std::path::Path;

use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};

use super::{fixed_params, CandidateResult, SearchOutcome};
use crate::config::TrainingRequest;
use crate::cross_validation::cv_mean_r2;
use crate::error::{EmbedError, Result};
use crate::models;

/// Upper bound on randomized-search draws when the request does not
/// cap them itself.
const DEFAULT_RANDOM_DRAWS: usize = 60;

/// Cartesian product of the tuned axes. Scalar values count as a
/// single-point axis.
pub(crate) fn expand_grid(tuned: &Map<String, Value>) -> Vec<Map<String, Value>> {
    let mut combos: Vec<Map<String, Value>> = vec![Map::new()];

    for (key, raw) in tuned {
        let options: Vec<Value> = match raw {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        if options.is_empty() {
            continue;
        }

        let mut next = Vec::with_capacity(combos.len() * options.len());
        for combo in &combos {
            for option in &options {
                let mut extended = combo.clone();
                extended.insert(key.clone(), option.clone());
                next.push(extended);
            }
        }
        combos = next;
    }

    combos
}

fn write_ranked_csv(path: &Path, history: &[CandidateResult]) -> Result<()> {
    let ranks: Vec<u32> = history.iter().map(|c| c.rank as u32).collect();
    let scores: Vec<f64> = history.iter().map(|c| c.score).collect();
    let params: Vec<String> = history
        .iter()
        .map(|c| Value::Object(c.params.clone()).to_string())
        .collect();

    let mut df = df! {
        "rank" => ranks,
        "mean_test_r2" => scores,
        "params" => params,
    }
    .map_err(EmbedError::from)?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .map_err(EmbedError::from)?;
    Ok(())
}

/// Sweep the tuned grid, score every candidate by shuffled k-fold CV,
/// refit the winner on the full training split.
pub fn search(
    request: &TrainingRequest,
    x: &Array2<f64>,
    y: &Array1<f64>,
    output_stem: Option<&Path>,
    randomized: bool,
) -> Result<SearchOutcome> {
    let kind = request.model;
    let fixed = fixed_params(kind, &request.parameters);

    let mut candidates = expand_grid(&request.fine_tuned_values);
    if candidates.is_empty() || (candidates.len() == 1 && candidates[0].is_empty()) {
        return Err(EmbedError::SearchError(
            "fine_tuned_values is empty, nothing to search".to_string(),
        ));
    }

    if randomized {
        let cap = request.n_trials.unwrap_or(DEFAULT_RANDOM_DRAWS);
        if candidates.len() > cap {
            let mut rng = ChaCha8Rng::seed_from_u64(request.seed);
            candidates.shuffle(&mut rng);
            candidates.truncate(cap.max(1));
        }
    }

    tracing::info!(
        model = %kind,
        n_candidates = candidates.len(),
        randomized,
        "starting grid sweep"
    );

    let mut scored: Vec<(Map<String, Value>, f64)> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut params = fixed.clone();
        for (k, v) in &candidate {
            params.insert(k.clone(), v.clone());
        }

        let score = cv_mean_r2(kind, &params, x, y, request.cv_folds, request.seed)?;
        let shown = Value::Object(candidate.clone());
        tracing::debug!(score, params = %shown, "candidate scored");
        scored.push((candidate, score));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let history: Vec<CandidateResult> = scored
        .iter()
        .enumerate()
        .map(|(i, (params, score))| CandidateResult {
            params: params.clone(),
            score: *score,
            rank: i + 1,
        })
        .collect();

    if let Some(stem) = output_stem {
        let path = stem.with_extension("grid_search.csv");
        write_ranked_csv(&path, &history)?;
        tracing::info!(path = %path.display(), "ranked grid results written");
    }

    // Refit the best candidate over the user's full parameter set
    let (best_tuned, _) = scored
        .first()
        .ok_or_else(|| EmbedError::SearchError("no candidate was evaluated".to_string()))?;
    let mut best_params = request.parameters.clone();
    for (k, v) in best_tuned {
        best_params.insert(k.clone(), v.clone());
    }

    let mut estimator = models::build(kind, &best_params, request.seed)?;
    estimator.fit(x, y)?;

    Ok(SearchOutcome {
        estimator,
        best_params: best_tuned.clone(),
        history,
    })
}
