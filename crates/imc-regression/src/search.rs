//! Hyperparameter selection by K-fold cross-validated grid search.
//!
//! Every (candidate, fold) pair is fitted independently and in parallel.
//! Candidates are ranked by mean held-out R²; the winner is refitted on the
//! full data set. Sample weights, when given, are used for fitting only.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::forest::{RandomForest, RandomForestParams};
use crate::metrics::r2_score;
use crate::regressor::{check_training_set, Regressor, RegressionError};

/// K-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for KFold {
    fn default() -> Self {
        Self {
            n_splits: 10,
            shuffle: true,
            seed: 0,
        }
    }
}

impl KFold {
    /// `(train, test)` index sets. The first `n % k` folds get one extra
    /// test sample.
    pub fn split(&self, n: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, RegressionError> {
        if self.n_splits < 2 || self.n_splits > n {
            return Err(RegressionError::InvalidHyperparameter(format!(
                "cannot make {} folds from {} samples",
                self.n_splits, n
            )));
        }
        let mut indices: Vec<usize> = (0..n).collect();
        if self.shuffle {
            indices.shuffle(&mut StdRng::seed_from_u64(self.seed));
        }
        let base = n / self.n_splits;
        let extra = n % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < extra);
            let test = indices[start..start + size].to_vec();
            let train = indices[..start]
                .iter()
                .chain(&indices[start + size..])
                .copied()
                .collect();
            folds.push((train, test));
            start += size;
        }
        Ok(folds)
    }
}

/// Values tried for each searched hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50],
            max_depth: vec![Some(30)],
            min_samples_leaf: vec![5],
        }
    }
}

impl ParamGrid {
    /// Cartesian product applied on top of `base`.
    pub fn candidates(&self, base: &RandomForestParams) -> Vec<RandomForestParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_leaf in &self.min_samples_leaf {
                    out.push(RandomForestParams {
                        n_estimators,
                        max_depth,
                        min_samples_leaf,
                        ..*base
                    });
                }
            }
        }
        out
    }
}

/// Score of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: RandomForestParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of [`GridSearch::fit`].
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best: CandidateScore,
    pub scores: Vec<CandidateScore>,
    /// Best candidate refitted on all samples.
    pub model: RandomForest,
}

/// Grid search over forest hyperparameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearch {
    pub grid: ParamGrid,
    pub folds: KFold,
    /// Settings not covered by the grid.
    pub base: RandomForestParams,
}

impl GridSearch {
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView2<'_, f64>,
        weights: Option<ArrayView1<'_, f64>>,
    ) -> Result<GridSearchResult, RegressionError> {
        check_training_set(x, y, weights)?;
        let candidates = self.grid.candidates(&self.base);
        if candidates.is_empty() {
            return Err(RegressionError::InvalidHyperparameter(
                "empty parameter grid".into(),
            ));
        }
        for c in &candidates {
            c.validate()?;
        }
        let folds = self.folds.split(x.nrows())?;
        log::info!(
            "Grid search: {} candidates x {} folds on {} samples",
            candidates.len(),
            folds.len(),
            x.nrows()
        );

        let jobs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let results: Vec<f64> = jobs
            .par_iter()
            .map(|&(c, f)| {
                let (train, test) = &folds[f];
                let w_train = weights.map(|w| w.select(Axis(0), train));
                let model = candidates[c].fit(
                    x.select(Axis(0), train).view(),
                    y.select(Axis(0), train).view(),
                    w_train.as_ref().map(|w| w.view()),
                )?;
                let y_hat = model.predict(x.select(Axis(0), test).view())?;
                r2_score(y.select(Axis(0), test).view(), y_hat.view())
            })
            .collect::<Result<_, _>>()?;

        let scores: Vec<CandidateScore> = candidates
            .iter()
            .enumerate()
            .map(|(c, params)| {
                let fold_scores = results[c * folds.len()..(c + 1) * folds.len()].to_vec();
                let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                CandidateScore {
                    params: *params,
                    fold_scores,
                    mean_score,
                }
            })
            .collect();

        // First candidate wins ties.
        let best = scores
            .iter()
            .fold(None::<&CandidateScore>, |best, s| match best {
                Some(b) if b.mean_score >= s.mean_score => Some(b),
                _ => Some(s),
            })
            .cloned()
            .ok_or_else(|| RegressionError::InvalidHyperparameter("no candidates".into()))?;

        log::info!(
            "Best: n_estimators={} max_depth={:?} min_samples_leaf={} (R² {:.4})",
            best.params.n_estimators,
            best.params.max_depth,
            best.params.min_samples_leaf,
            best.mean_score
        );

        let model = best.params.fit(x, y, weights)?;
        Ok(GridSearchResult {
            best,
            scores,
            model,
        })
    }
}
