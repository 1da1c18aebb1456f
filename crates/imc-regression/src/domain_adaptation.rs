//! Importance weights for covariate shift between simulated domains.
//!
//! A forest is trained to tell source samples (label 0) from target samples
//! (label 1). Its leaf averages estimate `p(target | x)`, and the density
//! ratio used as a training weight for source sample `x` is
//!
//! $$w(x) = \frac{p(t \mid x)}{p(s \mid x)} \cdot \frac{n_s}{n_t}$$

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};

use crate::forest::RandomForestParams;
use crate::regressor::{Regressor, RegressionError};

/// Probabilities are kept away from 0 and 1 by this margin.
const PROBABILITY_MARGIN: f64 = 1e-3;

/// Density-ratio weights of the rows of `x_w` under a source/target
/// discriminator trained on `x_s` and `x_t`.
pub fn estimate_weights_random_forests(
    x_s: ArrayView2<'_, f64>,
    x_t: ArrayView2<'_, f64>,
    x_w: ArrayView2<'_, f64>,
    params: &RandomForestParams,
) -> Result<Array1<f64>, RegressionError> {
    if x_s.nrows() == 0 || x_t.nrows() == 0 {
        return Err(RegressionError::EmptyTrainingSet);
    }
    if x_s.ncols() != x_t.ncols() || x_s.ncols() != x_w.ncols() {
        return Err(RegressionError::ShapeMismatch(format!(
            "feature counts differ: source {}, target {}, weighted {}",
            x_s.ncols(),
            x_t.ncols(),
            x_w.ncols()
        )));
    }

    let x = concatenate(Axis(0), &[x_s.view(), x_t.view()])
        .map_err(|e| RegressionError::ShapeMismatch(e.to_string()))?;
    let labels = Array2::from_shape_fn((x.nrows(), 1), |(i, _)| {
        if i < x_s.nrows() {
            0.0
        } else {
            1.0
        }
    });
    let discriminator = params.fit(x.view(), labels.view(), None)?;
    let p_target = discriminator.predict(x_w)?;

    let prior = x_s.nrows() as f64 / x_t.nrows() as f64;
    let weights: Array1<f64> = p_target
        .column(0)
        .mapv(|p| {
            let p = p.clamp(PROBABILITY_MARGIN, 1.0 - PROBABILITY_MARGIN);
            p / (1.0 - p) * prior
        });

    log::info!(
        "Domain weights for {} samples: mean {:.3}, max {:.3}",
        weights.len(),
        weights.mean().unwrap_or(0.0),
        weights.iter().cloned().fold(0.0, f64::max)
    );
    Ok(weights)
}
