//! Regressor trait and the crate error type.
//!
//! The [`Regressor`] trait isolates the estimation pipeline (scoring, image
//! estimation, reprojection) from the concrete model, so random forests and
//! the closed-form linear unmixing are interchangeable.

use imc_core::BatchError;
use imc_optics::OpticsError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors from training, applying or persisting regressors.
#[derive(Debug, Error)]
pub enum RegressionError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("Linear algebra failure: {0}")]
    LinearAlgebra(String),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Optics(#[from] OpticsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A fitted mapping from feature rows to output rows.
pub trait Regressor: Send + Sync {
    /// Short model name for reports.
    fn name(&self) -> &str;

    /// Number of input columns expected by [`predict`](Self::predict).
    fn nr_features(&self) -> usize;

    /// Number of output columns produced.
    fn nr_outputs(&self) -> usize;

    /// Predict one output row per input row.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError>;
}

/// Reject NaN and infinity; rows must be cleaned before training.
pub fn check_finite(x: ArrayView2<'_, f64>, what: &'static str) -> Result<(), RegressionError> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(RegressionError::NonFinite(what))
    }
}

/// Check the training inputs common to every model.
pub(crate) fn check_training_set(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
) -> Result<(), RegressionError> {
    if x.nrows() == 0 {
        return Err(RegressionError::EmptyTrainingSet);
    }
    if x.ncols() == 0 || y.ncols() == 0 {
        return Err(RegressionError::ShapeMismatch(format!(
            "{} features and {} targets; both must be non-empty",
            x.ncols(),
            y.ncols()
        )));
    }
    if x.nrows() != y.nrows() {
        return Err(RegressionError::ShapeMismatch(format!(
            "{} feature rows for {} target rows",
            x.nrows(),
            y.nrows()
        )));
    }
    check_finite(x, "features")?;
    check_finite(y, "targets")?;
    if let Some(w) = weights {
        if w.len() != x.nrows() {
            return Err(RegressionError::ShapeMismatch(format!(
                "{} weights for {} rows",
                w.len(),
                x.nrows()
            )));
        }
        if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(RegressionError::NonFinite("weights"));
        }
    }
    Ok(())
}

pub(crate) fn check_features(
    x: ArrayView2<'_, f64>,
    nr_features: usize,
) -> Result<(), RegressionError> {
    if x.ncols() != nr_features {
        return Err(RegressionError::ShapeMismatch(format!(
            "model expects {} features, got {}",
            nr_features,
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_training_set_checks() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![[0.5], [0.7]];
        assert!(check_training_set(x.view(), y.view(), None).is_ok());
        assert!(check_training_set(x.view(), y.slice(ndarray::s![..1, ..]), None).is_err());

        let bad = array![[1.0, f64::NAN], [3.0, 4.0]];
        assert!(matches!(
            check_training_set(bad.view(), y.view(), None),
            Err(RegressionError::NonFinite("features"))
        ));

        let w = array![1.0, -1.0];
        assert!(check_training_set(x.view(), y.view(), Some(w.view())).is_err());
    }

    #[test]
    fn test_empty_training_set() {
        let x = Array2::<f64>::zeros((0, 3));
        let y = Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            check_training_set(x.view(), y.view(), None),
            Err(RegressionError::EmptyTrainingSet)
        ));
    }
}
