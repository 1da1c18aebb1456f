//! Scores for regression output.
//!
//! [`r2_score`] is the usual coefficient of determination over samples,
//! averaged uniformly over output columns. [`r2_per_sample`] applies the
//! same formula along the columns of each row instead, giving one score per
//! sample (per image pixel when the columns are spectral bands):
//!
//! $$R^2_i = 1 - \frac{\sum_j (y_{ij} - \hat y_{ij})^2}{\sum_j (y_{ij} - \bar y_i)^2}$$

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::regressor::{check_features, Regressor, RegressionError};

fn check_same_shape(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Result<(), RegressionError> {
    if a.dim() != b.dim() {
        return Err(RegressionError::ShapeMismatch(format!(
            "{:?} vs {:?}",
            a.dim(),
            b.dim()
        )));
    }
    Ok(())
}

/// R² of one column. A constant target scores 1 if matched exactly and 0
/// otherwise.
fn r2_column(y: ArrayView1<'_, f64>, y_hat: ArrayView1<'_, f64>) -> f64 {
    let n = y.len() as f64;
    let mean = y.sum() / n;
    let ss_res: f64 = y.iter().zip(y_hat).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = y.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Coefficient of determination over samples, mean over outputs.
pub fn r2_score(y: ArrayView2<'_, f64>, y_hat: ArrayView2<'_, f64>) -> Result<f64, RegressionError> {
    check_same_shape(y, y_hat)?;
    if y.nrows() == 0 || y.ncols() == 0 {
        return Err(RegressionError::EmptyTrainingSet);
    }
    let total: f64 = y
        .axis_iter(Axis(1))
        .zip(y_hat.axis_iter(Axis(1)))
        .map(|(a, b)| r2_column(a, b))
        .sum();
    Ok(total / y.ncols() as f64)
}

/// Coefficient of determination of every row, computed along its columns.
///
/// Rows with zero variance follow the constant-target rule of
/// [`r2_score`].
pub fn r2_per_sample(
    y: ArrayView2<'_, f64>,
    y_hat: ArrayView2<'_, f64>,
) -> Result<Array1<f64>, RegressionError> {
    check_same_shape(y, y_hat)?;
    if y.ncols() == 0 {
        return Err(RegressionError::ShapeMismatch("no columns".into()));
    }
    Ok(y.outer_iter()
        .zip(y_hat.outer_iter())
        .map(|(a, b)| r2_column(a, b))
        .collect())
}

/// Median of `|y - y_hat|` over all entries.
pub fn median_absolute_error(
    y: ArrayView2<'_, f64>,
    y_hat: ArrayView2<'_, f64>,
) -> Result<f64, RegressionError> {
    check_same_shape(y, y_hat)?;
    let mut errors: Vec<f64> = y.iter().zip(y_hat).map(|(a, b)| (a - b).abs()).collect();
    median(&mut errors).ok_or(RegressionError::EmptyTrainingSet)
}

/// Median absolute error of `regressor` on a test set.
pub fn standard_score(
    regressor: &dyn Regressor,
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
) -> Result<f64, RegressionError> {
    check_features(x, regressor.nr_features())?;
    let y_hat = regressor.predict(x)?;
    median_absolute_error(y, y_hat.view())
}

/// Median; sorts `values` in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_r2_perfect_and_mean_predictor() {
        let y = array![[1.0], [2.0], [3.0], [4.0]];
        assert_abs_diff_eq!(r2_score(y.view(), y.view()).unwrap(), 1.0);
        let mean = array![[2.5], [2.5], [2.5], [2.5]];
        assert_abs_diff_eq!(r2_score(y.view(), mean.view()).unwrap(), 0.0);
    }

    #[test]
    fn test_r2_known_value() {
        // Textbook example: R² of [2.5, 0, 2, 8] against [3, -0.5, 2, 7] is 0.948608...
        let y = array![[3.0], [-0.5], [2.0], [7.0]];
        let y_hat = array![[2.5], [0.0], [2.0], [8.0]];
        assert_abs_diff_eq!(r2_score(y.view(), y_hat.view()).unwrap(), 0.9486081370449679, epsilon = 1e-12);
    }

    #[test]
    fn test_per_sample_matches_aggregate_on_one_pixel() {
        let spectrum = array![[3.0, -0.5, 2.0, 7.0]];
        let fitted = array![[2.5, 0.0, 2.0, 8.0]];
        let per_pixel = r2_per_sample(spectrum.view(), fitted.view()).unwrap();
        let aggregate = r2_score(spectrum.t(), fitted.t()).unwrap();
        assert_eq!(per_pixel.len(), 1);
        assert_abs_diff_eq!(per_pixel[0], aggregate, epsilon = 1e-15);
    }

    #[test]
    fn test_per_sample_scores_rows_independently() {
        let y = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let y_hat = array![[1.0, 2.0, 3.0], [2.0, 2.0, 2.0]];
        let r2 = r2_per_sample(y.view(), y_hat.view()).unwrap();
        assert_abs_diff_eq!(r2[0], 1.0);
        assert_abs_diff_eq!(r2[1], 0.0);
    }

    #[test]
    fn test_median_absolute_error() {
        let y = array![[0.1], [0.5], [0.9]];
        let y_hat = array![[0.2], [0.5], [0.6]];
        assert_abs_diff_eq!(median_absolute_error(y.view(), y_hat.view()).unwrap(), 0.1, epsilon = 1e-12);
        assert!(median_absolute_error(y.view(), array![[0.0, 1.0]].view()).is_err());
    }

    #[test]
    fn test_median_even_length() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut v), Some(2.5));
        assert_eq!(median(&mut []), None);
    }
}
