//! Piecewise-linear interpolation of tabulated spectra.
//!
//! Reference extinction spectra are published at discrete wavelengths.
//! Between knots the value is interpolated linearly; outside the knots the
//! interpolant refuses to answer rather than extrapolate.

use crate::provider::OpticsError;

/// A 1-D linear interpolant over strictly increasing knots.
#[derive(Debug, Clone)]
pub struct LinearInterpolant {
    /// Strictly increasing x values (knots).
    xs: Vec<f64>,
    /// Corresponding y values.
    ys: Vec<f64>,
}

impl LinearInterpolant {
    /// Construct an interpolant from data points.
    ///
    /// # Arguments
    /// * `xs` - Strictly increasing x values.
    /// * `ys` - Corresponding y values (same length as `xs`).
    ///
    /// # Errors
    /// Returns [`OpticsError::DataError`] if the lengths differ, fewer than
    /// two points are given, a value is not finite, or `xs` is not strictly
    /// increasing.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, OpticsError> {
        if xs.len() != ys.len() {
            return Err(OpticsError::DataError(format!(
                "xs and ys must have equal length ({} vs {})",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(OpticsError::DataError("need at least 2 data points".into()));
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(OpticsError::DataError("data contains non-finite values".into()));
        }
        for i in 1..xs.len() {
            if xs[i] <= xs[i - 1] {
                return Err(OpticsError::DataError(format!(
                    "xs must be strictly increasing at index {}",
                    i
                )));
            }
        }
        Ok(Self { xs, ys })
    }

    /// Build from `(x, y)` pairs in any order. The pairs are sorted by `x`.
    pub fn from_unsorted(mut pairs: Vec<(f64, f64)>) -> Result<Self, OpticsError> {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (xs, ys) = pairs.into_iter().unzip();
        Self::new(xs, ys)
    }

    /// Closed interval covered by the knots.
    pub fn range(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluate at `x`.
    ///
    /// # Errors
    /// [`OpticsError::OutOfRange`] if `x` lies outside [`range`](Self::range).
    pub fn evaluate(&self, x: f64) -> Result<f64, OpticsError> {
        let (min, max) = self.range();
        if !(x >= min && x <= max) {
            return Err(OpticsError::OutOfRange {
                wavelength_m: x,
                min,
                max,
            });
        }

        // Binary search for the enclosing interval
        let hi = self.xs.partition_point(|&k| k < x).max(1);
        let lo = hi - 1;
        if self.xs[hi] == x {
            return Ok(self.ys[hi]);
        }

        let t = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        Ok(self.ys[lo] + t * (self.ys[hi] - self.ys[lo]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_passes_through_knots() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![2.0, 3.0, 5.0, 4.0, 1.0];
        let interp = LinearInterpolant::new(xs.clone(), ys.clone()).unwrap();
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert_abs_diff_eq!(interp.evaluate(*x).unwrap(), *y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_midpoints_are_linear() {
        let interp = LinearInterpolant::new(vec![0.0, 10.0], vec![0.0, 30.0]).unwrap();
        assert_abs_diff_eq!(interp.evaluate(2.5).unwrap(), 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let interp = LinearInterpolant::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        assert!(matches!(interp.evaluate(1.5), Err(OpticsError::OutOfRange { .. })));
        assert!(interp.evaluate(-0.1).is_err());
        assert!(interp.evaluate(f64::NAN).is_err());
    }

    #[test]
    fn test_unsorted_pairs_are_sorted() {
        let interp =
            LinearInterpolant::from_unsorted(vec![(3.0, 9.0), (1.0, 3.0), (2.0, 6.0)]).unwrap();
        assert_eq!(interp.range(), (1.0, 3.0));
        assert_abs_diff_eq!(interp.evaluate(1.5).unwrap(), 4.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_duplicate_knots() {
        assert!(LinearInterpolant::new(vec![0.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]).is_err());
    }
}
