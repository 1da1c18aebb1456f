//! Camera-oriented post-processing of simulated batches.
//!
//! The array functions ([`fold_spectra`], [`interpolate_spectra`]) work on
//! `(instances, bands)` tables; the batch functions apply them to a
//! [`Batch`] in place and keep its wavelength vector in step with the
//! reflectance columns.
//!
//! Interpolation fails on any target outside the source wavelength range
//! instead of extrapolating or filling with NaN.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::batch::{Batch, BatchError};

/// Uniform sliding average along the band axis.
///
/// Output has the input's length; samples beyond either end count as zero,
/// so the first and last `window / 2` bands are attenuated.
pub fn fold_spectra(x: ArrayView2<'_, f64>, window: usize) -> Result<Array2<f64>, BatchError> {
    let nr_bands = x.ncols();
    if window == 0 || window > nr_bands {
        return Err(BatchError::InvalidArgument(format!(
            "fold window {} must lie in [1, {}]",
            window, nr_bands
        )));
    }
    let offset = (window - 1) / 2;
    let scale = 1.0 / window as f64;
    let mut out = Array2::zeros(x.raw_dim());
    for (src, mut dst) in x.outer_iter().zip(out.outer_iter_mut()) {
        for (i, v) in dst.iter_mut().enumerate() {
            let hi = i + offset;
            let mut acc = 0.0;
            for k in 0..window {
                if let Some(j) = hi.checked_sub(k) {
                    if j < nr_bands {
                        acc += src[j];
                    }
                }
            }
            *v = acc * scale;
        }
    }
    Ok(out)
}

/// Linear interpolation of every row from `source` to `targets`.
///
/// `source` may be in any order but must not repeat a wavelength. Every
/// target must lie within `[min(source), max(source)]`.
pub fn interpolate_spectra(
    source: ArrayView1<'_, f64>,
    x: ArrayView2<'_, f64>,
    targets: ArrayView1<'_, f64>,
) -> Result<Array2<f64>, BatchError> {
    if source.len() != x.ncols() {
        return Err(BatchError::ShapeMismatch(format!(
            "{} source wavelengths for {} bands",
            source.len(),
            x.ncols()
        )));
    }
    if source.len() < 2 {
        return Err(BatchError::InvalidArgument(
            "need at least two source wavelengths".into(),
        ));
    }

    let mut order: Vec<usize> = (0..source.len()).collect();
    order.sort_by(|&a, &b| source[a].total_cmp(&source[b]));
    let xs: Vec<f64> = order.iter().map(|&i| source[i]).collect();
    if xs.iter().any(|v| !v.is_finite()) || xs.windows(2).any(|w| w[1] <= w[0]) {
        return Err(BatchError::InvalidArgument(
            "source wavelengths must be finite and distinct".into(),
        ));
    }
    let (min, max) = (xs[0], xs[xs.len() - 1]);

    // Bracketing columns and weight of the upper one, per target.
    let mut stencil = Vec::with_capacity(targets.len());
    for &t in targets {
        if !(t >= min && t <= max) {
            return Err(BatchError::OutOfRange { target: t, min, max });
        }
        let k = xs.partition_point(|&v| v <= t).clamp(1, xs.len() - 1);
        let w = (t - xs[k - 1]) / (xs[k] - xs[k - 1]);
        stencil.push((order[k - 1], order[k], w));
    }

    let mut out = Array2::zeros((x.nrows(), targets.len()));
    for (src, mut dst) in x.outer_iter().zip(out.outer_iter_mut()) {
        for (v, &(lo, hi, w)) in dst.iter_mut().zip(&stencil) {
            *v = src[lo] * (1.0 - w) + src[hi] * w;
        }
    }
    Ok(out)
}

/// Fold every spectrum of `batch` in place.
pub fn fold_by_sliding_average(batch: &mut Batch, window: usize) -> Result<(), BatchError> {
    batch.reflectances = fold_spectra(batch.reflectances.view(), window)?;
    Ok(())
}

/// Resample every spectrum of `batch` onto `wavelengths`, in place.
pub fn interpolate_wavelengths(batch: &mut Batch, wavelengths: &[f64]) -> Result<(), BatchError> {
    let targets = Array1::from(wavelengths.to_vec());
    batch.reflectances = interpolate_spectra(
        batch.wavelengths.view(),
        batch.reflectances.view(),
        targets.view(),
    )?;
    batch.wavelengths = targets;
    Ok(())
}

/// Remove the given band indices, in place.
pub fn sortout_bands(batch: &mut Batch, bands: &[usize]) -> Result<(), BatchError> {
    let nr_bands = batch.nr_wavelengths();
    if let Some(&index) = bands.iter().find(|&&b| b >= nr_bands) {
        return Err(BatchError::InvalidBand { index, nr_bands });
    }
    let keep: Vec<usize> = (0..nr_bands).filter(|b| !bands.contains(b)).collect();
    batch.wavelengths = batch.wavelengths.select(Axis(0), &keep);
    batch.reflectances = batch.reflectances.select(Axis(1), &keep);
    Ok(())
}

/// `n` distinct instances drawn at random.
pub fn select_n<R: Rng + ?Sized>(batch: &Batch, n: usize, rng: &mut R) -> Result<Batch, BatchError> {
    if n > batch.nr_elements() {
        return Err(BatchError::InvalidArgument(format!(
            "cannot select {} of {} instances",
            n,
            batch.nr_elements()
        )));
    }
    let rows = rand::seq::index::sample(rng, batch.nr_elements(), n).into_vec();
    batch.select_rows(&rows)
}

/// A reordering of camera bands: entry `i` names the source band that ends
/// up at position `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct BandOrder(Vec<usize>);

impl BandOrder {
    pub fn new(order: Vec<usize>) -> Result<Self, BatchError> {
        let mut seen = vec![false; order.len()];
        for &i in &order {
            match seen.get_mut(i) {
                Some(s) if !*s => *s = true,
                Some(_) => {
                    return Err(BatchError::InvalidPermutation(format!("index {} repeated", i)))
                }
                None => {
                    return Err(BatchError::InvalidPermutation(format!(
                        "index {} out of range for {} bands",
                        i,
                        order.len()
                    )))
                }
            }
        }
        Ok(Self(order))
    }

    pub fn identity(nr_bands: usize) -> Self {
        Self((0..nr_bands).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Reorder the columns of `x`.
    pub fn apply(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, BatchError> {
        self.check_len(x.ncols())?;
        Ok(x.select(Axis(1), &self.0))
    }

    /// Reorder the bands of `batch` in place.
    pub fn apply_to_batch(&self, batch: &mut Batch) -> Result<(), BatchError> {
        self.check_len(batch.nr_wavelengths())?;
        batch.wavelengths = batch.wavelengths.select(Axis(0), &self.0);
        batch.reflectances = batch.reflectances.select(Axis(1), &self.0);
        Ok(())
    }

    fn check_len(&self, nr_bands: usize) -> Result<(), BatchError> {
        if nr_bands != self.len() {
            return Err(BatchError::InvalidPermutation(format!(
                "order has {} entries for {} bands",
                self.len(),
                nr_bands
            )));
        }
        Ok(())
    }
}

impl TryFrom<Vec<usize>> for BandOrder {
    type Error = BatchError;

    fn try_from(order: Vec<usize>) -> Result<Self, Self::Error> {
        BandOrder::new(order)
    }
}

impl From<BandOrder> for Vec<usize> {
    fn from(order: BandOrder) -> Self {
        order.0
    }
}

/// How a simulated batch is turned into camera measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Centre wavelengths of the camera bands (m).
    pub wavelengths: Vec<f64>,
    /// Sliding-average width in simulated samples; 1 disables folding.
    pub fold_window: usize,
    /// Camera band indices to drop.
    pub bands_to_sortout: Vec<usize>,
    /// Reordering applied after sort-out.
    pub band_order: Option<BandOrder>,
}

/// Fold, interpolate onto the camera bands, sort out and reorder.
pub fn camera_batch(batch: &Batch, settings: &CameraSettings) -> Result<Batch, BatchError> {
    let mut out = batch.clone();
    if settings.fold_window > 1 {
        fold_by_sliding_average(&mut out, settings.fold_window)?;
    }
    interpolate_wavelengths(&mut out, &settings.wavelengths)?;
    sortout_bands(&mut out, &settings.bands_to_sortout)?;
    if let Some(order) = &settings.band_order {
        order.apply_to_batch(&mut out)?;
    }
    log::info!(
        "Camera batch: {} instances, {} bands",
        out.nr_elements(),
        out.nr_wavelengths()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ramps() -> Array2<f64> {
        let row0 = Array::range(0.0, 30.0, 3.0);
        let row1 = Array::range(30.0, 60.0, 3.0);
        ndarray::stack(Axis(0), &[row0.view(), row1.view()]).unwrap()
    }

    fn ramp_batch() -> Batch {
        let mut batch = Batch::zeros(1, 2);
        batch
            .set_reflectances(Array::range(0.0, 10.0, 1.0), ramps())
            .unwrap();
        batch
    }

    #[test]
    fn test_fold_keeps_linear_interior() {
        let x = ramps();
        let folded = fold_spectra(x.view(), 3).unwrap();
        for r in 0..2 {
            for i in 1..9 {
                assert_abs_diff_eq!(folded[[r, i]], x[[r, i]], epsilon = 1e-12);
            }
        }
        // Zero padding at the edges.
        assert_abs_diff_eq!(folded[[0, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fold_even_window() {
        let x = array![[0.0, 2.0, 4.0, 6.0]];
        let folded = fold_spectra(x.view(), 2).unwrap();
        assert_abs_diff_eq!(folded[[0, 2]], 3.0, epsilon = 1e-12);
        assert!(fold_spectra(x.view(), 0).is_err());
        assert!(fold_spectra(x.view(), 5).is_err());
    }

    #[test]
    fn test_interpolation_reference_values() {
        let x = ramps();
        let source = Array::range(0.0, 10.0, 1.0);
        let out = interpolate_spectra(source.view(), x.view(), array![0.5, 5.5, 3.5].view()).unwrap();
        let expected = array![[1.5, 16.5, 10.5], [31.5, 46.5, 40.5]];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_interpolation_unsorted_source() {
        let source = array![2.0, 0.0, 1.0];
        let x = array![[20.0, 0.0, 10.0]];
        let out = interpolate_spectra(source.view(), x.view(), array![0.25, 2.0, 1.5].view()).unwrap();
        assert_abs_diff_eq!(out[[0, 0]], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 1]], 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 2]], 15.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolation_out_of_range_fails() {
        let x = ramps();
        let source = Array::range(0.0, 10.0, 1.0);
        for target in [-0.1, 9.5, f64::NAN] {
            let err = interpolate_spectra(source.view(), x.view(), array![1.0, target].view());
            assert!(matches!(err, Err(BatchError::OutOfRange { .. })));
        }
        // Exact end points are inside.
        assert!(interpolate_spectra(source.view(), x.view(), array![0.0, 9.0].view()).is_ok());
    }

    #[test]
    fn test_interpolation_rejects_duplicate_source() {
        let source = array![0.0, 1.0, 1.0];
        let x = array![[0.0, 1.0, 2.0]];
        assert!(interpolate_spectra(source.view(), x.view(), array![0.5].view()).is_err());
    }

    #[test]
    fn test_sortout_keeps_pairs() {
        let mut batch = ramp_batch();
        sortout_bands(&mut batch, &[0, 4, 4]).unwrap();
        assert_eq!(batch.nr_wavelengths(), 8);
        assert_eq!(batch.wavelengths()[3], 5.0);
        assert_eq!(batch.reflectances()[[0, 3]], 15.0);
        assert!(matches!(
            sortout_bands(&mut batch, &[8]),
            Err(BatchError::InvalidBand { index: 8, nr_bands: 8 })
        ));
    }

    #[test]
    fn test_select_n_distinct_rows() {
        let mut batch = Batch::zeros(1, 10);
        batch
            .set_reflectances(array![1.0], Array::range(0.0, 10.0, 1.0).insert_axis(Axis(1)))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let picked = select_n(&batch, 6, &mut rng).unwrap();
        let mut values: Vec<f64> = picked.reflectances().column(0).to_vec();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        assert_eq!(values.len(), 6);
        assert!(select_n(&batch, 11, &mut rng).is_err());
    }

    #[test]
    fn test_band_order() {
        assert!(BandOrder::new(vec![0, 0, 1]).is_err());
        assert!(BandOrder::new(vec![0, 3, 1]).is_err());
        let order = BandOrder::new(vec![2, 0, 1]).unwrap();
        let x = array![[10.0, 20.0, 30.0]];
        assert_eq!(order.apply(x.view()).unwrap(), array![[30.0, 10.0, 20.0]]);
        assert!(order.apply(array![[1.0, 2.0]].view()).is_err());

        let parsed: BandOrder = serde_json::from_str("[1, 0]").unwrap();
        assert_eq!(parsed.as_slice(), &[1, 0]);
        assert!(serde_json::from_str::<BandOrder>("[1, 1]").is_err());
    }

    #[test]
    fn test_camera_batch_pipeline() {
        let batch = ramp_batch();
        let settings = CameraSettings {
            wavelengths: vec![2.5, 4.5, 6.5, 8.0],
            fold_window: 3,
            bands_to_sortout: vec![3],
            band_order: Some(BandOrder::new(vec![2, 1, 0]).unwrap()),
        };
        let camera = camera_batch(&batch, &settings).unwrap();
        assert_eq!(camera.wavelengths().to_vec(), vec![6.5, 4.5, 2.5]);
        assert_abs_diff_eq!(camera.reflectances()[[0, 0]], 19.5, epsilon = 1e-12);
        assert_abs_diff_eq!(camera.reflectances()[[1, 2]], 37.5, epsilon = 1e-12);
        // Input untouched.
        assert_eq!(batch.nr_wavelengths(), 10);
    }
}
