//! Applying trained regressors to multispectral images.

use imc_optics::NM;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::artifact::TrainedModel;
use crate::metrics::r2_per_sample;
use crate::preprocess::absorbance_features;
use crate::regressor::{check_features, Regressor, RegressionError};

/// Largest band centre offset accepted between an image and a model (m).
pub const WAVELENGTH_TOLERANCE: f64 = 0.5 * NM;

/// A `(height, width, bands)` reflectance image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultispectralImage {
    pub data: Array3<f64>,
    /// Band centre wavelengths (m).
    pub wavelengths: Vec<f64>,
    /// Exposure per band (s), if the acquisition recorded it.
    pub integration_times: Option<Vec<f64>>,
}

impl MultispectralImage {
    pub fn new(data: Array3<f64>, wavelengths: Vec<f64>) -> Result<Self, RegressionError> {
        if data.dim().2 != wavelengths.len() {
            return Err(RegressionError::ShapeMismatch(format!(
                "{} bands for {} wavelengths",
                data.dim().2,
                wavelengths.len()
            )));
        }
        Ok(Self {
            data,
            wavelengths,
            integration_times: None,
        })
    }

    pub fn with_integration_times(mut self, times: Vec<f64>) -> Result<Self, RegressionError> {
        if times.len() != self.nr_bands() {
            return Err(RegressionError::ShapeMismatch(format!(
                "{} integration times for {} bands",
                times.len(),
                self.nr_bands()
            )));
        }
        if times.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(RegressionError::NonFinite("integration times"));
        }
        self.integration_times = Some(times);
        Ok(self)
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn nr_bands(&self) -> usize {
        self.data.dim().2
    }

    /// Divide every band by its integration time.
    ///
    /// Without recorded times this logs a warning and leaves the image
    /// unchanged. Afterwards the times are reset to one, so a second call
    /// has no effect.
    pub fn normalize_integration_times(&mut self) {
        let Some(times) = self.integration_times.as_mut() else {
            log::warn!("Image has no integration times; skipping normalisation");
            return;
        };
        for (mut band, t) in self.data.axis_iter_mut(Axis(2)).zip(times.iter_mut()) {
            band.mapv_inplace(|v| v / *t);
            *t = 1.0;
        }
    }

    /// Pixels as rows of a `(height * width, bands)` table.
    pub fn to_samples(&self) -> Array2<f64> {
        let (h, w, b) = self.data.dim();
        let mut out = Array2::zeros((h * w, b));
        for (mut row, pixel) in out.outer_iter_mut().zip(self.data.lanes(Axis(2))) {
            row.assign(&pixel);
        }
        out
    }

    /// Drop bands by index.
    pub fn sortout_bands(&mut self, bands: &[usize]) -> Result<(), RegressionError> {
        let nr_bands = self.nr_bands();
        if let Some(&index) = bands.iter().find(|&&b| b >= nr_bands) {
            return Err(imc_core::BatchError::InvalidBand { index, nr_bands }.into());
        }
        let keep: Vec<usize> = (0..nr_bands).filter(|b| !bands.contains(b)).collect();
        self.data = self.data.select(Axis(2), &keep);
        self.wavelengths = keep.iter().map(|&i| self.wavelengths[i]).collect();
        if let Some(times) = &self.integration_times {
            self.integration_times = Some(keep.iter().map(|&i| times[i]).collect());
        }
        Ok(())
    }
}

fn reshape_map(
    values: Array2<f64>,
    height: usize,
    width: usize,
) -> Result<Array3<f64>, RegressionError> {
    let nr_outputs = values.ncols();
    let flat: Vec<f64> = values.iter().copied().collect();
    Array3::from_shape_vec((height, width, nr_outputs), flat)
        .map_err(|e| RegressionError::ShapeMismatch(e.to_string()))
}

/// Parameter maps `(height, width, outputs)` from an inverse regressor.
///
/// Pixels are transformed with [`absorbance_features`], the same transform
/// used for training.
pub fn estimate_image(
    image: &MultispectralImage,
    regressor: &dyn Regressor,
) -> Result<Array3<f64>, RegressionError> {
    let features = absorbance_features(image.to_samples().view());
    check_features(features.view(), regressor.nr_features())?;
    let estimates = regressor.predict(features.view())?;
    log::info!(
        "Estimated {}x{} image with {}",
        image.height(),
        image.width(),
        regressor.name()
    );
    reshape_map(estimates, image.height(), image.width())
}

/// [`estimate_image`] with a persisted model, after checking that the image
/// bands are the ones the model was trained on.
pub fn estimate_image_with_model(
    image: &MultispectralImage,
    model: &TrainedModel,
) -> Result<Array3<f64>, RegressionError> {
    check_bands(&image.wavelengths, &model.wavelengths)?;
    estimate_image(image, &model.regressor)
}

fn check_bands(image: &[f64], model: &[f64]) -> Result<(), RegressionError> {
    if image.len() != model.len() {
        return Err(RegressionError::ShapeMismatch(format!(
            "image has {} bands, model was trained on {}",
            image.len(),
            model.len()
        )));
    }
    if let Some((i, (a, b))) = image
        .iter()
        .zip(model)
        .enumerate()
        .find(|(_, (a, b))| (*a - *b).abs() > WAVELENGTH_TOLERANCE)
    {
        return Err(RegressionError::ShapeMismatch(format!(
            "band {} is at {:.1} nm, model expects {:.1} nm",
            i,
            a / NM,
            b / NM
        )));
    }
    Ok(())
}

/// Per-pixel R² between measured features and those predicted by a forward
/// regressor from the estimated parameters.
pub fn reprojection_r2_map(
    image: &MultispectralImage,
    estimates: &Array3<f64>,
    forward: &dyn Regressor,
) -> Result<Array2<f64>, RegressionError> {
    let (h, w, p) = estimates.dim();
    if (h, w) != (image.height(), image.width()) {
        return Err(RegressionError::ShapeMismatch(format!(
            "estimates {}x{} for image {}x{}",
            h,
            w,
            image.height(),
            image.width()
        )));
    }
    let params: ArrayView2<'_, f64> = estimates
        .view()
        .into_shape_with_order((h * w, p))
        .map_err(|e| RegressionError::ShapeMismatch(e.to_string()))?;
    let measured = absorbance_features(image.to_samples().view());
    let reprojected = forward.predict(params)?;
    let r2 = r2_per_sample(measured.view(), reprojected.view())?;
    r2.into_shape_with_order((h, w))
        .map_err(|e| RegressionError::ShapeMismatch(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TrainedRegressor;
    use crate::linear::LinearSaO2Unmixing;
    use crate::preprocess::TargetColumn;
    use approx::assert_abs_diff_eq;
    use imc_core::LayerColumn;

    /// Ignores its input and returns a fixed row for every sample.
    struct FixedRow {
        spectrum: Vec<f64>,
    }

    impl Regressor for FixedRow {
        fn name(&self) -> &str {
            "fixed_row"
        }
        fn nr_features(&self) -> usize {
            self.spectrum.len()
        }
        fn nr_outputs(&self) -> usize {
            self.spectrum.len()
        }
        fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError> {
            Ok(Array2::from_shape_fn((x.nrows(), self.spectrum.len()), |(_, j)| self.spectrum[j]))
        }
    }

    fn image() -> MultispectralImage {
        let data = Array3::from_shape_fn((2, 3, 4), |(r, c, b)| 0.1 * (1 + b) as f64 + 0.01 * (r * 3 + c) as f64);
        MultispectralImage::new(data, vec![500e-9, 550e-9, 600e-9, 650e-9]).unwrap()
    }

    #[test]
    fn test_samples_follow_row_major_pixels() {
        let img = image();
        let samples = img.to_samples();
        assert_eq!(samples.dim(), (6, 4));
        assert_abs_diff_eq!(samples[[4, 2]], img.data[[1, 1, 2]]);
    }

    #[test]
    fn test_integration_time_normalisation() {
        let mut img = image().with_integration_times(vec![1.0, 2.0, 4.0, 8.0]).unwrap();
        let before = img.data[[0, 0, 3]];
        img.normalize_integration_times();
        assert_abs_diff_eq!(img.data[[0, 0, 3]], before / 8.0);
        img.normalize_integration_times();
        assert_abs_diff_eq!(img.data[[0, 0, 3]], before / 8.0);
    }

    #[test]
    fn test_missing_integration_times_is_noop() {
        let mut img = image();
        let before = img.clone();
        img.normalize_integration_times();
        assert_eq!(img, before);
    }

    #[test]
    fn test_estimate_shapes() {
        let img = image();
        let fixed = FixedRow { spectrum: vec![0.0; 4] };
        let maps = estimate_image(&img, &fixed).unwrap();
        assert_eq!(maps.dim(), (2, 3, 4));
    }

    #[test]
    fn test_model_bands_must_match_image() {
        let img = image();
        let model = |wavelengths: Vec<f64>| {
            let linear = LinearSaO2Unmixing::new(&wavelengths).unwrap();
            TrainedModel::new(
                wavelengths,
                vec![TargetColumn::new(0, LayerColumn::SaO2)],
                TrainedRegressor::LinearUnmixing(linear),
            )
            .unwrap()
        };

        let matching = model(vec![500.2e-9, 550e-9, 600e-9, 650e-9]);
        let maps = estimate_image_with_model(&img, &matching).unwrap();
        assert_eq!(maps.dim(), (2, 3, 1));

        let shifted = model(vec![510e-9, 560e-9, 610e-9, 660e-9]);
        assert!(matches!(
            estimate_image_with_model(&img, &shifted),
            Err(RegressionError::ShapeMismatch(_))
        ));

        let fewer = model(vec![500e-9, 550e-9, 600e-9]);
        assert!(matches!(
            estimate_image_with_model(&img, &fewer),
            Err(RegressionError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_perfect_reprojection_scores_one() {
        // All pixels share one spectral shape inside the (0, 1] clip range, so
        // one forward output fits all.
        let data = Array3::from_shape_fn((2, 2, 3), |(r, c, b)| {
            (1.0 + (r + c) as f64) / 4.0 * [0.2, 0.4, 0.5][b]
        });
        let img = MultispectralImage::new(data, vec![500e-9, 550e-9, 600e-9]).unwrap();
        let features = absorbance_features(img.to_samples().view());
        let forward = FixedRow { spectrum: features.row(0).to_vec() };
        let estimates = Array3::zeros((2, 2, 3));
        let r2 = reprojection_r2_map(&img, &estimates, &forward).unwrap();
        assert_eq!(r2.dim(), (2, 2));
        for v in r2.iter() {
            assert_abs_diff_eq!(*v, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sortout_keeps_bands_aligned() {
        let mut img = image().with_integration_times(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        img.sortout_bands(&[1]).unwrap();
        assert_eq!(img.wavelengths, vec![500e-9, 600e-9, 650e-9]);
        assert_eq!(img.integration_times, Some(vec![1.0, 3.0, 4.0]));
        assert_eq!(img.nr_bands(), 3);
        assert!(img.sortout_bands(&[3]).is_err());
        assert!(MultispectralImage::new(Array3::zeros((1, 1, 2)), vec![500e-9]).is_err());
    }
}
