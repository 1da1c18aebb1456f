//! Turning camera batches into regression features and targets.
//!
//! Features are absorbance-like: reflectance is clipped to `[1e-5, 1]`,
//! normalised to unit L1 norm per sample (removing overall brightness),
//! log-transformed (`-ln`) and normalised to unit L2 norm. Training data can
//! be augmented by repetition (`magnification`) and multiplicative gaussian
//! noise before the transform.

use imc_core::batch::{Batch, LayerColumn};
use imc_core::postprocess::sortout_bands;
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::regressor::RegressionError;

/// Reflectance floor applied before the logarithm.
pub const MIN_REFLECTANCE: f64 = 1e-5;

/// A parameter column of one layer used as regression target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub layer: usize,
    pub column: LayerColumn,
}

impl TargetColumn {
    pub fn new(layer: usize, column: LayerColumn) -> Self {
        Self { layer, column }
    }

    pub fn label(&self) -> String {
        format!("layer{}.{}", self.layer, self.column.name())
    }
}

/// Options of [`preprocess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    /// Standard deviation of the multiplicative noise, as a fraction of the
    /// reflectance (0.05 adds 5 % noise).
    pub w_percent: f64,
    /// Number of noisy copies of every sample.
    pub magnification: usize,
    /// Band indices removed before the transform.
    pub bands_to_sortout: Vec<usize>,
    pub targets: Vec<TargetColumn>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            w_percent: 0.0,
            magnification: 1,
            bands_to_sortout: Vec::new(),
            targets: vec![TargetColumn::new(0, LayerColumn::SaO2)],
        }
    }
}

/// Features `X` and targets `y` of a simulated camera batch.
pub fn preprocess<R: Rng + ?Sized>(
    batch: &Batch,
    options: &PreprocessOptions,
    rng: &mut R,
) -> Result<(Array2<f64>, Array2<f64>), RegressionError> {
    if options.magnification == 0 {
        return Err(RegressionError::InvalidHyperparameter(
            "magnification must be at least 1".into(),
        ));
    }
    if !(options.w_percent >= 0.0 && options.w_percent.is_finite()) {
        return Err(RegressionError::InvalidHyperparameter(format!(
            "noise level {} must be non-negative",
            options.w_percent
        )));
    }
    if options.targets.is_empty() {
        return Err(RegressionError::InvalidHyperparameter("no targets".into()));
    }

    let mut working = batch.clone();
    sortout_bands(&mut working, &options.bands_to_sortout)?;

    let y = targets(&working, &options.targets)?;
    let (mut x, y) = if options.magnification > 1 {
        (
            tile_rows(working.reflectances().view(), options.magnification),
            tile_rows(y.view(), options.magnification),
        )
    } else {
        (working.reflectances().clone(), y)
    };

    if options.w_percent > 0.0 {
        add_multiplicative_noise(&mut x, options.w_percent, rng)?;
    }
    Ok((absorbance_features(x.view()), y))
}

/// Selected parameter columns, one row per instance.
pub fn targets(batch: &Batch, columns: &[TargetColumn]) -> Result<Array2<f64>, RegressionError> {
    let mut y = Array2::zeros((batch.nr_elements(), columns.len()));
    for (j, target) in columns.iter().enumerate() {
        let col = batch.column(target.layer, target.column).ok_or_else(|| {
            RegressionError::ShapeMismatch(format!(
                "batch has {} layers, target wants layer {}",
                batch.nr_layers(),
                target.layer
            ))
        })?;
        y.column_mut(j).assign(&col);
    }
    Ok(y)
}

/// `x ← x + N(0, w)·x`, element-wise.
pub fn add_multiplicative_noise<R: Rng + ?Sized>(
    x: &mut Array2<f64>,
    w: f64,
    rng: &mut R,
) -> Result<(), RegressionError> {
    let normal = Normal::new(0.0, w)
        .map_err(|e| RegressionError::InvalidHyperparameter(e.to_string()))?;
    x.mapv_inplace(|v| v + normal.sample(rng) * v);
    Ok(())
}

/// Clip, L1-normalise, `-ln`, L2-normalise every row.
pub fn absorbance_features(x: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut out = x.mapv(|v| v.clamp(MIN_REFLECTANCE, 1.0));
    for mut row in out.axis_iter_mut(Axis(0)) {
        let l1: f64 = row.sum();
        row.mapv_inplace(|v| -(v / l1).ln());
        let l2 = row.dot(&row).sqrt();
        if l2 > 0.0 {
            row.mapv_inplace(|v| v / l2);
        }
    }
    out
}

fn tile_rows(x: ArrayView2<'_, f64>, times: usize) -> Array2<f64> {
    let rows: Vec<usize> = (0..times).flat_map(|_| 0..x.nrows()).collect();
    x.select(Axis(0), &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use imc_core::generators::BatchKind;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn camera_batch(n: usize) -> Batch {
        let mut batch = BatchKind::Generic.create_parameters(n, 4);
        let refl = Array2::from_shape_fn((n, 5), |(i, b)| 0.1 + 0.01 * b as f64 + 0.001 * i as f64);
        batch
            .set_reflectances(Array1::linspace(500e-9, 700e-9, 5), refl)
            .unwrap();
        batch
    }

    #[test]
    fn test_features_are_unit_norm_and_scale_free() {
        let x = array![[0.1, 0.2, 0.3], [0.2, 0.4, 0.6]];
        let f = absorbance_features(x.view());
        for row in f.outer_iter() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
        // Brightness is normalised away.
        for (a, b) in f.row(0).iter().zip(f.row(1).iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_clipping_keeps_features_finite() {
        let x = array![[0.0, -0.1, 2.0]];
        let f = absorbance_features(x.view());
        assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_shapes_with_magnification_and_sortout() {
        let batch = camera_batch(8);
        let options = PreprocessOptions {
            w_percent: 0.05,
            magnification: 3,
            bands_to_sortout: vec![0, 4],
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let (x, y) = preprocess(&batch, &options, &mut rng).unwrap();
        assert_eq!(x.dim(), (24, 3));
        assert_eq!(y.dim(), (24, 1));
        let sao2 = batch.column(0, LayerColumn::SaO2).unwrap();
        assert_eq!(y[[8 + 5, 0]], sao2[5]);
        // Noise makes the copies differ.
        assert_ne!(x.row(5), x.row(8 + 5));
    }

    #[test]
    fn test_noise_free_is_deterministic() {
        let batch = camera_batch(4);
        let options = PreprocessOptions::default();
        let (a, _) = preprocess(&batch, &options, &mut StdRng::seed_from_u64(1)).unwrap();
        let (b, _) = preprocess(&batch, &options, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_multiple_targets_and_bad_layer() {
        let batch = camera_batch(3);
        let cols = [
            TargetColumn::new(0, LayerColumn::Bvf),
            TargetColumn::new(2, LayerColumn::D),
        ];
        let y = targets(&batch, &cols).unwrap();
        assert_eq!(y.dim(), (3, 2));
        assert_eq!(cols[1].label(), "layer2.d");
        assert!(targets(&batch, &[TargetColumn::new(5, LayerColumn::Bvf)]).is_err());
    }

    #[test]
    fn test_invalid_options() {
        let batch = camera_batch(3);
        let mut rng = StdRng::seed_from_u64(0);
        let zero_mag = PreprocessOptions { magnification: 0, ..Default::default() };
        assert!(preprocess(&batch, &zero_mag, &mut rng).is_err());
        let negative = PreprocessOptions { w_percent: -0.1, ..Default::default() };
        assert!(preprocess(&batch, &negative, &mut rng).is_err());
    }
}
