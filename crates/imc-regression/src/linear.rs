//! Closed-form oxygen saturation by linear spectral unmixing.
//!
//! Absorbance at the camera bands is modelled as a linear combination of the
//! oxy- and deoxyhaemoglobin extinction spectra plus a constant offset:
//!
//! $$A(\lambda) = c_{HbO_2}\,\varepsilon_{HbO_2}(\lambda) + c_{Hb}\,\varepsilon_{Hb}(\lambda) + c_0$$
//!
//! The design matrix $H$ is fixed by the band wavelengths, so its
//! pseudo-inverse $(H^T H)^{-1} H^T$ is computed once at construction via a
//! `faer` LU factorisation of the normal equations. Saturation is
//! $c_{HbO_2} / (c_{HbO_2} + c_{Hb})$ clipped to `[0, 1]`.

use faer::linalg::solvers::SpSolver;
use imc_optics::extinction::ChromophoreTables;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::regressor::{check_features, Regressor, RegressionError};

const NR_COMPONENTS: usize = 3;

/// Fixed-design least squares unmixing of haemoglobin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSaO2Unmixing {
    wavelengths: Vec<f64>,
    /// Pseudo-inverse of the design matrix, `3 × nr_bands`.
    pinv: Array2<f64>,
}

impl LinearSaO2Unmixing {
    /// Build the unmixing for bands centred at `wavelengths` (m).
    pub fn new(wavelengths: &[f64]) -> Result<Self, RegressionError> {
        if wavelengths.len() < NR_COMPONENTS {
            return Err(RegressionError::ShapeMismatch(format!(
                "need at least {} bands, got {}",
                NR_COMPONENTS,
                wavelengths.len()
            )));
        }
        let h = design_matrix(wavelengths)?;
        let pinv = pseudo_inverse(&h)?;
        Ok(Self {
            wavelengths: wavelengths.to_vec(),
            pinv,
        })
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Least-squares `[c_HbO2, c_Hb, c_0]` per row, in scaled extinction
    /// units.
    pub fn coefficients(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError> {
        check_features(x, self.wavelengths.len())?;
        Ok(x.dot(&self.pinv.t()))
    }
}

/// `[εHbO2, εHb, 1]` per band, with both extinction columns divided by their
/// common maximum.
pub fn design_matrix(wavelengths: &[f64]) -> Result<Array2<f64>, RegressionError> {
    let tables = ChromophoreTables::shared()?;
    let mut h = Array2::ones((wavelengths.len(), NR_COMPONENTS));
    for (row, &wl) in wavelengths.iter().enumerate() {
        let (hbo2, hb) = tables.haemoglobin(wl)?;
        h[[row, 0]] = hbo2;
        h[[row, 1]] = hb;
    }
    let scale = h
        .slice(ndarray::s![.., ..2])
        .iter()
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    if scale > 0.0 {
        h.slice_mut(ndarray::s![.., ..2]).mapv_inplace(|v| v / scale);
    }
    Ok(h)
}

/// `(HᵀH)⁻¹ Hᵀ` for a tall, full-rank `h`.
fn pseudo_inverse(h: &Array2<f64>) -> Result<Array2<f64>, RegressionError> {
    let (rows, cols) = h.dim();
    let hth = h.t().dot(h);
    let normal = faer::Mat::<f64>::from_fn(cols, cols, |i, j| hth[[i, j]]);
    let lu = normal.partial_piv_lu();

    let mut pinv = Array2::zeros((cols, rows));
    for r in 0..rows {
        let rhs = faer::Col::<f64>::from_fn(cols, |i| h[[r, i]]);
        let sol = lu.solve(&rhs);
        for i in 0..cols {
            pinv[[i, r]] = sol[i];
        }
    }
    if pinv.iter().any(|v| !v.is_finite()) {
        return Err(RegressionError::LinearAlgebra(
            "normal equations are singular for these bands".into(),
        ));
    }
    Ok(pinv)
}

impl Regressor for LinearSaO2Unmixing {
    fn name(&self) -> &str {
        "linear_sao2_unmixing"
    }

    fn nr_features(&self) -> usize {
        self.wavelengths.len()
    }

    fn nr_outputs(&self) -> usize {
        1
    }

    /// Undefined saturation (both haemoglobin coefficients summing to zero)
    /// is reported as NaN.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError> {
        let c = self.coefficients(x)?;
        Ok(Array2::from_shape_fn((x.nrows(), 1), |(i, _)| {
            let (oxy, deoxy) = (c[[i, 0]], c[[i, 1]]);
            (oxy / (oxy + deoxy)).clamp(0.0, 1.0)
        }))
    }
}
