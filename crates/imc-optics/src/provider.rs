//! Optical property model traits.
//!
//! A tissue layer is described by physiological [`LayerParameters`]. The
//! models in this crate map those parameters and a wavelength onto the three
//! quantities a Monte Carlo light-transport engine consumes per layer:
//! absorption $\mu_a$, scattering $\mu_s$ and anisotropy $g$.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from optical property models.
#[derive(Debug, Error)]
pub enum OpticsError {
    #[error("Wavelength {wavelength_m:.4e} m is outside the data range [{min:.4e}, {max:.4e}] m")]
    OutOfRange {
        wavelength_m: f64,
        min: f64,
        max: f64,
    },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: String,
    },
}

/// Physiological and structural parameters of one tissue layer.
///
/// Not every model reads every field: [`UsgJacques`](crate::scattering::UsgJacques)
/// uses `a_ray`, `a_mie`, `b_mie` and `g`, while
/// [`UsgMie`](crate::scattering::UsgMie) derives `g` from `dsp` and `r`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerParameters {
    /// Blood volume fraction, dimensionless in [0, 1].
    pub bvf: f64,
    /// Oxygen saturation, dimensionless in [0, 1].
    pub sao2: f64,
    /// Bilirubin concentration (g/l).
    pub c_bili: f64,
    /// Rayleigh scattering amplitude at 500 nm (1/m), reduced scattering.
    pub a_ray: f64,
    /// Mie scattering amplitude at 500 nm (1/m), reduced scattering.
    pub a_mie: f64,
    /// Mie scattering power-law exponent.
    pub b_mie: f64,
    /// Volume fraction of spherical scatterers.
    pub dsp: f64,
    /// Scatterer radius (m).
    pub r: f64,
    /// Layer thickness (m).
    pub d: f64,
    /// Refractive index.
    pub n: f64,
    /// Anisotropy factor.
    pub g: f64,
}

impl Default for LayerParameters {
    fn default() -> Self {
        Self {
            bvf: 0.02,
            sao2: 0.7,
            c_bili: 0.0,
            a_ray: 0.0,
            a_mie: 20.0 * 100.0,
            b_mie: 1.286,
            dsp: 0.015,
            r: 0.4e-6,
            d: 500e-6,
            n: 1.36,
            g: 0.9,
        }
    }
}

impl LayerParameters {
    /// Check the ranges every model relies on.
    pub fn validate(&self) -> Result<(), OpticsError> {
        check_fraction("bvf", self.bvf)?;
        check_fraction("sao2", self.sao2)?;
        if !(self.g > -1.0 && self.g < 1.0) {
            return Err(OpticsError::InvalidParameter {
                name: "g",
                value: self.g,
                reason: "anisotropy must lie in (-1, 1)".into(),
            });
        }
        if !(self.d > 0.0) || !self.d.is_finite() {
            return Err(OpticsError::InvalidParameter {
                name: "d",
                value: self.d,
                reason: "thickness must be positive".into(),
            });
        }
        if !(self.n >= 1.0) {
            return Err(OpticsError::InvalidParameter {
                name: "n",
                value: self.n,
                reason: "refractive index must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), OpticsError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OpticsError::InvalidParameter {
            name,
            value,
            reason: "must lie in [0, 1]".into(),
        })
    }
}

/// Provides the absorption coefficient of a layer.
pub trait AbsorptionModel: Send + Sync {
    /// Human-readable name of this model.
    fn name(&self) -> &str;

    /// Absorption coefficient $\mu_a$ (1/m) at `wavelength_m`.
    fn absorption(&self, params: &LayerParameters, wavelength_m: f64) -> Result<f64, OpticsError>;
}

/// Provides the scattering coefficient and anisotropy of a layer.
pub trait ScatteringModel: Send + Sync {
    /// Human-readable name of this model.
    fn name(&self) -> &str;

    /// Scattering coefficient $\mu_s$ (1/m) and anisotropy $g$ at `wavelength_m`.
    fn scattering(
        &self,
        params: &LayerParameters,
        wavelength_m: f64,
    ) -> Result<(f64, f64), OpticsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_valid() {
        LayerParameters::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_saturation_above_one() {
        let params = LayerParameters { sao2: 1.2, ..Default::default() };
        assert!(matches!(
            params.validate(),
            Err(OpticsError::InvalidParameter { name: "sao2", .. })
        ));
    }

    #[test]
    fn test_rejects_isotropy_limit() {
        let params = LayerParameters { g: 1.0, ..Default::default() };
        assert!(params.validate().is_err());
    }
}
