//! Scattering coefficient and anisotropy models.
//!
//! Two parametrisations are available for general tissue layers:
//!
//! - [`UsgJacques`]: reduced scattering as a Rayleigh + Mie power law
//!   (S. L. Jacques, *Phys. Med. Biol.* **58**, R37, 2013),
//!   $\mu_s'(\lambda) = a_{ray} (\lambda/\lambda_0)^{-4} + a_{mie} (\lambda/\lambda_0)^{-b_{mie}}$
//!   with $\lambda_0 = 500$ nm, converted to $\mu_s = \mu_s' / (1 - g)$.
//! - [`UsgMie`]: monodisperse spheres evaluated with full Lorenz–Mie theory.
//!
//! [`UsgMuscle`] hard-codes an empirical power law for the muscle layer.

use crate::mie::mie_cross_section;
use crate::provider::{LayerParameters, OpticsError, ScatteringModel};
use crate::NM;

/// Reference wavelength of the power-law models (m).
pub const REFERENCE_WAVELENGTH: f64 = 500.0 * NM;

fn check_wavelength(wavelength_m: f64) -> Result<(), OpticsError> {
    if wavelength_m > 0.0 && wavelength_m.is_finite() {
        Ok(())
    } else {
        Err(OpticsError::InvalidParameter {
            name: "wavelength",
            value: wavelength_m,
            reason: "must be a positive length in metres".into(),
        })
    }
}

fn reduced_to_total(us_reduced: f64, g: f64) -> Result<f64, OpticsError> {
    if !(g < 1.0) {
        return Err(OpticsError::InvalidParameter {
            name: "g",
            value: g,
            reason: "reduced scattering is undefined for g >= 1".into(),
        });
    }
    Ok(us_reduced / (1.0 - g))
}

/// Rayleigh + Mie power-law scattering with a prescribed anisotropy.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsgJacques;

impl UsgJacques {
    /// Reduced scattering coefficient $\mu_s'$ (1/m).
    pub fn reduced_scattering(params: &LayerParameters, wavelength_m: f64) -> Result<f64, OpticsError> {
        check_wavelength(wavelength_m)?;
        let rel = wavelength_m / REFERENCE_WAVELENGTH;
        Ok(params.a_ray * rel.powi(-4) + params.a_mie * rel.powf(-params.b_mie))
    }
}

impl ScatteringModel for UsgJacques {
    fn name(&self) -> &str {
        "UsgJacques"
    }

    fn scattering(
        &self,
        params: &LayerParameters,
        wavelength_m: f64,
    ) -> Result<(f64, f64), OpticsError> {
        let us_reduced = Self::reduced_scattering(params, wavelength_m)?;
        Ok((reduced_to_total(us_reduced, params.g)?, params.g))
    }
}

/// Monodisperse spherical scatterers in a homogeneous medium.
///
/// The number density follows from the scatterer volume fraction `dsp` and
/// radius `r` of the layer: $N = dsp / (\tfrac{4}{3}\pi r^3)$, and
/// $\mu_s = N C_{sca}$.
#[derive(Debug, Clone, Copy)]
pub struct UsgMie {
    /// Refractive index of the scatterers.
    pub n_particle: f64,
    /// Refractive index of the surrounding cytoplasm.
    pub n_medium: f64,
}

impl Default for UsgMie {
    fn default() -> Self {
        Self {
            n_particle: 1.46,
            n_medium: 1.36,
        }
    }
}

impl ScatteringModel for UsgMie {
    fn name(&self) -> &str {
        "UsgMie"
    }

    fn scattering(
        &self,
        params: &LayerParameters,
        wavelength_m: f64,
    ) -> Result<(f64, f64), OpticsError> {
        check_wavelength(wavelength_m)?;
        if !(params.r > 0.0) {
            return Err(OpticsError::InvalidParameter {
                name: "r",
                value: params.r,
                reason: "scatterer radius must be positive".into(),
            });
        }
        let volume = 4.0 / 3.0 * std::f64::consts::PI * params.r.powi(3);
        let density = params.dsp / volume;
        let (c_sca, g) = mie_cross_section(params.r, wavelength_m, self.n_particle, self.n_medium);
        Ok((density * c_sca, g))
    }
}

/// Empirical muscle scattering, $\mu_s' = a (\lambda / 500\,\mathrm{nm})^{-b}$.
///
/// Layer parameters are ignored.
#[derive(Debug, Clone, Copy)]
pub struct UsgMuscle {
    /// Reduced scattering at 500 nm (1/m).
    pub a: f64,
    /// Power-law exponent.
    pub b: f64,
    /// Anisotropy.
    pub g: f64,
}

impl Default for UsgMuscle {
    fn default() -> Self {
        Self {
            a: 13.0 * 100.0,
            b: 0.926,
            g: 0.96,
        }
    }
}

impl ScatteringModel for UsgMuscle {
    fn name(&self) -> &str {
        "UsgMuscle"
    }

    fn scattering(
        &self,
        _params: &LayerParameters,
        wavelength_m: f64,
    ) -> Result<(f64, f64), OpticsError> {
        check_wavelength(wavelength_m)?;
        let us_reduced = self.a * (wavelength_m / REFERENCE_WAVELENGTH).powf(-self.b);
        Ok((reduced_to_total(us_reduced, self.g)?, self.g))
    }
}
