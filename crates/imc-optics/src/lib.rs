//! # IMC Optics
//!
//! Optical property models for layered tissue. Every model implements either
//! [`AbsorptionModel`](provider::AbsorptionModel) (returning $\mu_a$) or
//! [`ScatteringModel`](provider::ScatteringModel) (returning $(\mu_s, g)$)
//! for a given [`LayerParameters`](provider::LayerParameters) and wavelength.
//!
//! All lengths are SI: wavelengths and thicknesses in metres, coefficients
//! in inverse metres. Conversion to the centimetre units of the Monte Carlo
//! engine happens only when the engine input file is written.
//!
//! ## Available models
//!
//! | Model | Module | Kind |
//! |-------|--------|------|
//! | Haemoglobin + bilirubin + β-carotene | [`absorption::Ua`] | absorption |
//! | Fixed-blood muscle | [`absorption::UaMuscle`] | absorption |
//! | Rayleigh + Mie power law | [`scattering::UsgJacques`] | scattering |
//! | Lorenz–Mie spheres | [`scattering::UsgMie`] | scattering |
//! | Muscle power law | [`scattering::UsgMuscle`] | scattering |
//!
//! ## Reference data
//!
//! Molar extinction spectra are embedded at compile time
//! ([`extinction`]) and linearly interpolated ([`interp::LinearInterpolant`]).
//! Requests outside the tabulated range fail with
//! [`OpticsError::OutOfRange`](provider::OpticsError::OutOfRange); there is
//! no extrapolation.

pub mod absorption;
pub mod extinction;
pub mod interp;
pub mod mie;
pub mod provider;
pub mod scattering;

pub use provider::{AbsorptionModel, LayerParameters, OpticsError, ScatteringModel};

/// Nanometres to metres.
pub const NM: f64 = 1e-9;

/// Micrometres to metres.
pub const UM: f64 = 1e-6;
