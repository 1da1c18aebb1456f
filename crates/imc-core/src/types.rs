//! Core types shared across the simulation pipeline.
//!
//! This module defines the per-layer optical description handed to the
//! Monte Carlo engine, the stacked physiological parameters of one tissue
//! instance, a single simulation job and the reflectance it produces.

use imc_optics::LayerParameters;
use serde::{Deserialize, Serialize};

/// Optical description of one layer at one wavelength.
///
/// All quantities are SI. Recomputed whenever the wavelength or the tissue
/// parameters change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalLayer {
    /// Refractive index.
    pub n: f64,
    /// Absorption coefficient (1/m).
    pub ua: f64,
    /// Scattering coefficient (1/m).
    pub us: f64,
    /// Anisotropy factor.
    pub g: f64,
    /// Thickness (m).
    pub d: f64,
}

/// Physiological parameters of all layers of one tissue instance, ordered
/// top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TissueParameterSet {
    pub layers: Vec<LayerParameters>,
}

impl TissueParameterSet {
    pub fn new(layers: Vec<LayerParameters>) -> Self {
        Self { layers }
    }

    pub fn nr_layers(&self) -> usize {
        self.layers.len()
    }

    /// Sum of all layer thicknesses (m).
    pub fn total_thickness(&self) -> f64 {
        self.layers.iter().map(|l| l.d).sum()
    }

    /// Rescale thicknesses so they sum to `total_m`, then raise any layer
    /// thinner than `min_m` to `min_m`. See [`normalize_thicknesses`].
    pub fn normalize_thickness(&mut self, total_m: f64, min_m: f64) {
        let mut ds: Vec<f64> = self.layers.iter().map(|l| l.d).collect();
        normalize_thicknesses(&mut ds, total_m, min_m);
        for (layer, d) in self.layers.iter_mut().zip(ds) {
            layer.d = d;
        }
    }
}

/// Rescale `ds` so it sums to `total_m`, then floor each entry at `min_m`.
///
/// The floor is applied after rescaling, so the sum exceeds `total_m` by at
/// most `ds.len() * min_m` when an entry is clipped. A non-positive sum
/// leaves `ds` untouched.
pub fn normalize_thicknesses(ds: &mut [f64], total_m: f64, min_m: f64) {
    let sum: f64 = ds.iter().sum();
    if !(sum > 0.0) {
        return;
    }
    for d in ds.iter_mut() {
        *d = (*d / sum * total_m).max(min_m);
    }
}

/// Reflectance fractions reported by the Monte Carlo engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reflectance {
    /// Photon weight leaving the surface after scattering.
    pub diffuse: f64,
    /// Photon weight reflected at the top interface.
    pub specular: f64,
    /// `diffuse + specular`.
    pub total: f64,
}

impl Reflectance {
    pub fn new(diffuse: f64, specular: f64) -> Self {
        Self {
            diffuse,
            specular,
            total: diffuse + specular,
        }
    }
}

/// One forward simulation: a tissue instance evaluated at one wavelength.
///
/// The `id` keys the transient engine input/output files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationJob {
    pub id: String,
    /// Wavelength (m).
    pub wavelength: f64,
    pub parameters: TissueParameterSet,
    /// Layer optics of `parameters` at `wavelength`.
    pub layers: Vec<OpticalLayer>,
}
