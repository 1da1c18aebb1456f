//! Layered tissue model.
//!
//! A [`TissueModel`] is an ordered stack of [`LayerSlot`]s, each pairing an
//! absorption and a scattering strategy, together with the physiological
//! parameters of every layer and the current wavelength. The tissue types
//! used in practice are configurations of this one type:
//!
//! | Variant | Layer 0 | Layer 1 | Layer 2 |
//! |---------|---------|---------|---------|
//! | `generic` | Ua + UsgJacques | Ua + UsgJacques | Ua + UsgJacques |
//! | `colon_jacques` | Ua + UsgJacques (mucosa) | Ua + UsgJacques (submucosa) | UaMuscle + UsgMuscle |
//! | `colon_rowe` | Ua + UsgMie (mucosa) | Ua + UsgMie (submucosa) | UaMuscle + UsgMuscle |

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use imc_optics::absorption::{Ua, UaMuscle};
use imc_optics::scattering::{UsgJacques, UsgMie, UsgMuscle};
use imc_optics::{AbsorptionModel, LayerParameters, OpticsError, ScatteringModel, NM, UM};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::mci::write_mci;
use crate::sim::{McmlSettings, SimError};
use crate::types::{OpticalLayer, SimulationJob, TissueParameterSet};

/// Errors from configuring or evaluating a tissue model.
#[derive(Debug, Error)]
pub enum TissueError {
    #[error("Expected {expected} layers, got {got}")]
    LayerCount { expected: usize, got: usize },

    #[error("Layer index {index} out of range for {nr_layers} layers")]
    LayerIndex { index: usize, nr_layers: usize },

    #[error("Invalid wavelength {0} m")]
    InvalidWavelength(f64),

    #[error(transparent)]
    Optics(#[from] OpticsError),
}

/// Optical property strategies for one layer position.
#[derive(Clone)]
pub struct LayerSlot {
    pub name: String,
    pub absorption: Arc<dyn AbsorptionModel>,
    pub scattering: Arc<dyn ScatteringModel>,
}

impl LayerSlot {
    pub fn new(
        name: impl Into<String>,
        absorption: impl AbsorptionModel + 'static,
        scattering: impl ScatteringModel + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            absorption: Arc::new(absorption),
            scattering: Arc::new(scattering),
        }
    }

    /// Layer optics for `params` at `wavelength_m`.
    pub fn evaluate(
        &self,
        params: &LayerParameters,
        wavelength_m: f64,
    ) -> Result<OpticalLayer, OpticsError> {
        let ua = self.absorption.absorption(params, wavelength_m)?;
        let (us, g) = self.scattering.scattering(params, wavelength_m)?;
        Ok(OpticalLayer {
            n: params.n,
            ua,
            us,
            g,
            d: params.d,
        })
    }
}

impl fmt::Debug for LayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerSlot")
            .field("name", &self.name)
            .field("absorption", &self.absorption.name())
            .field("scattering", &self.scattering.name())
            .finish()
    }
}

/// Named tissue configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TissueVariant {
    Generic,
    ColonJacques,
    ColonRowe,
}

impl TissueVariant {
    pub const ALL: [TissueVariant; 3] = [
        TissueVariant::Generic,
        TissueVariant::ColonJacques,
        TissueVariant::ColonRowe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TissueVariant::Generic => "generic",
            TissueVariant::ColonJacques => "colon_jacques",
            TissueVariant::ColonRowe => "colon_rowe",
        }
    }

    pub fn build(&self) -> Result<TissueModel, TissueError> {
        match self {
            TissueVariant::Generic => TissueModel::generic(),
            TissueVariant::ColonJacques => TissueModel::colon_jacques(),
            TissueVariant::ColonRowe => TissueModel::colon_rowe(),
        }
    }
}

/// A layered tissue at one wavelength.
#[derive(Debug, Clone)]
pub struct TissueModel {
    name: String,
    slots: Vec<LayerSlot>,
    parameters: TissueParameterSet,
    wavelength: f64,
}

impl TissueModel {
    /// Build a model from slots and matching parameters.
    pub fn new(
        name: impl Into<String>,
        slots: Vec<LayerSlot>,
        parameters: TissueParameterSet,
    ) -> Result<Self, TissueError> {
        if slots.len() != parameters.nr_layers() {
            return Err(TissueError::LayerCount {
                expected: slots.len(),
                got: parameters.nr_layers(),
            });
        }
        for layer in &parameters.layers {
            layer.validate()?;
        }
        Ok(Self {
            name: name.into(),
            slots,
            parameters,
            wavelength: 500.0 * NM,
        })
    }

    /// Three identical Jacques-scattering layers.
    pub fn generic() -> Result<Self, TissueError> {
        let slots = (0..3)
            .map(|i| Ok(LayerSlot::new(format!("layer{}", i), Ua::new()?, UsgJacques)))
            .collect::<Result<Vec<_>, OpticsError>>()?;
        let layers = vec![
            LayerParameters { d: 500.0 * UM, ..Default::default() },
            LayerParameters { d: 500.0 * UM, ..Default::default() },
            LayerParameters { d: 500.0 * UM, ..Default::default() },
        ];
        Self::new("generic", slots, TissueParameterSet::new(layers))
    }

    /// Colon with power-law scattering in mucosa and submucosa.
    pub fn colon_jacques() -> Result<Self, TissueError> {
        let slots = vec![
            LayerSlot::new("mucosa", Ua::new()?, UsgJacques),
            LayerSlot::new("submucosa", Ua::new()?, UsgJacques),
            LayerSlot::new("muscle", UaMuscle::new()?, UsgMuscle::default()),
        ];
        Self::new("colon_jacques", slots, colon_defaults())
    }

    /// Colon with Mie-sphere scattering in mucosa and submucosa.
    pub fn colon_rowe() -> Result<Self, TissueError> {
        let slots = vec![
            LayerSlot::new("mucosa", Ua::new()?, UsgMie::default()),
            LayerSlot::new("submucosa", Ua::new()?, UsgMie::default()),
            LayerSlot::new("muscle", UaMuscle::new()?, UsgMuscle::default()),
        ];
        Self::new("colon_rowe", slots, colon_defaults())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots(&self) -> &[LayerSlot] {
        &self.slots
    }

    pub fn nr_layers(&self) -> usize {
        self.slots.len()
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn parameters(&self) -> &TissueParameterSet {
        &self.parameters
    }

    pub fn set_wavelength(&mut self, wavelength_m: f64) -> Result<(), TissueError> {
        if !(wavelength_m > 0.0 && wavelength_m.is_finite()) {
            return Err(TissueError::InvalidWavelength(wavelength_m));
        }
        self.wavelength = wavelength_m;
        Ok(())
    }

    pub fn set_layer(&mut self, index: usize, params: LayerParameters) -> Result<(), TissueError> {
        let nr_layers = self.nr_layers();
        let slot = self
            .parameters
            .layers
            .get_mut(index)
            .ok_or(TissueError::LayerIndex { index, nr_layers })?;
        params.validate()?;
        *slot = params;
        Ok(())
    }

    pub fn set_mucosa(&mut self, params: LayerParameters) -> Result<(), TissueError> {
        self.set_layer(0, params)
    }

    pub fn set_submucosa(&mut self, params: LayerParameters) -> Result<(), TissueError> {
        self.set_layer(1, params)
    }

    /// Replace all layer parameters at once.
    pub fn set_parameters(&mut self, parameters: TissueParameterSet) -> Result<(), TissueError> {
        if parameters.nr_layers() != self.nr_layers() {
            return Err(TissueError::LayerCount {
                expected: self.nr_layers(),
                got: parameters.nr_layers(),
            });
        }
        for layer in &parameters.layers {
            layer.validate()?;
        }
        self.parameters = parameters;
        Ok(())
    }

    /// Layer optics at the current wavelength.
    pub fn optical_layers(&self) -> Result<Vec<OpticalLayer>, TissueError> {
        self.optical_layers_at(&self.parameters, self.wavelength)
    }

    /// Layer optics for arbitrary parameters and wavelength, without
    /// touching the model state.
    pub fn optical_layers_at(
        &self,
        parameters: &TissueParameterSet,
        wavelength_m: f64,
    ) -> Result<Vec<OpticalLayer>, TissueError> {
        if parameters.nr_layers() != self.nr_layers() {
            return Err(TissueError::LayerCount {
                expected: self.nr_layers(),
                got: parameters.nr_layers(),
            });
        }
        self.slots
            .iter()
            .zip(&parameters.layers)
            .map(|(slot, params)| slot.evaluate(params, wavelength_m).map_err(TissueError::from))
            .collect()
    }

    /// Snapshot the current state as an engine job.
    pub fn job(&self, id: impl Into<String>) -> Result<SimulationJob, TissueError> {
        Ok(SimulationJob {
            id: id.into(),
            wavelength: self.wavelength,
            parameters: self.parameters.clone(),
            layers: self.optical_layers()?,
        })
    }

    /// Write the engine input file for the current state.
    pub fn create_mci_file(
        &self,
        path: &Path,
        settings: &McmlSettings,
        mco_filename: &str,
    ) -> Result<(), SimError> {
        let layers = self.optical_layers()?;
        write_mci(path, settings, mco_filename, &layers)
    }
}

impl fmt::Display for TissueModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} at {:.1} nm", self.name, self.wavelength / NM)?;
        for (slot, p) in self.slots.iter().zip(&self.parameters.layers) {
            writeln!(
                f,
                "  {:<10} [{} / {}] bvf={:.3} saO2={:.3} a_mie={:.1}/m b_mie={:.3} d={:.1}um n={:.3} g={:.3}",
                slot.name,
                slot.absorption.name(),
                slot.scattering.name(),
                p.bvf,
                p.sao2,
                p.a_mie,
                p.b_mie,
                p.d / UM,
                p.n,
                p.g,
            )?;
        }
        Ok(())
    }
}

fn colon_defaults() -> TissueParameterSet {
    TissueParameterSet::new(vec![
        LayerParameters { n: 1.38, d: 500.0 * UM, ..Default::default() },
        LayerParameters { n: 1.36, d: 500.0 * UM, ..Default::default() },
        LayerParameters { n: 1.36, d: 700.0 * UM, ..Default::default() },
    ])
}
