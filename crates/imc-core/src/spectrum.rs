//! Spectrum assembly: one tissue instance across many wavelengths.
//!
//! [`SpectrumIter`] evaluates the tissue optics for a snapshot of the layer
//! parameters, so iterating never mutates the model and a clone restarts
//! from the current position.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::batch::{Batch, BatchError};
use crate::sim::{ReflectanceEngine, SimError};
use crate::tissue::TissueModel;
use crate::types::{Reflectance, SimulationJob, TissueParameterSet};

/// Wavelengths paired 1:1 with reflectances. Order is preserved as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectanceSpectrum {
    wavelengths: Vec<f64>,
    reflectances: Vec<Reflectance>,
}

impl ReflectanceSpectrum {
    pub fn new(wavelengths: Vec<f64>, reflectances: Vec<Reflectance>) -> Result<Self, BatchError> {
        if wavelengths.len() != reflectances.len() {
            return Err(BatchError::ShapeMismatch(format!(
                "{} wavelengths for {} reflectances",
                wavelengths.len(),
                reflectances.len()
            )));
        }
        Ok(Self {
            wavelengths,
            reflectances,
        })
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn reflectances(&self) -> &[Reflectance] {
        &self.reflectances
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Reflectance)> + '_ {
        self.wavelengths.iter().copied().zip(&self.reflectances)
    }

    pub fn diffuse(&self) -> Vec<f64> {
        self.reflectances.iter().map(|r| r.diffuse).collect()
    }

    pub fn total(&self) -> Vec<f64> {
        self.reflectances.iter().map(|r| r.total).collect()
    }

    /// Copy sorted by wavelength, pairs kept together.
    pub fn sorted(&self) -> Self {
        let mut pairs: Vec<(f64, Reflectance)> = self
            .wavelengths
            .iter()
            .copied()
            .zip(self.reflectances.iter().copied())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (wavelengths, reflectances) = pairs.into_iter().unzip();
        Self {
            wavelengths,
            reflectances,
        }
    }
}

/// Lazy per-wavelength simulation of one tissue instance.
pub struct SpectrumIter<'a, E: ReflectanceEngine + ?Sized> {
    model: &'a TissueModel,
    engine: &'a E,
    parameters: TissueParameterSet,
    wavelengths: Vec<f64>,
    prefix: String,
    pos: usize,
}

impl<'a, E: ReflectanceEngine + ?Sized> SpectrumIter<'a, E> {
    /// Iterate `wavelengths` for an explicit parameter set.
    pub fn for_parameters(
        model: &'a TissueModel,
        engine: &'a E,
        parameters: TissueParameterSet,
        wavelengths: &[f64],
    ) -> Self {
        Self {
            model,
            engine,
            parameters,
            wavelengths: wavelengths.to_vec(),
            prefix: model.name().to_string(),
            pos: 0,
        }
    }

    /// Prefix of the job ids, and so of the engine scratch file names.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    fn job(&self, wavelength: f64) -> Result<SimulationJob, SimError> {
        let layers = self.model.optical_layers_at(&self.parameters, wavelength)?;
        Ok(SimulationJob {
            id: format!("{}_{}_{}", self.prefix, std::process::id(), self.pos),
            wavelength,
            parameters: self.parameters.clone(),
            layers,
        })
    }
}

impl<E: ReflectanceEngine + ?Sized> Clone for SpectrumIter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            model: self.model,
            engine: self.engine,
            parameters: self.parameters.clone(),
            wavelengths: self.wavelengths.clone(),
            prefix: self.prefix.clone(),
            pos: self.pos,
        }
    }
}

impl<E: ReflectanceEngine + ?Sized> Iterator for SpectrumIter<'_, E> {
    type Item = Result<Option<Reflectance>, SimError>;

    fn next(&mut self) -> Option<Self::Item> {
        let wavelength = *self.wavelengths.get(self.pos)?;
        let result = self.job(wavelength).and_then(|job| self.engine.run(&job));
        self.pos += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.wavelengths.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl<E: ReflectanceEngine + ?Sized> ExactSizeIterator for SpectrumIter<'_, E> {}

/// Spectrum of the model's current parameters over `wavelengths`.
pub fn create_spectrum<'a, E: ReflectanceEngine + ?Sized>(
    model: &'a TissueModel,
    engine: &'a E,
    wavelengths: &[f64],
) -> SpectrumIter<'a, E> {
    SpectrumIter::for_parameters(model, engine, model.parameters().clone(), wavelengths)
}

/// Run [`create_spectrum`] to completion.
///
/// Returns `Ok(None)` if the engine produced no result for some wavelength.
pub fn collect_spectrum<E: ReflectanceEngine + ?Sized>(
    model: &TissueModel,
    engine: &E,
    wavelengths: &[f64],
) -> Result<Option<ReflectanceSpectrum>, SimError> {
    let mut reflectances = Vec::with_capacity(wavelengths.len());
    for result in create_spectrum(model, engine, wavelengths) {
        match result? {
            Some(r) => reflectances.push(r),
            None => return Ok(None),
        }
    }
    Ok(Some(ReflectanceSpectrum {
        wavelengths: wavelengths.to_vec(),
        reflectances,
    }))
}

/// Outcome of [`simulate_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub simulated: usize,
    pub dropped: usize,
}

/// Fill the diffuse reflectance of every instance at `wavelengths`.
///
/// Instances for which any wavelength fails are removed from the batch.
/// Errors of the optical model itself (e.g. a wavelength outside the
/// extinction tables) would fail every instance and are returned instead.
pub fn simulate_batch<E: ReflectanceEngine + ?Sized>(
    batch: &mut Batch,
    model: &TissueModel,
    engine: &E,
    wavelengths: &[f64],
) -> Result<SimulationSummary, BatchError> {
    let n = batch.nr_elements();
    log::info!(
        "Simulating {} instances at {} wavelengths with {} ({})",
        n,
        wavelengths.len(),
        engine.engine_name(),
        model.name()
    );

    let mut kept = Vec::with_capacity(n);
    let mut rows: Vec<f64> = Vec::with_capacity(n * wavelengths.len());

    'instances: for i in 0..n {
        let parameters = batch.instance(i)?;
        let iter = SpectrumIter::for_parameters(model, engine, parameters, wavelengths)
            .with_prefix(format!("{}_{}", model.name(), i));
        let mut spectrum = Vec::with_capacity(wavelengths.len());
        for (w, result) in iter.enumerate() {
            match result {
                Ok(Some(r)) => spectrum.push(r.diffuse),
                Ok(None) => {
                    log::warn!("Dropping instance {}: no result at wavelength index {}", i, w);
                    continue 'instances;
                }
                Err(e @ (SimError::Optics(_) | SimError::Tissue(_))) => return Err(e.into()),
                Err(e) => {
                    log::error!("Dropping instance {}: {}", i, e);
                    continue 'instances;
                }
            }
        }
        kept.push(i);
        rows.extend(spectrum);
        log::debug!("Instance {}/{} done", i + 1, n);
    }

    let dropped = n - kept.len();
    let reflectances = Array2::from_shape_vec((kept.len(), wavelengths.len()), rows)
        .map_err(|e| BatchError::ShapeMismatch(e.to_string()))?;
    let mut result = batch.select_rows(&kept)?;
    result.set_reflectances(Array1::from(wavelengths.to_vec()), reflectances)?;
    *batch = result;

    if dropped > 0 {
        log::warn!("{} of {} instances dropped", dropped, n);
    }
    log::info!("Simulated {} instances", kept.len());
    Ok(SimulationSummary {
        simulated: kept.len(),
        dropped,
    })
}
