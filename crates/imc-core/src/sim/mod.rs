//! Monte Carlo engine abstraction and the MCML implementation.
//!
//! The [`ReflectanceEngine`] trait defines what the spectrum and batch layers
//! need from a forward light-transport simulator: given a
//! [`SimulationJob`], produce the reflectance or report that none is
//! available. [`mcml::McmlEngine`] drives the external MCML/GPU-MCML binary
//! through its text input ([`mci`]) and output ([`mco`]) formats.
//!
//! # Failure classes
//!
//! - Input file not written → `Err(SimError::InputFileMissing)`; the job is
//!   aborted.
//! - Engine failure (spawn error, non-zero exit, timeout, unreadable
//!   output) → logged, `Ok(None)`; callers skip the job.

pub mod mci;
pub mod mcml;
pub mod mco;

use std::path::PathBuf;

use imc_optics::OpticsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tissue::TissueError;
use crate::types::{Reflectance, SimulationJob};

/// Errors that can occur while preparing or running a simulation job.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine input file was not created: {}", .0.display())]
    InputFileMissing(PathBuf),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine run failed: {0}")]
    EngineFailed(String),

    #[error("Engine timed out after {0:.1} s")]
    Timeout(f64),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Optics(#[from] OpticsError),

    #[error(transparent)]
    Tissue(#[from] TissueError),
}

/// A forward model turning layer optics into surface reflectance.
pub trait ReflectanceEngine {
    /// Run one job.
    ///
    /// Returns `Ok(None)` when the engine could not produce a result; the
    /// caller treats the job as missing. `Err` is reserved for failures that
    /// must abort the job, such as an unwritable input file.
    fn run(&self, job: &SimulationJob) -> Result<Option<Reflectance>, SimError>;

    /// Human-readable name of the engine.
    fn engine_name(&self) -> &str;
}

/// Run settings written into the MCML input file.
///
/// Grid units follow MCML: `dz` and `dr` are in centimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmlSettings {
    pub file_version: f64,
    pub nr_runs: u32,
    pub nr_photons: u64,
    pub dz: f64,
    pub dr: f64,
    pub nr_dz: u32,
    pub nr_dr: u32,
    pub nr_da: u32,
    /// Refractive index of the medium above the tissue.
    pub n_above: f64,
    /// Refractive index of the medium below the tissue.
    pub n_below: f64,
}

impl Default for McmlSettings {
    fn default() -> Self {
        Self {
            file_version: 1.0,
            nr_runs: 1,
            nr_photons: 1_000_000,
            dz: 0.002,
            dr: 2.0,
            nr_dz: 500,
            nr_dr: 1,
            nr_da: 1,
            n_above: 1.0,
            n_below: 1.0,
        }
    }
}

impl McmlSettings {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.nr_runs == 0 {
            return Err(SimError::InvalidSettings("nr_runs must be at least 1".into()));
        }
        if self.nr_photons == 0 {
            return Err(SimError::InvalidSettings("nr_photons must be at least 1".into()));
        }
        if !(self.dz > 0.0 && self.dr > 0.0) {
            return Err(SimError::InvalidSettings("dz and dr must be positive".into()));
        }
        if self.nr_dz == 0 || self.nr_dr == 0 || self.nr_da == 0 {
            return Err(SimError::InvalidSettings("grid counts must be at least 1".into()));
        }
        if !(self.n_above >= 1.0 && self.n_below >= 1.0) {
            return Err(SimError::InvalidSettings(
                "ambient refractive indices must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
