//! # imc-core
//!
//! Forward side of the inverse Monte Carlo pipeline: from physiological
//! tissue parameters to simulated reflectance spectra and camera-band
//! training tables.
//!
//! ## Pipeline
//!
//! ```text
//! BatchKind::create_parameters ─► Batch (parameters only)
//!        │
//!        ▼
//! simulate_batch(TissueModel, ReflectanceEngine, wavelengths)
//!        │        └─ per instance: SpectrumIter ─► SimulationJob ─► engine
//!        ▼
//! Batch (parameters + spectra) ─► camera_batch ─► regression
//! ```
//!
//! ## Modules
//!
//! - [`types`]: Layer optics, parameter sets, jobs and reflectance.
//! - [`tissue`]: Layered tissue model and its named variants.
//! - [`sim`]: Engine trait, MCML input/output formats and the subprocess
//!   driver.
//! - [`spectrum`]: Per-wavelength simulation of one instance and of whole
//!   batches.
//! - [`batch`]: Parameter and reflectance tables, persistence.
//! - [`generators`]: Randomised batch parameters.
//! - [`postprocess`]: Folding, interpolation, band selection.

pub mod batch;
pub mod generators;
pub mod postprocess;
pub mod sim;
pub mod spectrum;
pub mod tissue;
pub mod types;

pub use batch::{Batch, BatchError, LayerColumn};
pub use sim::{ReflectanceEngine, SimError};
pub use tissue::{TissueError, TissueModel, TissueVariant};
pub use types::{OpticalLayer, Reflectance, SimulationJob, TissueParameterSet};
