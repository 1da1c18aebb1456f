//! TOML configuration for the pipeline stages.
//!
//! Wavelengths are given in nanometres in the file and converted to metres
//! when the configuration is loaded. Every field has a default, so an empty
//! file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use imc_core::batch::LayerColumn;
use imc_core::generators::BatchKind;
use imc_core::postprocess::{BandOrder, CameraSettings};
use imc_core::sim::McmlSettings;
use imc_core::tissue::TissueVariant;
use imc_optics::NM;
use imc_regression::{
    GridSearch, KFold, ParamGrid, PreprocessOptions, RandomForestParams, TargetColumn,
};
use serde::Deserialize;

/// Top-level pipeline configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub engine: EngineConfig,
    pub simulation: SimulationConfig,
    pub camera: CameraConfig,
    pub regression: RegressionConfig,
}

/// Where inputs and results live. Relative folders are taken relative to
/// `root`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub results: PathBuf,
    pub batches: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            results: PathBuf::from("results"),
            batches: PathBuf::from("batches"),
        }
    }
}

impl PathsConfig {
    pub fn results_dir(&self) -> PathBuf {
        self.root.join(&self.results)
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.root.join(&self.batches)
    }
}

/// MCML executable and run settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the MCML binary (default: "./gpumcml").
    pub executable: PathBuf,
    /// Seconds before a single run is killed (default: 600).
    pub timeout: f64,
    /// Directory for per-job input files (default: system temp dir).
    pub scratch_dir: Option<PathBuf>,
    /// Keep `.mci`/`.mco` files after each run (default: false).
    pub keep_files: bool,
    #[serde(flatten)]
    pub settings: McmlSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("./gpumcml"),
            timeout: 600.0,
            scratch_dir: None,
            keep_files: false,
            settings: McmlSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

/// Batch generation parameters.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub batch_kind: BatchKind,
    pub tissue: TissueVariant,
    pub nr_samples: usize,
    pub seed: u64,
    pub wavelengths: WavelengthSpec,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            batch_kind: BatchKind::Generic,
            tissue: TissueVariant::Generic,
            nr_samples: 100,
            seed: 0,
            wavelengths: WavelengthSpec::Range {
                range: [450.0, 720.0],
                step: 2.0,
            },
        }
    }
}

/// Wavelength specification in nm: either a stepped range or explicit list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WavelengthSpec {
    Range { range: [f64; 2], step: f64 },
    List { values: Vec<f64> },
}

impl WavelengthSpec {
    /// Grid in metres. The range end is included when it falls on the grid.
    pub fn to_metres(&self) -> Result<Vec<f64>> {
        let nm = match self {
            WavelengthSpec::Range { range, step } => {
                let [start, end] = *range;
                if !(*step > 0.0) || !(end >= start) {
                    bail!("Invalid wavelength range {:?} with step {}", range, step);
                }
                let count = ((end - start) / step + 1e-9).floor() as usize + 1;
                (0..count).map(|i| start + step * i as f64).collect::<Vec<_>>()
            }
            WavelengthSpec::List { values } => values.clone(),
        };
        if nm.is_empty() {
            bail!("Wavelength list is empty");
        }
        if let Some(bad) = nm.iter().find(|w| !(**w > 0.0 && w.is_finite())) {
            bail!("Invalid wavelength {} nm", bad);
        }
        Ok(nm.into_iter().map(|w| w * NM).collect())
    }
}

/// Camera band model applied to simulated batches.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Band centre wavelengths in nm.
    pub wavelengths: Vec<f64>,
    pub fold_window: usize,
    pub bands_to_sortout: Vec<usize>,
    pub band_order: Option<BandOrder>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            wavelengths: (0..24).map(|i| 470.0 + 10.0 * i as f64).collect(),
            fold_window: 5,
            bands_to_sortout: Vec::new(),
            band_order: None,
        }
    }
}

impl CameraConfig {
    pub fn settings(&self) -> CameraSettings {
        CameraSettings {
            wavelengths: self.wavelengths.iter().map(|w| w * NM).collect(),
            fold_window: self.fold_window,
            bands_to_sortout: self.bands_to_sortout.clone(),
            band_order: self.band_order.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.wavelengths.is_empty() {
            bail!("[camera] needs at least one band");
        }
        if self.fold_window == 0 {
            bail!("[camera] fold_window must be at least 1");
        }
        let nr_bands = self.wavelengths.len();
        if let Some(&b) = self.bands_to_sortout.iter().find(|&&b| b >= nr_bands) {
            bail!("[camera] band {} to sort out does not exist ({} bands)", b, nr_bands);
        }
        if dedup_count(&self.bands_to_sortout) == nr_bands {
            bail!("[camera] every band is sorted out");
        }
        if let Some(order) = &self.band_order {
            let remaining = nr_bands - dedup_count(&self.bands_to_sortout);
            if order.len() != remaining {
                bail!(
                    "[camera] band_order has {} entries for {} remaining bands",
                    order.len(),
                    remaining
                );
            }
        }
        Ok(())
    }
}

fn dedup_count(indices: &[usize]) -> usize {
    let mut v = indices.to_vec();
    v.sort_unstable();
    v.dedup();
    v.len()
}

/// Training parameters for the inverse models.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub grid: ParamGrid,
    pub folds: KFold,
    pub forest: RandomForestParams,
    /// Multiplicative noise level as a fraction (0.05 = 5 %).
    pub w_percent: f64,
    pub magnification: usize,
    pub seed: u64,
    pub targets: Vec<TargetColumn>,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::default(),
            folds: KFold::default(),
            forest: RandomForestParams::default(),
            w_percent: 0.1,
            magnification: 1,
            seed: 0,
            targets: vec![TargetColumn::new(0, LayerColumn::SaO2)],
        }
    }
}

impl RegressionConfig {
    pub fn grid_search(&self) -> GridSearch {
        GridSearch {
            grid: self.grid.clone(),
            folds: self.folds,
            base: self.forest,
        }
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            w_percent: self.w_percent,
            magnification: self.magnification,
            bands_to_sortout: Vec::new(),
            targets: self.targets.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        for candidate in self.grid.candidates(&self.forest) {
            candidate.validate()?;
        }
        if self.grid.candidates(&self.forest).is_empty() {
            bail!("[regression] grid has no candidates");
        }
        if self.folds.n_splits < 2 {
            bail!("[regression] need at least 2 folds");
        }
        if !(self.w_percent >= 0.0 && self.w_percent.is_finite()) {
            bail!("[regression] w_percent must be non-negative");
        }
        if self.magnification == 0 {
            bail!("[regression] magnification must be at least 1");
        }
        if self.targets.is_empty() {
            bail!("[regression] no targets");
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.engine.settings.validate()?;
        if !(self.engine.timeout > 0.0 && self.engine.timeout.is_finite()) {
            bail!("[engine] timeout must be positive");
        }
        if self.simulation.nr_samples == 0 {
            bail!("[simulation] nr_samples must be at least 1");
        }
        self.simulation.wavelengths.to_metres()?;
        self.camera.validate()?;
        self.regression.validate()?;
        Ok(())
    }
}

/// Load, parse and validate a TOML pipeline configuration.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: PipelineConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation.nr_samples, 100);
        assert_eq!(config.engine.settings, McmlSettings::default());
        assert_eq!(config.paths.results_dir(), PathBuf::from("./results"));
    }

    #[test]
    fn test_full_file() {
        let text = r#"
[paths]
root = "/data/imc"

[engine]
executable = "/opt/mcml/gpumcml"
timeout = 30.0
keep_files = true
nr_photons = 500000
n_above = 1.33

[simulation]
batch_kind = "colon_muscle"
tissue = "colon_jacques"
nr_samples = 20
seed = 7
wavelengths = { values = [500.0, 550.0] }

[camera]
wavelengths = [500.0, 520.0, 540.0]
fold_window = 1
bands_to_sortout = [0]
band_order = [1, 0]

[regression]
w_percent = 0.05
targets = [{ layer = 0, column = "saO2" }, { layer = 1, column = "d" }]
grid = { n_estimators = [10, 20], max_depth = [8], min_samples_leaf = [1] }
"#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.paths.batch_dir(), PathBuf::from("/data/imc/batches"));
        assert_eq!(config.engine.settings.nr_photons, 500_000);
        assert_abs_diff_eq!(config.engine.settings.n_above, 1.33);
        assert_eq!(config.engine.settings.nr_runs, 1);
        assert_eq!(config.simulation.batch_kind, BatchKind::ColonMuscle);
        assert_eq!(config.simulation.tissue, TissueVariant::ColonJacques);
        let wl = config.simulation.wavelengths.to_metres().unwrap();
        assert_abs_diff_eq!(wl[1], 550e-9, epsilon = 1e-18);
        let camera = config.camera.settings();
        assert_abs_diff_eq!(camera.wavelengths[2], 540e-9, epsilon = 1e-18);
        assert_eq!(config.regression.targets[1].label(), "layer1.d");
        assert_eq!(config.regression.grid_search().grid.candidates(&RandomForestParams::default()).len(), 2);
    }

    #[test]
    fn test_range_includes_end() {
        let spec = WavelengthSpec::Range { range: [450.0, 460.0], step: 2.0 };
        let wl = spec.to_metres().unwrap();
        assert_eq!(wl.len(), 6);
        assert_abs_diff_eq!(wl[5], 460e-9, epsilon = 1e-18);
        assert!(WavelengthSpec::Range { range: [460.0, 450.0], step: 2.0 }.to_metres().is_err());
        assert!(WavelengthSpec::List { values: vec![] }.to_metres().is_err());
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let bad_order: PipelineConfig =
            toml::from_str("[camera]\nwavelengths = [500.0, 510.0]\nband_order = [0]").unwrap();
        assert!(bad_order.validate().is_err());
        assert!(toml::from_str::<PipelineConfig>("[camera]\nband_order = [0, 0]").is_err());
        let bad_folds: PipelineConfig = toml::from_str("[regression.folds]\nn_splits = 1").unwrap();
        assert!(bad_folds.validate().is_err());
        let no_bands: PipelineConfig =
            toml::from_str("[camera]\nwavelengths = [500.0, 510.0]\nbands_to_sortout = [1, 0]").unwrap();
        assert!(no_bands.validate().is_err());
        let bad_engine: PipelineConfig = toml::from_str("[engine]\nnr_photons = 0").unwrap();
        assert!(bad_engine.validate().is_err());
    }
}
