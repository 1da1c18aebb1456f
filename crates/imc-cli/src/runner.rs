//! Stage runners: tie together configuration, engine, batches and models.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use imc_core::batch::{Batch, LayerColumn};
use imc_core::postprocess::camera_batch;
use imc_core::sim::mcml::McmlEngine;
use imc_core::spectrum::{simulate_batch, SimulationSummary};
use imc_optics::NM;
use imc_regression::domain_adaptation::estimate_weights_random_forests;
use imc_regression::metrics::standard_score;
use imc_regression::preprocess::preprocess;
use imc_regression::{
    LinearSaO2Unmixing, RandomForest, Regressor, TargetColumn, TrainedModel, TrainedRegressor,
};

use crate::config::{EngineConfig, PipelineConfig};

/// Results from a simulation run.
pub struct SimulationOutput {
    pub batch: Batch,
    pub summary: SimulationSummary,
}

/// Fitted models from a training run.
pub struct TrainingOutput {
    pub inverse: TrainedModel,
    /// Parameters to features, used for reprojection.
    pub forward: RandomForest,
    /// Closed-form saturation baseline, present when layer 0 saO2 is a
    /// target.
    pub linear: Option<LinearSaO2Unmixing>,
    /// Mean held-out R² of the selected candidate.
    pub cv_score: f64,
}

pub fn build_engine(config: &EngineConfig) -> Result<McmlEngine> {
    let mut engine = McmlEngine::new(&config.executable, config.settings.clone())
        .with_context(|| format!("Cannot use MCML at {}", config.executable.display()))?
        .with_timeout(config.timeout())
        .with_keep_files(config.keep_files);
    if let Some(dir) = &config.scratch_dir {
        engine = engine
            .with_scratch_dir(dir)
            .with_context(|| format!("Invalid scratch directory {}", dir.display()))?;
    }
    log::info!(
        "Engine {} with {} photons, timeout {:.0} s",
        config.executable.display(),
        config.settings.nr_photons,
        config.timeout
    );
    Ok(engine)
}

/// File stem identifying a generated batch.
pub fn batch_stem(config: &PipelineConfig) -> String {
    format!(
        "{}_{}_{}_seed{}",
        config.simulation.batch_kind.name(),
        config.simulation.tissue.name(),
        config.simulation.nr_samples,
        config.simulation.seed
    )
}

/// Generate a batch of parameters and simulate its spectra.
pub fn run_simulation(config: &PipelineConfig) -> Result<SimulationOutput> {
    let sim = &config.simulation;
    let wavelengths = sim.wavelengths.to_metres()?;
    let model = sim
        .tissue
        .build()
        .with_context(|| format!("Cannot build tissue model {}", sim.tissue.name()))?;
    let engine = build_engine(&config.engine)?;

    println!("Tissue model:");
    print!("{}", model);
    println!(
        "Batch: {} x {} ({} wavelengths, {:.1}-{:.1} nm)",
        sim.nr_samples,
        sim.batch_kind.name(),
        wavelengths.len(),
        wavelengths[0] / NM,
        wavelengths[wavelengths.len() - 1] / NM
    );

    let mut batch = sim.batch_kind.create_parameters(sim.nr_samples, sim.seed);
    let summary = simulate_batch(&mut batch, &model, &engine, &wavelengths)
        .context("Simulation failed")?;
    if summary.simulated == 0 {
        bail!("Every instance failed; check the engine log output");
    }
    Ok(SimulationOutput { batch, summary })
}

/// Apply the camera band model to a simulated batch.
pub fn run_camera(config: &PipelineConfig, batch: &Batch) -> Result<Batch> {
    if !batch.has_reflectances() {
        bail!("Batch has no simulated reflectances");
    }
    let settings = config.camera.settings();
    let camera = camera_batch(batch, &settings).context("Camera post-processing failed")?;
    println!(
        "Camera batch: {} instances, {} -> {} bands",
        camera.nr_elements(),
        batch.nr_wavelengths(),
        camera.nr_wavelengths()
    );
    Ok(camera)
}

fn linear_target_column(targets: &[TargetColumn]) -> Option<usize> {
    targets
        .iter()
        .position(|t| *t == TargetColumn::new(0, LayerColumn::SaO2))
}

/// Grid-searched inverse forest, forward forest and linear baseline.
///
/// With `adapt_to`, training samples are weighted towards the feature
/// distribution of that batch.
pub fn run_training(
    config: &PipelineConfig,
    train: &Batch,
    adapt_to: Option<&Batch>,
) -> Result<TrainingOutput> {
    let reg = &config.regression;
    let options = reg.preprocess_options();
    let mut rng = StdRng::seed_from_u64(reg.seed);
    let (x, y) = preprocess(train, &options, &mut rng).context("Preprocessing failed")?;
    println!(
        "Training set: {} samples, {} features, targets [{}]",
        x.nrows(),
        x.ncols(),
        reg.targets
            .iter()
            .map(TargetColumn::label)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let weights = match adapt_to {
        Some(target) => {
            let (x_t, _) =
                preprocess(target, &options, &mut rng).context("Preprocessing target failed")?;
            let w = estimate_weights_random_forests(x.view(), x_t.view(), x.view(), &reg.forest)
                .context("Weight estimation failed")?;
            println!(
                "Domain adaptation weights: min {:.3}, max {:.3}",
                w.iter().cloned().fold(f64::INFINITY, f64::min),
                w.iter().cloned().fold(0.0, f64::max)
            );
            Some(w)
        }
        None => None,
    };

    let result = reg
        .grid_search()
        .fit(x.view(), y.view(), weights.as_ref().map(|w| w.view()))
        .context("Grid search failed")?;
    for s in &result.scores {
        println!(
            "  n_estimators={:<4} max_depth={:<8} min_samples_leaf={:<3} R²={:.4}",
            s.params.n_estimators,
            format!("{:?}", s.params.max_depth),
            s.params.min_samples_leaf,
            s.mean_score
        );
    }

    let forward = reg
        .forest
        .fit(y.view(), x.view(), None)
        .context("Forward model fit failed")?;

    let wavelengths = train.wavelengths().to_vec();
    let linear = match linear_target_column(&reg.targets) {
        Some(_) => Some(LinearSaO2Unmixing::new(&wavelengths).context("Linear unmixing setup failed")?),
        None => None,
    };

    let inverse = TrainedModel::new(
        wavelengths,
        reg.targets.clone(),
        TrainedRegressor::RandomForest(result.model),
    )?;
    Ok(TrainingOutput {
        inverse,
        forward,
        linear,
        cv_score: result.best.mean_score,
    })
}

/// Print median absolute errors of the trained models on a test batch.
pub fn evaluate(config: &PipelineConfig, output: &TrainingOutput, test: &Batch) -> Result<()> {
    let options = config.regression.preprocess_options();
    let mut rng = StdRng::seed_from_u64(config.regression.seed.wrapping_add(1));
    let (x, y) = preprocess(test, &options, &mut rng).context("Preprocessing test set failed")?;

    let forest_error = standard_score(&output.inverse.regressor, x.view(), y.view())?;
    println!(
        "Test set ({} samples): {} median absolute error {:.4}",
        x.nrows(),
        output.inverse.regressor.name(),
        forest_error
    );
    if let (Some(linear), Some(col)) = (&output.linear, linear_target_column(&config.regression.targets)) {
        let y_sao2: Array2<f64> = y.select(Axis(1), &[col]);
        let linear_error = standard_score(linear, x.view(), y_sao2.view())?;
        println!("  {} median absolute error {:.4}", linear.name(), linear_error);
    }
    Ok(())
}

pub fn load_batch(path: &Path) -> Result<Batch> {
    Batch::load_json(path).with_context(|| format!("Failed to load batch {}", path.display()))
}

/// Write `<stem>.json` and `<stem>.csv` into `dir`.
pub fn write_batch(batch: &Batch, dir: &Path, stem: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let json_path = dir.join(format!("{stem}.json"));
    batch
        .save_json(&json_path)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;
    let csv_path = dir.join(format!("{stem}.csv"));
    batch
        .write_csv(&csv_path)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    println!("Batch written to: {}", json_path.display());
    Ok(json_path)
}

/// Record the simulated and dropped instance counts next to the batch.
pub fn write_summary(summary: &SimulationSummary, dir: &Path, stem: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{stem}.summary.json"));
    let file =
        std::fs::File::create(&path).with_context(|| format!("Failed to write {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), summary)?;
    Ok(path)
}

/// Persist the trained models as JSON.
pub fn write_models(output: &TrainingOutput, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let inverse_path = dir.join("inverse_model.json");
    output
        .inverse
        .save_json(&inverse_path)
        .with_context(|| format!("Failed to write {}", inverse_path.display()))?;
    println!("Inverse model written to: {}", inverse_path.display());

    let forward_path = dir.join("forward_model.json");
    let forward = TrainedRegressor::RandomForest(output.forward.clone());
    let file = std::fs::File::create(&forward_path)
        .with_context(|| format!("Failed to create {}", forward_path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &forward)?;
    println!("Forward model written to: {}", forward_path.display());

    if let Some(linear) = &output.linear {
        let linear_path = dir.join("linear_sao2.json");
        let file = std::fs::File::create(&linear_path)
            .with_context(|| format!("Failed to create {}", linear_path.display()))?;
        serde_json::to_writer(
            std::io::BufWriter::new(file),
            &TrainedRegressor::LinearUnmixing(linear.clone()),
        )?;
        println!("Linear baseline written to: {}", linear_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imc_core::generators::BatchKind;
    use ndarray::Array1;

    fn synthetic_camera_batch(n: usize, seed: u64) -> Batch {
        let mut batch = BatchKind::Generic.create_parameters(n, seed);
        let wl = Array1::from_iter((0..6).map(|i| (500.0 + 20.0 * i as f64) * NM));
        let sao2 = batch.column(0, LayerColumn::SaO2).unwrap().to_owned();
        let r = Array2::from_shape_fn((n, 6), |(i, b)| {
            0.1 + 0.3 * sao2[i] * (b as f64 / 5.0) + 0.05 * (1.0 - sao2[i])
        });
        batch.set_reflectances(wl, r).unwrap();
        batch
    }

    fn small_config() -> PipelineConfig {
        toml::from_str(
            r#"
[regression]
w_percent = 0.0
folds = { n_splits = 3 }
grid = { n_estimators = [5], max_depth = [6], min_samples_leaf = [2] }
forest = { n_estimators = 5 }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_training_produces_all_models() {
        let config = small_config();
        let train = synthetic_camera_batch(60, 1);
        let test = synthetic_camera_batch(20, 2);
        let output = run_training(&config, &train, Some(&test)).unwrap();
        assert_eq!(output.inverse.wavelengths.len(), 6);
        assert_eq!(output.forward.nr_features(), 1);
        assert_eq!(output.forward.nr_outputs(), 6);
        assert!(output.linear.is_some());
        evaluate(&config, &output, &test).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let dir = scratch.path().join("models");
        write_models(&output, &dir).unwrap();
        let loaded = TrainedModel::load_json(&dir.join("inverse_model.json")).unwrap();
        assert_eq!(loaded.targets, config.regression.targets);
        assert!(dir.join("forward_model.json").exists());
        assert!(dir.join("linear_sao2.json").exists());
    }

    #[test]
    fn test_camera_requires_reflectances() {
        let config = small_config();
        let batch = BatchKind::Generic.create_parameters(4, 0);
        assert!(run_camera(&config, &batch).is_err());
    }

    #[test]
    fn test_batch_written_as_json_and_csv() {
        let batch = synthetic_camera_batch(5, 3);
        let scratch = tempfile::tempdir().unwrap();
        let dir = scratch.path().join("batches");
        let json = write_batch(&batch, &dir, "generic_test").unwrap();
        assert!(dir.join("generic_test.csv").exists());
        assert_eq!(load_batch(&json).unwrap().nr_elements(), 5);
    }

    #[test]
    fn test_summary_recorded_next_to_batch() {
        let scratch = tempfile::tempdir().unwrap();
        let summary = SimulationSummary { simulated: 97, dropped: 3 };
        let path = write_summary(&summary, scratch.path(), "generic_test").unwrap();
        assert_eq!(path.file_name().unwrap(), "generic_test.summary.json");
        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: SimulationSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_missing_engine_is_reported() {
        let mut config = PipelineConfig::default();
        config.engine.executable = PathBuf::from("/nonexistent/gpumcml");
        assert!(build_engine(&config.engine).is_err());
        assert_eq!(batch_stem(&config), "generic_generic_100_seed0");
    }
}
