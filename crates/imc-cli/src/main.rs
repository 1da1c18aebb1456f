//! Command line for the inverse Monte Carlo pipeline.
//!
//! Every stage reads the same TOML configuration:
//! ```sh
//! imc-cli simulate pipeline.toml
//! imc-cli camera pipeline.toml batches/generic_generic_100_seed0.json
//! imc-cli train pipeline.toml batches/train_camera.json --test batches/test_camera.json
//! imc-cli validate pipeline.toml
//! imc-cli models
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use imc_core::generators::BatchKind;
use imc_core::tissue::TissueVariant;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imc-cli")]
#[command(about = "Inverse Monte Carlo estimation of tissue parameters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a parameter batch and simulate its reflectance spectra.
    Simulate {
        /// Path to the pipeline configuration file.
        config: PathBuf,
        /// Output directory (overrides the configured batch folder).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Convert a simulated batch to camera bands.
    Camera {
        config: PathBuf,
        /// Simulated batch (JSON).
        batch: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Train the inverse and forward models on a camera batch.
    Train {
        config: PathBuf,
        /// Camera batch used for training (JSON).
        train: PathBuf,
        /// Camera batch used for evaluation.
        #[arg(long)]
        test: Option<PathBuf>,
        /// Weight training samples towards the test batch distribution.
        #[arg(long, requires = "test")]
        adapt: bool,
        /// Output directory (overrides the configured results folder).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running anything.
    Validate {
        config: PathBuf,
    },
    /// List tissue models and batch kinds.
    Models,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { config, output } => {
            println!("IMC batch simulation");
            println!("====================");
            let pipeline = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_simulation(&pipeline)?;
            println!(
                "Simulated {} instances, dropped {}",
                result.summary.simulated, result.summary.dropped
            );
            let out_dir = output.unwrap_or_else(|| pipeline.paths.batch_dir());
            let stem = runner::batch_stem(&pipeline);
            runner::write_batch(&result.batch, &out_dir, &stem)?;
            runner::write_summary(&result.summary, &out_dir, &stem)?;
            println!("Simulation complete.");
            Ok(())
        }
        Commands::Camera {
            config,
            batch,
            output,
        } => {
            let pipeline = config::load_config(&config)?;
            let simulated = runner::load_batch(&batch)?;
            let camera = runner::run_camera(&pipeline, &simulated)?;

            let stem = batch
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "batch".into());
            let out_dir = output
                .or_else(|| batch.parent().map(PathBuf::from))
                .unwrap_or_else(|| pipeline.paths.batch_dir());
            runner::write_batch(&camera, &out_dir, &format!("{stem}_camera"))?;
            Ok(())
        }
        Commands::Train {
            config,
            train,
            test,
            adapt,
            output,
        } => {
            println!("IMC regression training");
            println!("=======================");
            let pipeline = config::load_config(&config)?;
            let train_batch = runner::load_batch(&train)?;
            let test_batch = test.as_deref().map(runner::load_batch).transpose()?;

            let adapt_to = if adapt { test_batch.as_ref() } else { None };
            let result = runner::run_training(&pipeline, &train_batch, adapt_to)?;
            println!("Cross-validated R²: {:.4}", result.cv_score);
            if let Some(test_batch) = &test_batch {
                runner::evaluate(&pipeline, &result, test_batch)?;
            }

            let out_dir = output.unwrap_or_else(|| pipeline.paths.results_dir());
            runner::write_models(&result, &out_dir)?;
            println!("Training complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let _pipeline = config::load_config(&config)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Models => {
            println!("Tissue models:");
            for variant in TissueVariant::ALL {
                let model = variant.build()?;
                println!();
                print!("{}", model);
            }
            println!();
            println!("Batch kinds:");
            for kind in BatchKind::ALL {
                println!("  {}", kind.name());
            }
            Ok(())
        }
    }
}
