//! Persisted regressors.
//!
//! A trained model is stored as JSON together with the feature wavelengths
//! and the target labels, so an estimate can be checked against the image it
//! is applied to.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::forest::RandomForest;
use crate::linear::LinearSaO2Unmixing;
use crate::preprocess::TargetColumn;
use crate::regressor::{Regressor, RegressionError};

/// The concrete regressors that can be saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedRegressor {
    RandomForest(RandomForest),
    LinearUnmixing(LinearSaO2Unmixing),
}

impl TrainedRegressor {
    fn inner(&self) -> &dyn Regressor {
        match self {
            TrainedRegressor::RandomForest(m) => m,
            TrainedRegressor::LinearUnmixing(m) => m,
        }
    }
}

impl Regressor for TrainedRegressor {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn nr_features(&self) -> usize {
        self.inner().nr_features()
    }

    fn nr_outputs(&self) -> usize {
        self.inner().nr_outputs()
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, RegressionError> {
        self.inner().predict(x)
    }
}

/// A regressor with the context it was trained in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Feature band wavelengths (m), after band removal.
    pub wavelengths: Vec<f64>,
    pub targets: Vec<TargetColumn>,
    pub regressor: TrainedRegressor,
}

impl TrainedModel {
    pub fn new(
        wavelengths: Vec<f64>,
        targets: Vec<TargetColumn>,
        regressor: TrainedRegressor,
    ) -> Result<Self, RegressionError> {
        let model = Self {
            wavelengths,
            targets,
            regressor,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), RegressionError> {
        if self.regressor.nr_features() != self.wavelengths.len() {
            return Err(RegressionError::ShapeMismatch(format!(
                "{} expects {} features but {} wavelengths are recorded",
                self.regressor.name(),
                self.regressor.nr_features(),
                self.wavelengths.len()
            )));
        }
        if self.regressor.nr_outputs() != self.targets.len() {
            return Err(RegressionError::ShapeMismatch(format!(
                "{} outputs for {} targets",
                self.regressor.nr_outputs(),
                self.targets.len()
            )));
        }
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<(), RegressionError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        log::info!("Saved {} to {}", self.regressor.name(), path.display());
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, RegressionError> {
        let reader = BufReader::new(File::open(path)?);
        let model: TrainedModel = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }
}
