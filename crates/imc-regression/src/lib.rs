//! # imc-regression
//!
//! Inverse models from simulated reflectance to tissue parameters.
//!
//! Camera batches produced by `imc-core` are turned into absorbance features
//! ([`preprocess`]), random forests are tuned by cross-validated grid search
//! ([`search`]) and applied per pixel to multispectral images
//! ([`estimate`]). A closed-form haemoglobin unmixing ([`linear`]) serves as
//! baseline for oxygen saturation.
//!
//! All models implement [`Regressor`], which is what scoring, image
//! estimation and reprojection work against.
//!
//! ## Domain adaptation
//!
//! When the simulated training distribution differs from the measured one,
//! [`domain_adaptation::estimate_weights_random_forests`] derives importance
//! weights from a source/target discriminator; they feed straight into
//! [`GridSearch::fit`](search::GridSearch::fit).

pub mod artifact;
pub mod domain_adaptation;
pub mod estimate;
pub mod forest;
pub mod linear;
pub mod metrics;
pub mod preprocess;
pub mod regressor;
pub mod search;

pub use artifact::{TrainedModel, TrainedRegressor};
pub use estimate::MultispectralImage;
pub use forest::{RandomForest, RandomForestParams};
pub use linear::LinearSaO2Unmixing;
pub use preprocess::{PreprocessOptions, TargetColumn};
pub use regressor::{Regressor, RegressionError};
pub use search::{GridSearch, KFold, ParamGrid};
