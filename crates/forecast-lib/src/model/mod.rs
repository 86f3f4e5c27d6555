//! Regression model, training and artifact persistence

mod artifact;
mod gbt;
mod trainer;

pub use artifact::{ArtifactStore, ArtifactVersion, DEFAULT_ARTIFACT_NAME};
pub use gbt::{BoostingConfig, GradientBoostedTrees, RegressionTree};
pub use trainer::{Forecast, ModelTrainer, PipelineArtifact};

use crate::error::Result;

/// Trait for regression implementations
pub trait Regressor: Send + Sync {
    /// Fit on row-major features `x` and targets `y`
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// One prediction per feature row
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;
}
