//! Forecaster library for hourly temperature prediction
//!
//! This crate provides the core functionality for:
//! - Fetching hourly readings from a weather provider
//! - Feature engineering and feature/target alignment
//! - Training a gradient-boosted regressor and persisting the pipeline
//! - Storing readings and predictions and scoring the predictions
//! - Scheduling the inference and training jobs
//! - Health checks and observability

pub mod collector;
pub mod error;
pub mod features;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod store;

pub use error::{ForecastError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::{HistoryRow, Prediction, Reading};
pub use observability::{ForecastMetrics, StructuredLogger};
