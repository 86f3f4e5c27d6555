//! Error types for the forecasting core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the forecasting core
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The weather provider failed (network, timeout, malformed response)
    #[error("Data fetch failed: {0}")]
    DataFetch(String),

    /// Not enough history to build aligned training data or an inference row
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No pipeline artifact has been written yet
    #[error("Pipeline artifact unavailable at {}", .0.display())]
    ArtifactUnavailable(PathBuf),

    /// The artifact exists but cannot be used (checksum mismatch, bad envelope)
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Regressor fitting or prediction failed
    #[error("Model error: {0}")]
    Model(String),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Persisted store failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type with the forecasting error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<reqwest::Error> for ForecastError {
    fn from(err: reqwest::Error) -> Self {
        ForecastError::DataFetch(err.to_string())
    }
}

impl ForecastError {
    /// Short machine-friendly label, used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::DataFetch(_) => "data_fetch",
            ForecastError::InsufficientData(_) => "insufficient_data",
            ForecastError::ArtifactUnavailable(_) => "artifact_unavailable",
            ForecastError::Artifact(_) => "artifact",
            ForecastError::Model(_) => "model",
            ForecastError::InvalidConfig(_) => "invalid_config",
            ForecastError::Storage(_) => "storage",
            ForecastError::Serialization(_) => "serialization",
            ForecastError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ForecastError::InsufficientData("0 aligned rows".to_string());
        assert_eq!(err.to_string(), "Insufficient data: 0 aligned rows");

        let err = ForecastError::ArtifactUnavailable(PathBuf::from("/tmp/pipeline.json"));
        assert!(err.to_string().contains("/tmp/pipeline.json"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ForecastError::DataFetch("x".into()).kind(), "data_fetch");
        assert_eq!(
            ForecastError::ArtifactUnavailable(PathBuf::new()).kind(),
            "artifact_unavailable"
        );
    }
}
