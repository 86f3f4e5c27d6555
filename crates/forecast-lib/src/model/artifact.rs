//! Durable pipeline artifact storage
//!
//! The artifact is written as a JSON envelope carrying the serialized
//! pipeline and its SHA-256 checksum. Writes go to a temp file that is
//! synced and then renamed over the target, so readers never observe a
//! partially written artifact.

use super::PipelineArtifact;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name used when only a directory is configured
pub const DEFAULT_ARTIFACT_NAME: &str = "forecast_pipeline.json";

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    checksum: String,
    saved_at: DateTime<Utc>,
    payload: String,
}

/// Metadata about a stored artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub version: String,
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: usize,
    pub saved_at: DateTime<Utc>,
}

/// Reads and replaces the artifact at a fixed path
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically replace the stored artifact
    pub fn save<R: Serialize>(&self, artifact: &PipelineArtifact<R>) -> Result<ArtifactVersion> {
        let payload = serde_json::to_string(artifact)?;
        let checksum = compute_checksum(payload.as_bytes());
        let size_bytes = payload.len();
        let saved_at = Utc::now();

        let envelope = ArtifactEnvelope {
            checksum: checksum.clone(),
            saved_at,
            payload,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        info!(
            version = %artifact.version,
            path = %self.path.display(),
            checksum = %checksum,
            size = size_bytes,
            "Pipeline artifact saved"
        );

        Ok(ArtifactVersion {
            version: artifact.version.clone(),
            path: self.path.clone(),
            checksum,
            size_bytes,
            saved_at,
        })
    }

    /// Load and verify the stored artifact
    pub fn load<R: DeserializeOwned>(&self) -> Result<PipelineArtifact<R>> {
        let (envelope, _) = self.read_envelope()?;
        let artifact = serde_json::from_str(&envelope.payload)?;
        Ok(artifact)
    }

    /// Metadata of the stored artifact, if any
    pub fn current_version(&self) -> Result<Option<ArtifactVersion>> {
        let (envelope, version) = match self.read_envelope() {
            Ok(found) => found,
            Err(ForecastError::ArtifactUnavailable(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        debug!(version = %version, saved_at = %envelope.saved_at, "Read artifact metadata");
        Ok(Some(ArtifactVersion {
            version,
            path: self.path.clone(),
            checksum: envelope.checksum,
            size_bytes: envelope.payload.len(),
            saved_at: envelope.saved_at,
        }))
    }

    fn read_envelope(&self) -> Result<(ArtifactEnvelope, String)> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ForecastError::ArtifactUnavailable(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| ForecastError::Artifact(format!("unreadable envelope: {}", e)))?;

        let computed = compute_checksum(envelope.payload.as_bytes());
        if computed != envelope.checksum {
            return Err(ForecastError::Artifact(format!(
                "checksum mismatch: expected {}, got {}",
                envelope.checksum, computed
            )));
        }

        #[derive(Deserialize)]
        struct VersionOnly {
            version: String,
        }
        let version = serde_json::from_str::<VersionOnly>(&envelope.payload)
            .map_err(|e| ForecastError::Artifact(format!("payload has no version: {}", e)))?
            .version;

        Ok((envelope, version))
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Alignment, FeatureConfig, FeaturePipeline};
    use crate::model::{GradientBoostedTrees, ModelTrainer};
    use crate::models::Reading;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn artifact() -> PipelineArtifact<GradientBoostedTrees> {
        let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let readings: Vec<Reading> = (0..60)
            .map(|i| Reading::new(start + Duration::hours(i), 10.0 + (i % 24) as f64 * 0.5))
            .collect();
        ModelTrainer::new(
            FeaturePipeline::new(FeatureConfig::default()).unwrap(),
            Alignment::new(1).unwrap(),
            GradientBoostedTrees::default(),
        )
        .train(&readings, start + Duration::hours(60))
        .unwrap()
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"pipeline");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"pipeline"));
        assert_ne!(checksum, compute_checksum(b"pipeline2"));
    }

    #[test]
    fn test_missing_artifact_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("absent.json"));
        assert!(!store.exists());
        let result = store.load::<GradientBoostedTrees>();
        assert!(matches!(result, Err(ForecastError::ArtifactUnavailable(_))));
        assert!(store.current_version().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("models").join(DEFAULT_ARTIFACT_NAME));
        let original = artifact();

        let saved = store.save(&original).unwrap();
        assert!(store.exists());
        assert_eq!(saved.version, original.version);
        assert!(!dir.path().join("models").join("forecast_pipeline.tmp").exists());

        let loaded: PipelineArtifact<GradientBoostedTrees> = store.load().unwrap();
        assert_eq!(loaded.version, original.version);
        assert_eq!(loaded.descriptors, original.descriptors);
        assert_eq!(loaded.training_rows, original.training_rows);

        let current = store.current_version().unwrap().unwrap();
        assert_eq!(current.checksum, saved.checksum);
        assert_eq!(current.version, saved.version);
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join(DEFAULT_ARTIFACT_NAME));
        let first = artifact();
        store.save(&first).unwrap();

        let mut second = artifact();
        second.version = "20990101T000000Z".to_string();
        store.save(&second).unwrap();

        let loaded: PipelineArtifact<GradientBoostedTrees> = store.load().unwrap();
        assert_eq!(loaded.version, "20990101T000000Z");
    }

    #[test]
    fn test_tampered_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_ARTIFACT_NAME);
        let store = ArtifactStore::new(&path);
        store.save(&artifact()).unwrap();

        let mut envelope: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        envelope["checksum"] = serde_json::Value::String("0".repeat(64));
        fs::write(&path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        let result = store.load::<GradientBoostedTrees>();
        assert!(matches!(result, Err(ForecastError::Artifact(_))));
    }

    #[test]
    fn test_garbage_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_ARTIFACT_NAME);
        fs::write(&path, b"not json").unwrap();
        let result = ArtifactStore::new(&path).load::<GradientBoostedTrees>();
        assert!(matches!(result, Err(ForecastError::Artifact(_))));
    }
}
