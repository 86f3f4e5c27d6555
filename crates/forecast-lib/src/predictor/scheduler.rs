//! Interval-driven job scheduling
//!
//! Inference and training each run in their own task. A job's next run
//! starts only after its previous run returned, so a job never overlaps
//! itself; the two jobs may overlap each other.

use super::{InferenceCycle, TrainingCycle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

fn default_inference_interval_secs() -> u64 {
    3600
}

fn default_inference_delay_secs() -> u64 {
    5
}

fn default_training_interval_secs() -> u64 {
    86400
}

fn default_train_on_startup() -> bool {
    true
}

/// Job periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_inference_interval_secs")]
    pub inference_interval_secs: u64,
    /// Delay before the first inference run after startup
    #[serde(default = "default_inference_delay_secs")]
    pub inference_initial_delay_secs: u64,
    #[serde(default = "default_training_interval_secs")]
    pub training_interval_secs: u64,
    /// Train immediately when no artifact exists yet
    #[serde(default = "default_train_on_startup")]
    pub train_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            inference_interval_secs: default_inference_interval_secs(),
            inference_initial_delay_secs: default_inference_delay_secs(),
            training_interval_secs: default_training_interval_secs(),
            train_on_startup: default_train_on_startup(),
        }
    }
}

pub struct JobScheduler {
    inference: Arc<InferenceCycle>,
    training: Arc<TrainingCycle>,
    config: ScheduleConfig,
}

impl JobScheduler {
    pub fn new(inference: Arc<InferenceCycle>, training: Arc<TrainingCycle>, config: ScheduleConfig) -> Self {
        Self {
            inference,
            training,
            config,
        }
    }

    /// Start both job loops; they stop when `shutdown` fires
    pub fn spawn(self: Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let inference = tokio::spawn(Arc::clone(&self).run_inference(shutdown.subscribe()));
        let training = tokio::spawn(Arc::clone(&self).run_training(shutdown.subscribe()));
        vec![inference, training]
    }

    /// Hourly inference, first run shortly after startup
    pub async fn run_inference(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs(self.config.inference_interval_secs.max(1));
        let delay = Duration::from_secs(self.config.inference_initial_delay_secs);
        info!(
            interval_secs = period.as_secs(),
            initial_delay_secs = delay.as_secs(),
            "Starting inference job"
        );

        let mut ticker = interval_at(Instant::now() + delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.inference.run().await {
                        warn!(error = %e, "Inference job run failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down inference job");
                    break;
                }
            }
        }
    }

    /// Daily training, immediately on startup when no artifact exists
    pub async fn run_training(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs(self.config.training_interval_secs.max(1));
        let train_now = self.config.train_on_startup && !self.training.has_artifact();
        info!(
            interval_secs = period.as_secs(),
            train_now,
            "Starting training job"
        );

        let first = if train_now {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.training.run().await {
                        warn!(error = %e, "Training job run failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down training job");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;
    use crate::model::ArtifactStore;
    use crate::models::{hourly_range, Reading};
    use crate::predictor::test_support::{context, MockCollector};
    use crate::predictor::{InferenceConfig, TrainingConfig};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_schedule_defaults() {
        let config = ScheduleConfig::default();
        assert_eq!(config.inference_interval_secs, 3600);
        assert_eq!(config.inference_initial_delay_secs, 5);
        assert_eq!(config.training_interval_secs, 86400);
        assert!(config.train_on_startup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_and_stop_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let readings: Vec<Reading> = hourly_range(Utc::now(), 400)
            .into_iter()
            .enumerate()
            .map(|(i, ts)| Reading::new(ts, 10.0 + (i % 24) as f64))
            .collect();
        let collector = Arc::new(MockCollector::new(&readings));
        let ctx = context(collector.clone(), ArtifactStore::new(dir.path().join("p.json")));

        let mut training_config = TrainingConfig::default();
        training_config.boosting.n_estimators = 5;
        let training = Arc::new(
            TrainingCycle::new(ctx.clone(), FeatureConfig::default(), &training_config).unwrap(),
        );
        let inference = Arc::new(InferenceCycle::new(
            ctx.clone(),
            &FeatureConfig::default(),
            &InferenceConfig::default(),
        ));

        let scheduler = Arc::new(JobScheduler::new(inference, training, ScheduleConfig::default()));
        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = scheduler.spawn(&shutdown_tx);

        // Startup training runs at once; inference after the initial delay
        tokio::time::sleep(Duration::from_secs(6)).await;

        shutdown_tx.send(()).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(collector.call_count() >= 2);
        assert!(ctx.artifacts.exists());
        assert!(!ctx.store.readings().unwrap().is_empty());
    }
}
