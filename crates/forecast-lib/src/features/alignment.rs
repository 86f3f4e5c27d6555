//! Feature/target alignment
//!
//! Training pairs the feature row at position `p` with the raw value at
//! `p + window`. The first [`WARM_UP_ROWS`] positions never produce a pair:
//! lags and smoothing history are not fully informed there.

use super::{FeatureDescriptor, FeaturePipeline};
use crate::error::{ForecastError, Result};
use crate::models::Reading;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Leading positions discarded before features are trusted
pub const WARM_UP_ROWS: usize = 24;

/// Matched features and targets for one training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    /// Time of each feature row
    pub timestamps: Vec<DateTime<Utc>>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
    pub descriptors: Vec<FeatureDescriptor>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Forecast horizon and warm-up used to line up features with targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    window: usize,
    warm_up: usize,
}

impl Alignment {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidConfig(
                "forecast window must be at least one step".to_string(),
            ));
        }
        Ok(Self {
            window,
            warm_up: WARM_UP_ROWS,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn warm_up(&self) -> usize {
        self.warm_up
    }

    /// Build the aligned training pair from a raw series.
    ///
    /// Features come from the series without its last `window` points (no
    /// target exists for them). Targets are the series shifted back by
    /// `window` with the warm-up positions removed. Rows are joined on their
    /// position in the raw series, so `features[i]` always predicts
    /// `target[i]`.
    pub fn training_set(&self, pipeline: &FeaturePipeline, readings: &[Reading]) -> Result<TrainingSet> {
        let insufficient = || {
            ForecastError::InsufficientData(format!(
                "{} points cannot cover a warm-up of {} plus max lag {} and window {}",
                readings.len(),
                self.warm_up,
                pipeline.config().max_lag(),
                self.window
            ))
        };

        if readings.len() <= self.window {
            return Err(insufficient());
        }
        let trimmed = &readings[..readings.len() - self.window];
        let frame = pipeline.transform_readings(trimmed)?;
        let matrix = frame.to_matrix()?;

        let positions: HashMap<DateTime<Utc>, usize> = trimmed
            .iter()
            .enumerate()
            .map(|(i, r)| (r.timestamp, i))
            .collect();

        let mut set = TrainingSet {
            timestamps: Vec::new(),
            features: Vec::new(),
            target: Vec::new(),
            descriptors: frame.descriptors(),
        };
        for (ts, row) in frame.index().iter().zip(matrix) {
            let Some(&pos) = positions.get(ts) else {
                continue;
            };
            if pos < self.warm_up {
                continue;
            }
            set.timestamps.push(*ts);
            set.features.push(row);
            set.target.push(readings[pos + self.window].value);
        }

        if set.is_empty() {
            return Err(insufficient());
        }
        Ok(set)
    }

    /// The single feature row used for inference: the last one the pipeline emits
    pub fn inference_row(
        &self,
        pipeline: &FeaturePipeline,
        readings: &[Reading],
    ) -> Result<(DateTime<Utc>, Vec<f64>)> {
        let frame = pipeline.transform_readings(readings)?;
        let last = frame.len().checked_sub(1).ok_or_else(|| {
            ForecastError::InsufficientData(format!(
                "{} points produce no complete feature row (need {})",
                readings.len(),
                pipeline.config().inference_lookback()
            ))
        })?;
        let mut matrix = frame.to_matrix()?;
        let row = matrix.swap_remove(last);
        Ok((frame.index()[last], row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::hourly_readings;
    use crate::features::FeatureConfig;
    use proptest::prelude::*;

    fn pipeline() -> FeaturePipeline {
        FeaturePipeline::new(FeatureConfig::default()).unwrap()
    }

    #[test]
    fn test_window_must_be_positive() {
        assert!(Alignment::new(0).is_err());
        assert_eq!(Alignment::new(1).unwrap().window(), 1);
    }

    #[test]
    fn test_training_set_alignment() {
        let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let readings = hourly_readings(&values);
        let set = Alignment::new(1).unwrap().training_set(&pipeline(), &readings).unwrap();

        // 40 points - 24 warm-up - 1 window
        assert_eq!(set.len(), 15);
        assert_eq!(set.features.len(), set.target.len());
        for (i, target) in set.target.iter().enumerate() {
            assert_eq!(*target, values[i + WARM_UP_ROWS + 1]);
        }
        // lag0 column of features[i] is the raw value at i + 24
        let lag0 = set
            .descriptors
            .iter()
            .position(|d| d.name == "temp_lag0")
            .unwrap();
        assert_eq!(set.features[0][lag0], values[WARM_UP_ROWS]);
        assert_eq!(set.timestamps[0], readings[WARM_UP_ROWS].timestamp);
    }

    #[test]
    fn test_training_set_wider_window() {
        let values: Vec<f64> = (0..40).map(|i| i as f64 * 2.0).collect();
        let set = Alignment::new(3)
            .unwrap()
            .training_set(&pipeline(), &hourly_readings(&values))
            .unwrap();
        assert_eq!(set.len(), 40 - 24 - 3);
        assert_eq!(set.target[0], values[24 + 3]);
    }

    #[test]
    fn test_short_lags_still_respect_warm_up() {
        let config = FeatureConfig {
            lags: vec![0, 1],
            ..Default::default()
        };
        let pipeline = FeaturePipeline::new(config).unwrap();
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let set = Alignment::new(1)
            .unwrap()
            .training_set(&pipeline, &hourly_readings(&values))
            .unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.target[0], 25.0);
    }

    #[test]
    fn test_insufficient_data() {
        let readings = hourly_readings(&vec![1.0; 25]);
        let result = Alignment::new(1).unwrap().training_set(&pipeline(), &readings);
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));

        let result = Alignment::new(1).unwrap().training_set(&pipeline(), &[]);
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
    }

    #[test]
    fn test_inference_row_uses_last_row() {
        let values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let readings = hourly_readings(&values);
        let (ts, row) = Alignment::new(1)
            .unwrap()
            .inference_row(&pipeline(), &readings)
            .unwrap();
        assert_eq!(ts, readings[29].timestamp);
        assert_eq!(row.len(), 7);
        // lag0 and lag24 sit at positions 2 and 6
        assert_eq!(row[2], 29.0);
        assert_eq!(row[6], 5.0);
    }

    #[test]
    fn test_inference_row_insufficient() {
        let readings = hourly_readings(&vec![1.0; 24]);
        let result = Alignment::new(1).unwrap().inference_row(&pipeline(), &readings);
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
    }

    proptest! {
        #[test]
        fn prop_alignment_lengths_match(len in 26usize..120, window in 1usize..6) {
            prop_assume!(len > WARM_UP_ROWS + window);
            let values: Vec<f64> = (0..len).map(|i| (i as f64 * 0.7).sin() * 10.0).collect();
            let set = Alignment::new(window)
                .unwrap()
                .training_set(&pipeline(), &hourly_readings(&values))
                .unwrap();
            prop_assert_eq!(set.features.len(), set.target.len());
            prop_assert_eq!(set.len(), len - WARM_UP_ROWS - window);
            for (i, target) in set.target.iter().enumerate() {
                prop_assert_eq!(*target, values[i + WARM_UP_ROWS + window]);
            }
        }

        #[test]
        fn prop_feature_construction_is_deterministic(values in prop::collection::vec(-20.0f64..35.0, 30..90)) {
            let readings = hourly_readings(&values);
            let alignment = Alignment::new(1).unwrap();
            let first = alignment.training_set(&pipeline(), &readings).unwrap();
            let second = alignment.training_set(&pipeline(), &readings).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
