//! The three feature stages

use super::{FeatureColumn, FeatureDescriptor, FeatureFrame, Transformer};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

fn base_values<'a>(frame: &'a FeatureFrame, base_column: &str) -> Result<&'a [Option<f64>]> {
    frame
        .column(base_column)
        .map(|c| c.values.as_slice())
        .ok_or_else(|| ForecastError::InvalidConfig(format!("missing base column {}", base_column)))
}

/// Appends one EWMA column per decay factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSeriesStage {
    base_column: String,
    alphas: Vec<f64>,
}

impl SmoothedSeriesStage {
    pub fn new(base_column: &str, alphas: Vec<f64>) -> Self {
        Self {
            base_column: base_column.to_string(),
            alphas,
        }
    }
}

/// Exponentially weighted mean over all prior points.
///
/// Uses the bias-corrected form `sum((1-a)^i * x[t-i]) / sum((1-a)^i)`, so
/// the first value equals the first input. Missing inputs contribute no
/// weight but still age the earlier ones.
pub fn ewma(values: &[Option<f64>], alpha: f64) -> Vec<Option<f64>> {
    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    values
        .iter()
        .map(|value| {
            numerator *= decay;
            denominator *= decay;
            if let Some(v) = value {
                numerator += v;
                denominator += 1.0;
            }
            if denominator > 0.0 {
                Some(numerator / denominator)
            } else {
                None
            }
        })
        .collect()
}

impl Transformer for SmoothedSeriesStage {
    fn transform(&self, mut frame: FeatureFrame) -> Result<FeatureFrame> {
        let base = base_values(&frame, &self.base_column)?.to_vec();
        for &alpha in &self.alphas {
            frame.push_column(FeatureColumn {
                descriptor: FeatureDescriptor::smoothed(&self.base_column, alpha),
                values: ewma(&base, alpha),
            })?;
        }
        Ok(frame)
    }
}

/// Appends one shifted copy of the base column per lag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagStage {
    base_column: String,
    lags: Vec<usize>,
    drop_base: bool,
}

impl LagStage {
    pub fn new(base_column: &str, lags: Vec<usize>, drop_base: bool) -> Self {
        Self {
            base_column: base_column.to_string(),
            lags,
            drop_base,
        }
    }
}

/// Shift forward in time by `lag` steps; the first `lag` rows become missing
pub fn shift(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { None })
        .collect()
}

impl Transformer for LagStage {
    fn transform(&self, mut frame: FeatureFrame) -> Result<FeatureFrame> {
        let base = base_values(&frame, &self.base_column)?.to_vec();
        for &lag in &self.lags {
            frame.push_column(FeatureColumn {
                descriptor: FeatureDescriptor::lag(&self.base_column, lag),
                values: shift(&base, lag),
            })?;
        }
        if self.drop_base {
            frame.drop_column(&self.base_column);
        }
        Ok(frame)
    }
}

/// Drops every row holding at least one missing value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingRowPruneStage;

impl Transformer for MissingRowPruneStage {
    fn transform(&self, mut frame: FeatureFrame) -> Result<FeatureFrame> {
        let missing: Vec<bool> = (0..frame.len()).map(|i| frame.row_has_missing(i)).collect();
        frame.retain_rows(|i| !missing[i]);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::hourly_readings;
    use proptest::prelude::*;

    fn frame(values: &[f64]) -> FeatureFrame {
        FeatureFrame::from_readings("temp", &hourly_readings(values))
    }

    #[test]
    fn test_ewma_first_value_is_identity() {
        let out = ewma(&[Some(12.5), Some(13.0)], 0.3);
        assert_eq!(out[0], Some(12.5));
    }

    #[test]
    fn test_ewma_bias_corrected_weights() {
        // alpha 0.5: second value = (0.5 * 10 + 20) / (0.5 + 1)
        let out = ewma(&[Some(10.0), Some(20.0)], 0.5);
        let expected = (0.5 * 10.0 + 20.0) / 1.5;
        assert!((out[1].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ewma_alpha_one_tracks_input() {
        let input = [Some(1.0), Some(5.0), Some(-2.0)];
        assert_eq!(ewma(&input, 1.0), input.to_vec());
    }

    #[test]
    fn test_ewma_skips_missing_leading_values() {
        let out = ewma(&[None, Some(4.0)], 0.3);
        assert_eq!(out, vec![None, Some(4.0)]);
    }

    #[test]
    fn test_smoothing_keeps_base_column() {
        let stage = SmoothedSeriesStage::new("temp", vec![0.3, 0.1]);
        let out = stage.transform(frame(&[1.0, 2.0, 3.0])).unwrap();
        assert!(out.column("temp").is_some());
        assert!(out.column("temp_ewm_0.3").is_some());
        assert!(out.column("temp_ewm_0.1").is_some());
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_smoothing_requires_base_column() {
        let stage = SmoothedSeriesStage::new("humidity", vec![0.3]);
        assert!(stage.transform(frame(&[1.0])).is_err());
    }

    #[test]
    fn test_lag_shift_introduces_leading_missing() {
        let stage = LagStage::new("temp", vec![0, 2], false);
        let out = stage.transform(frame(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(
            out.column("temp_lag2").unwrap().values,
            vec![None, None, Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_lag_drop_base() {
        let stage = LagStage::new("temp", vec![0, 1], true);
        let out = stage.transform(frame(&[1.0, 2.0])).unwrap();
        assert!(out.column("temp").is_none());
        assert_eq!(out.columns().len(), 2);
    }

    #[test]
    fn test_lag_larger_than_series() {
        let stage = LagStage::new("temp", vec![5], true);
        let out = stage.transform(frame(&[1.0, 2.0])).unwrap();
        assert_eq!(out.column("temp_lag5").unwrap().values, vec![None, None]);
    }

    #[test]
    fn test_prune_drops_rows_with_missing() {
        let lagged = LagStage::new("temp", vec![1], false)
            .transform(frame(&[1.0, 2.0, 3.0]))
            .unwrap();
        let out = MissingRowPruneStage.transform(lagged).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.column("temp").unwrap().values, vec![Some(2.0), Some(3.0)]);
        assert_eq!(out.column("temp_lag1").unwrap().values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(out.index()[0], hourly_readings(&[0.0, 0.0])[1].timestamp);
    }

    proptest! {
        #[test]
        fn prop_lag_zero_is_identity(values in prop::collection::vec(-40.0f64..45.0, 1..80)) {
            let input = frame(&values);
            let out = LagStage::new("temp", vec![0, 3], false).transform(input.clone()).unwrap();
            prop_assert_eq!(
                &out.column("temp_lag0").unwrap().values,
                &input.column("temp").unwrap().values
            );
            prop_assert_eq!(
                &out.column("temp").unwrap().values,
                &input.column("temp").unwrap().values
            );
        }

        #[test]
        fn prop_ewma_stays_within_input_range(values in prop::collection::vec(-40.0f64..45.0, 1..80), alpha in 0.01f64..1.0) {
            let input: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for v in ewma(&input, alpha).into_iter().flatten() {
                prop_assert!(v >= min - 1e-9 && v <= max + 1e-9);
            }
        }
    }
}
