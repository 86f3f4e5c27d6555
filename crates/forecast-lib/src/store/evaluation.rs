//! Trailing prediction error

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rows in the trailing window: 24 error terms plus the anchor hour
pub const DEFAULT_EVALUATION_ROWS: usize = 25;

/// Result of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Prediction row the error was written to
    pub timestamp: DateTime<Utc>,
    pub mse: f64,
    /// Rows the mean was taken over
    pub rows: usize,
}

/// Computes the trailing mean squared error of predictions against readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationEngine {
    rows: usize,
}

impl Default for EvaluationEngine {
    fn default() -> Self {
        Self {
            rows: DEFAULT_EVALUATION_ROWS,
        }
    }
}

impl EvaluationEngine {
    pub fn new(rows: usize) -> Result<Self> {
        if rows == 0 {
            return Err(ForecastError::InvalidConfig(
                "evaluation window must hold at least one row".to_string(),
            ));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// MSE over the last `rows` pairs of `(actual, predicted)`, oldest first.
    ///
    /// A missing prediction counts as a perfect one. Returns `None` for an
    /// empty input.
    pub fn mean_squared_error(&self, pairs: &[(f64, Option<f64>)]) -> Option<f64> {
        let start = pairs.len().saturating_sub(self.rows);
        let window = &pairs[start..];
        if window.is_empty() {
            return None;
        }
        let total: f64 = window
            .iter()
            .map(|&(actual, predicted)| {
                let diff = actual - predicted.unwrap_or(actual);
                diff * diff
            })
            .sum();
        Some(total / window.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window() {
        assert_eq!(EvaluationEngine::default().rows(), 25);
        assert!(EvaluationEngine::new(0).is_err());
    }

    #[test]
    fn test_mse_with_missing_predictions() {
        let pairs = [
            (10.0, None),
            (11.0, Some(10.5)),
            (9.0, Some(10.8)),
            (12.0, Some(9.2)),
        ];
        let mse = EvaluationEngine::default().mean_squared_error(&pairs).unwrap();
        assert!((mse - 2.8325).abs() < 1e-9);
    }

    #[test]
    fn test_mse_uses_trailing_rows_only() {
        let engine = EvaluationEngine::new(2).unwrap();
        let pairs = [(0.0, Some(100.0)), (1.0, Some(2.0)), (3.0, Some(1.0))];
        // (1 + 4) / 2
        assert_eq!(engine.mean_squared_error(&pairs), Some(2.5));
    }

    #[test]
    fn test_mse_empty() {
        assert_eq!(EvaluationEngine::default().mean_squared_error(&[]), None);
    }

    #[test]
    fn test_mse_all_missing_is_zero() {
        let pairs = [(4.0, None), (5.0, None)];
        assert_eq!(EvaluationEngine::default().mean_squared_error(&pairs), Some(0.0));
    }
}
