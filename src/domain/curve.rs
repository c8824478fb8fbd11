//! Demand curves: how a raw sensor value becomes a 0–100 demand score.
//!
//! A curve is resolved once from configuration and then evaluated every
//! cycle. Evaluation never fails: a missing reading simply scores zero.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;

use super::types::{Percent, FULL};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    #[error("threshold must be a finite number, got {0}")]
    NonFiniteThreshold(f64),
    #[error("linear curve requires max_value")]
    MissingMaxValue,
    #[error("linear curve requires max_value > threshold (threshold={threshold}, max_value={max_value})")]
    InvalidRange { threshold: f64, max_value: f64 },
}

/// Shape of a demand curve as named in configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CurveMode {
    /// 0 below the threshold, 100 at or above it.
    Step,
    /// Interpolates from 0 at the threshold to 100 at `max_value`.
    Linear,
}

/// A validated demand curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DemandCurve {
    Step { threshold: f64 },
    Linear { threshold: f64, max_value: f64 },
}

impl DemandCurve {
    /// Build a curve, rejecting parameters that would make it undefined.
    ///
    /// `max_value` is only consulted for linear curves.
    pub fn new(mode: CurveMode, threshold: f64, max_value: Option<f64>) -> Result<Self, CurveError> {
        if !threshold.is_finite() {
            return Err(CurveError::NonFiniteThreshold(threshold));
        }
        match mode {
            CurveMode::Step => Ok(Self::Step { threshold }),
            CurveMode::Linear => {
                let max_value = max_value.ok_or(CurveError::MissingMaxValue)?;
                if !(max_value > threshold) {
                    return Err(CurveError::InvalidRange { threshold, max_value });
                }
                Ok(Self::Linear { threshold, max_value })
            }
        }
    }

    pub fn step(threshold: f64) -> Result<Self, CurveError> {
        Self::new(CurveMode::Step, threshold, None)
    }

    pub fn linear(threshold: f64, max_value: f64) -> Result<Self, CurveError> {
        Self::new(CurveMode::Linear, threshold, Some(max_value))
    }

    pub fn mode(&self) -> CurveMode {
        match self {
            Self::Step { .. } => CurveMode::Step,
            Self::Linear { .. } => CurveMode::Linear,
        }
    }

    pub fn threshold(&self) -> f64 {
        match *self {
            Self::Step { threshold } | Self::Linear { threshold, .. } => threshold,
        }
    }

    pub fn max_value(&self) -> Option<f64> {
        match *self {
            Self::Step { .. } => None,
            Self::Linear { max_value, .. } => Some(max_value),
        }
    }

    /// Score a reading against this curve.
    pub fn score(&self, value: Option<f64>) -> Percent {
        match *self {
            Self::Step { threshold } => score(value, CurveMode::Step, threshold, threshold),
            Self::Linear { threshold, max_value } => {
                score(value, CurveMode::Linear, threshold, max_value)
            }
        }
    }
}

impl fmt::Display for DemandCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { threshold } => write!(f, "step@{threshold}"),
            Self::Linear { threshold, max_value } => write!(f, "linear {threshold}..{max_value}"),
        }
    }
}

/// Map a reading to a demand score in 0–100.
///
/// * no reading (or NaN) → 0
/// * below `threshold` → 0
/// * step: at or above `threshold` → 100
/// * linear: at or above `max_value` → 100, otherwise
///   `floor(100 * (value - threshold) / (max_value - threshold))`
pub fn score(value: Option<f64>, mode: CurveMode, threshold: f64, max_value: f64) -> Percent {
    let Some(value) = value.filter(|v| !v.is_nan()) else {
        return 0;
    };
    if value < threshold {
        return 0;
    }
    match mode {
        CurveMode::Step => FULL,
        CurveMode::Linear => {
            if value >= max_value {
                return FULL;
            }
            // threshold <= value < max_value, so the span is positive here
            let ratio = 100.0 * (value - threshold) / (max_value - threshold);
            ratio.floor().clamp(0.0, f64::from(FULL)) as Percent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(None, 0)]
    #[case(Some(64.9), 0)]
    #[case(Some(65.0), 100)]
    #[case(Some(65.1), 100)]
    #[case(Some(99.0), 100)]
    fn test_step_scores(#[case] value: Option<f64>, #[case] expected: Percent) {
        assert_eq!(score(value, CurveMode::Step, 65.0, 80.0), expected);
    }

    #[rstest]
    #[case(Some(599.0), 0)]
    #[case(Some(600.0), 0)]
    #[case(Some(609.0), 1)]
    #[case(Some(1050.0), 50)]
    #[case(Some(1499.0), 99)]
    #[case(Some(1500.0), 100)]
    #[case(Some(4000.0), 100)]
    fn test_linear_scores(#[case] value: Option<f64>, #[case] expected: Percent) {
        assert_eq!(score(value, CurveMode::Linear, 600.0, 1500.0), expected);
    }

    #[test]
    fn test_linear_truncates_instead_of_rounding() {
        // 100 * 8.99 / 10 = 89.9 → 89
        assert_eq!(score(Some(68.99), CurveMode::Linear, 60.0, 70.0), 89);
    }

    #[test]
    fn test_nan_reading_scores_zero() {
        assert_eq!(score(Some(f64::NAN), CurveMode::Step, 65.0, 80.0), 0);
        assert_eq!(score(Some(f64::NAN), CurveMode::Linear, 65.0, 80.0), 0);
    }

    #[test]
    fn test_curve_new_validates_linear_range() {
        assert_eq!(
            DemandCurve::linear(70.0, 70.0),
            Err(CurveError::InvalidRange { threshold: 70.0, max_value: 70.0 })
        );
        assert_eq!(
            DemandCurve::new(CurveMode::Linear, 70.0, None),
            Err(CurveError::MissingMaxValue)
        );
        assert!(DemandCurve::linear(70.0, 70.5).is_ok());
    }

    #[test]
    fn test_step_curve_ignores_max_value() {
        let curve = DemandCurve::new(CurveMode::Step, 70.0, Some(10.0)).unwrap();
        assert_eq!(curve, DemandCurve::Step { threshold: 70.0 });
        assert_eq!(curve.max_value(), None);
        assert_eq!(curve.score(Some(70.0)), 100);
    }

    #[test]
    fn test_curve_rejects_nan_threshold() {
        assert!(matches!(
            DemandCurve::step(f64::NAN),
            Err(CurveError::NonFiniteThreshold(_))
        ));
    }

    #[test]
    fn test_curve_mode_parsing() {
        assert_eq!(CurveMode::from_str("step").unwrap(), CurveMode::Step);
        assert_eq!(CurveMode::from_str("linear").unwrap(), CurveMode::Linear);
        assert!(CurveMode::from_str("exponential").is_err());
        // exact names only
        assert!(CurveMode::from_str("Linear").is_err());
        assert!(CurveMode::from_str("STEP").is_err());
        assert!(CurveMode::from_str(" step").is_err());
        assert_eq!(CurveMode::Linear.to_string(), "linear");
    }

    #[test]
    fn test_curve_display() {
        assert_eq!(DemandCurve::step(70.0).unwrap().to_string(), "step@70");
        assert_eq!(
            DemandCurve::linear(600.0, 1500.0).unwrap().to_string(),
            "linear 600..1500"
        );
    }
}
