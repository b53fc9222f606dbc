//! Risk tiers derived from probabilities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Probabilities strictly above this value are High risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
/// Probabilities strictly above this value (and not High) are Medium risk.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

/// Clinical risk classification. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Classify a probability in `[0, 1]`.
    ///
    /// Both thresholds are exclusive: 0.7 is Medium and 0.4 is Low.
    pub fn from_probability(probability: f64) -> Self {
        if probability > HIGH_RISK_THRESHOLD {
            RiskTier::High
        } else if probability > MEDIUM_RISK_THRESHOLD {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Classify a percentage in `[0, 100]`.
    pub fn from_percent(percent: f64) -> Self {
        if percent > HIGH_RISK_THRESHOLD * 100.0 {
            RiskTier::High
        } else if percent > MEDIUM_RISK_THRESHOLD * 100.0 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Dashboard status label.
    pub fn status_label(self) -> &'static str {
        match self {
            RiskTier::Low => "Low Risk",
            RiskTier::Medium => "Medium Risk",
            RiskTier::High => "High Risk",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => f.write_str("Low"),
            RiskTier::Medium => f.write_str("Medium"),
            RiskTier::High => f.write_str("High"),
        }
    }
}

/// Most decimal places an `f64` percentage can meaningfully carry.
pub const MAX_PERCENT_DECIMALS: u32 = 15;

/// Convert a probability to a percentage rounded to `decimals` places,
/// capped at [`MAX_PERCENT_DECIMALS`].
pub fn to_percent(probability: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(MAX_PERCENT_DECIMALS) as i32);
    (probability * 100.0 * factor).round() / factor
}
