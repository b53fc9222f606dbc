//! Core types for cardiovascular risk scoring: clinical records, risk tiers,
//! score events, patient histories and population aggregation.

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod history;
pub mod record;
pub mod store;
pub mod tier;

pub use aggregate::{
    aggregate_risk, event_tiers, summarize, tier_for_history, PatientSummary, PopulationStats,
    PopulationSummary,
};
pub use history::{group_histories, PatientHistory, ScoreEvent, SubjectIdentity, TrendPoint};
pub use record::{ClinicalField, ClinicalRecord, FieldKind, FieldValue};
pub use store::{HistoryFilter, HistoryStore, JsonlHistoryStore, MemoryHistoryStore};
pub use tier::{
    to_percent, RiskTier, HIGH_RISK_THRESHOLD, MAX_PERCENT_DECIMALS, MEDIUM_RISK_THRESHOLD,
};

/// Settings for how histories are aggregated and presented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CardioConfig {
    /// Which probability stands for a patient's current status.
    pub granularity: TierGranularity,
    /// Decimal places kept when presenting risk as a percentage.
    pub percent_decimals: u32,
}

impl Default for CardioConfig {
    fn default() -> Self {
        Self {
            granularity: TierGranularity::LifetimeAverage,
            percent_decimals: 1,
        }
    }
}

/// Aggregation granularity for a patient's tier.
///
/// The two modes classify the same history differently: `[0.2, 0.5, 0.9]`
/// averages to Medium while its latest event is High.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TierGranularity {
    /// Arithmetic mean of every event probability in the history.
    #[default]
    LifetimeAverage,
    /// Probability of the most recent event.
    LatestEvent,
}

/// Errors raised while scoring or aggregating.
#[derive(Debug, thiserror::Error)]
pub enum CardioError {
    #[error("invalid value {value:?} for {field}")]
    UnknownCategory { field: String, value: String },
    #[error("missing required feature {0}")]
    MissingFeature(String),
    #[error("unknown clinical field {0:?}")]
    UnknownField(String),
    #[error("{field} must be numeric, received {value:?}")]
    InvalidNumber { field: String, value: String },
    #[error("invalid clinical record: {0}")]
    InvalidRecord(String),
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),
    #[error("cannot load artifact: {0}")]
    Artifact(String),
    #[error("scoring pipeline is not ready")]
    NotReady,
    #[error("history store failure: {0}")]
    Store(String),
}

impl CardioError {
    /// True when the caller supplied bad input, as opposed to a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CardioError::UnknownCategory { .. }
                | CardioError::MissingFeature(_)
                | CardioError::UnknownField(_)
                | CardioError::InvalidNumber { .. }
                | CardioError::InvalidRecord(_)
        )
    }
}

pub type Result<T, E = CardioError> = std::result::Result<T, E>;
