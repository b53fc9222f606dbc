//! Patient status and population summaries.
//!
//! Everything here is recomputed from full histories on every call; there are
//! no running counters to drift from the stored events.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::PatientHistory;
use crate::tier::{to_percent, RiskTier};
use crate::{CardioConfig, TierGranularity};

/// One row of the doctor dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientSummary {
    pub id: String,
    pub name: Option<String>,
    pub age: Option<f64>,
    pub last_test: Option<DateTime<Utc>>,
    /// Aggregate probability under the configured granularity.
    pub risk_score: f64,
    pub risk_percent: f64,
    pub status: RiskTier,
    pub count: usize,
}

/// Population-level counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PopulationStats {
    pub total_patients: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    /// Mean of the patients' aggregate probabilities.
    pub avg_risk: f64,
    pub avg_risk_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PopulationSummary {
    pub patients: Vec<PatientSummary>,
    pub stats: PopulationStats,
}

/// Aggregate probability of a history under `granularity`; 0 when empty.
pub fn aggregate_risk(history: &PatientHistory, granularity: TierGranularity) -> f64 {
    match granularity {
        TierGranularity::LifetimeAverage => history.mean_risk(),
        TierGranularity::LatestEvent => history
            .latest()
            .map(|event| event.risk_score)
            .unwrap_or(0.0),
    }
}

/// Current tier of a patient. An empty history is Low.
pub fn tier_for_history(history: &PatientHistory, granularity: TierGranularity) -> RiskTier {
    RiskTier::from_probability(aggregate_risk(history, granularity))
}

/// Tier of each event, in chronological order.
pub fn event_tiers(history: &PatientHistory) -> Vec<RiskTier> {
    history.events().iter().map(|event| event.tier()).collect()
}

/// Summarize many histories for the doctor dashboard.
///
/// Empty histories are skipped. An empty population is the zero state.
pub fn summarize(histories: &[PatientHistory], config: &CardioConfig) -> PopulationSummary {
    let mut patients: Vec<PatientSummary> = histories
        .iter()
        .filter(|history| !history.is_empty())
        .map(|history| summarize_patient(history, config))
        .collect();

    patients.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut stats = PopulationStats {
        total_patients: patients.len(),
        ..PopulationStats::default()
    };
    for patient in &patients {
        match patient.status {
            RiskTier::High => stats.high_risk += 1,
            RiskTier::Medium => stats.medium_risk += 1,
            RiskTier::Low => stats.low_risk += 1,
        }
    }
    if !patients.is_empty() {
        stats.avg_risk =
            patients.iter().map(|p| p.risk_score).sum::<f64>() / patients.len() as f64;
        stats.avg_risk_percent = to_percent(stats.avg_risk, config.percent_decimals);
    }

    PopulationSummary { patients, stats }
}

fn summarize_patient(history: &PatientHistory, config: &CardioConfig) -> PatientSummary {
    let first = history.first();
    let risk_score = aggregate_risk(history, config.granularity);

    PatientSummary {
        id: history.subject_id.clone(),
        name: first
            .and_then(|event| event.subject.as_ref())
            .and_then(|subject| subject.name.clone()),
        age: first.and_then(|event| event.record.age()),
        last_test: history.last_scored_at(),
        risk_score,
        risk_percent: to_percent(risk_score, config.percent_decimals),
        status: RiskTier::from_probability(risk_score),
        count: history.len(),
    }
}
