//! Score events and per-subject histories.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::ClinicalRecord;
use crate::tier::{to_percent, RiskTier};

/// Caller identity attached to a score, when known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl SubjectIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse the JSON identity header sent by the front end
    /// (`{"id": "...", "name": "..."}`).
    ///
    /// Anything malformed yields `None`; an unreadable identity never fails
    /// the score itself.
    pub fn from_header(header: Option<&str>) -> Option<Self> {
        let value: Value = serde_json::from_str(header?).ok()?;
        let id = match value.get("id")? {
            Value::String(id) if !id.trim().is_empty() => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self { id, name })
    }
}

/// One persisted outcome of the scoring pipeline. Never edited once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEvent {
    #[serde(default)]
    pub subject: Option<SubjectIdentity>,
    pub record: ClinicalRecord,
    pub risk_score: f64,
    pub scored_at: DateTime<Utc>,
    pub model_version: String,
    pub artifact_digest: String,
}

impl ScoreEvent {
    pub fn subject_id(&self) -> Option<&str> {
        self.subject.as_ref().map(|subject| subject.id.as_str())
    }

    pub fn tier(&self) -> RiskTier {
        RiskTier::from_probability(self.risk_score)
    }
}

/// A point on a patient's risk trend chart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub scored_at: DateTime<Utc>,
    pub risk_percent: f64,
    pub tier: RiskTier,
}

/// Score events of one subject, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientHistory {
    pub subject_id: String,
    events: Vec<ScoreEvent>,
}

impl PatientHistory {
    /// Build a history, ordering events by timestamp. Events with equal
    /// timestamps keep their append order.
    pub fn new(subject_id: impl Into<String>, mut events: Vec<ScoreEvent>) -> Self {
        events.sort_by_key(|event| event.scored_at);
        Self {
            subject_id: subject_id.into(),
            events,
        }
    }

    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&ScoreEvent> {
        self.events.last()
    }

    pub fn first(&self) -> Option<&ScoreEvent> {
        self.events.first()
    }

    pub fn last_scored_at(&self) -> Option<DateTime<Utc>> {
        self.latest().map(|event| event.scored_at)
    }

    pub fn probabilities(&self) -> impl Iterator<Item = f64> + '_ {
        self.events.iter().map(|event| event.risk_score)
    }

    /// Arithmetic mean of all event probabilities; 0 for an empty history.
    pub fn mean_risk(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        self.probabilities().sum::<f64>() / self.events.len() as f64
    }

    /// Chronological chart data, percentages rounded to `decimals`.
    pub fn trend(&self, decimals: u32) -> Vec<TrendPoint> {
        self.events
            .iter()
            .map(|event| TrendPoint {
                scored_at: event.scored_at,
                risk_percent: to_percent(event.risk_score, decimals),
                tier: event.tier(),
            })
            .collect()
    }

    /// Keep only events at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> Self {
        Self {
            subject_id: self.subject_id.clone(),
            events: self
                .events
                .iter()
                .filter(|event| event.scored_at >= since)
                .cloned()
                .collect(),
        }
    }
}

/// Group events by subject id. Anonymous events are dropped; histories come
/// back ordered by subject id.
pub fn group_histories(events: impl IntoIterator<Item = ScoreEvent>) -> Vec<PatientHistory> {
    let mut grouped: BTreeMap<String, Vec<ScoreEvent>> = BTreeMap::new();
    for event in events {
        let Some(subject_id) = event.subject_id().map(str::to_string) else {
            continue;
        };
        grouped.entry(subject_id).or_default().push(event);
    }

    grouped
        .into_iter()
        .map(|(subject_id, events)| PatientHistory::new(subject_id, events))
        .collect()
}
