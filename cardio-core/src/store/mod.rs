//! Append-only storage of score events.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::history::{PatientHistory, ScoreEvent};
use crate::Result;

mod jsonl;
mod memory;

pub use jsonl::JsonlHistoryStore;
pub use memory::MemoryHistoryStore;

/// Persistence of score events.
///
/// Each append lands as one atomic unit: readers see the whole event or none
/// of it. Readers may miss the most recent append.
pub trait HistoryStore: Send + Sync {
    /// Append an event under its subject. Events without a subject go to the
    /// anonymous log and belong to no patient history.
    fn append(&self, event: ScoreEvent) -> Result<()>;

    /// Events of one subject, oldest first. Unknown subjects have an empty
    /// history.
    fn history(&self, subject_id: &str) -> Result<PatientHistory>;

    /// Histories matching `filter`, ordered by subject id. Histories left
    /// empty by the filter are omitted.
    fn all_histories(&self, filter: &HistoryFilter) -> Result<Vec<PatientHistory>>;

    /// Events scored without a subject identity.
    fn anonymous_events(&self) -> Result<Vec<ScoreEvent>>;
}

/// Selection applied by [`HistoryStore::all_histories`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFilter {
    /// Restrict to these subjects, e.g. the patients linked to one doctor.
    pub subject_ids: Option<BTreeSet<String>>,
    /// Drop events scored before this instant.
    pub since: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_subjects<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject_ids: Some(ids.into_iter().map(Into::into).collect()),
            since: None,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn includes_subject(&self, subject_id: &str) -> bool {
        self.subject_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(subject_id))
    }

    /// Apply the filter to one history; `None` when nothing is left.
    pub fn apply(&self, history: PatientHistory) -> Option<PatientHistory> {
        if !self.includes_subject(&history.subject_id) {
            return None;
        }
        let history = match self.since {
            Some(since) => history.since(since),
            None => history,
        };
        (!history.is_empty()).then_some(history)
    }
}
