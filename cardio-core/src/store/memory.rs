use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::history::{PatientHistory, ScoreEvent};
use crate::store::{HistoryFilter, HistoryStore};
use crate::Result;

#[derive(Default)]
struct MemoryInner {
    subjects: BTreeMap<String, Vec<ScoreEvent>>,
    anonymous: Vec<ScoreEvent>,
}

/// Process-local store. Appends push whole events under the write lock.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave a half-pushed event behind, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, MemoryInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn append(&self, event: ScoreEvent) -> Result<()> {
        let mut inner = self.write();
        match event.subject_id().map(str::to_string) {
            Some(subject_id) => inner.subjects.entry(subject_id).or_default().push(event),
            None => inner.anonymous.push(event),
        }
        Ok(())
    }

    fn history(&self, subject_id: &str) -> Result<PatientHistory> {
        let events = self
            .read()
            .subjects
            .get(subject_id)
            .cloned()
            .unwrap_or_default();
        Ok(PatientHistory::new(subject_id, events))
    }

    fn all_histories(&self, filter: &HistoryFilter) -> Result<Vec<PatientHistory>> {
        let inner = self.read();
        Ok(inner
            .subjects
            .iter()
            .filter(|(subject_id, _)| filter.includes_subject(subject_id))
            .map(|(subject_id, events)| PatientHistory::new(subject_id.clone(), events.clone()))
            .filter_map(|history| filter.apply(history))
            .collect())
    }

    fn anonymous_events(&self) -> Result<Vec<ScoreEvent>> {
        Ok(self.read().anonymous.clone())
    }
}
