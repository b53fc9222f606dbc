//! Scoring service: a published pipeline plus a history store.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use cardio_core::{
    summarize, tier_for_history, CardioConfig, CardioError, ClinicalRecord, HistoryFilter,
    HistoryStore, PatientHistory, PopulationSummary, Result, RiskTier, ScoreEvent,
    SubjectIdentity,
};
use chrono::Utc;
use log::{debug, info};

use crate::artifact::load_artifact_file;
use crate::pipeline::ScoringPipeline;

/// Scores records and keeps per-patient histories.
///
/// The pipeline is published once. Until then every scoring request fails
/// with [`CardioError::NotReady`].
pub struct ScoringService<S> {
    pipeline: OnceLock<Arc<ScoringPipeline>>,
    store: S,
    config: CardioConfig,
}

impl<S: HistoryStore> ScoringService<S> {
    pub fn new(store: S, config: CardioConfig) -> Self {
        Self {
            pipeline: OnceLock::new(),
            store,
            config,
        }
    }

    pub fn config(&self) -> &CardioConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.get().is_some()
    }

    /// Make a fully built pipeline visible to requests.
    pub fn publish(&self, pipeline: ScoringPipeline) -> Result<()> {
        let version = pipeline.model_version().to_string();
        self.pipeline.set(Arc::new(pipeline)).map_err(|_| {
            CardioError::Artifact("a scoring pipeline is already published".to_string())
        })?;
        info!("scoring pipeline {version} published");
        Ok(())
    }

    /// Load, validate and publish the artifact at `path`. Any failure leaves
    /// the service not ready.
    pub fn load_and_publish(
        &self,
        path: impl AsRef<Path>,
        expected_digest: Option<&str>,
    ) -> Result<()> {
        let loaded = load_artifact_file(path, expected_digest)?;
        self.publish(ScoringPipeline::new(loaded)?)
    }

    pub fn pipeline(&self) -> Result<&ScoringPipeline> {
        self.pipeline
            .get()
            .map(Arc::as_ref)
            .ok_or(CardioError::NotReady)
    }

    /// Score a record and append the resulting event to its subject's
    /// history. Rejected input leaves the store untouched.
    pub fn score(
        &self,
        record: ClinicalRecord,
        subject: Option<SubjectIdentity>,
    ) -> Result<ScoreEvent> {
        let pipeline = self.pipeline()?;
        let risk_score = pipeline.score(&record).map_err(|err| {
            debug!("rejected record: {err}");
            err
        })?;

        let event = ScoreEvent {
            subject,
            record,
            risk_score,
            scored_at: Utc::now(),
            model_version: pipeline.model_version().to_string(),
            artifact_digest: pipeline.digest().to_string(),
        };
        self.store.append(event.clone())?;
        Ok(event)
    }

    pub fn patient_history(&self, subject_id: &str) -> Result<PatientHistory> {
        self.store.history(subject_id)
    }

    /// Current tier of a subject, `None` when nothing was scored for them.
    pub fn patient_status(&self, subject_id: &str) -> Result<Option<RiskTier>> {
        let history = self.store.history(subject_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        Ok(Some(tier_for_history(&history, self.config.granularity)))
    }

    pub fn population_summary(&self, filter: &HistoryFilter) -> Result<PopulationSummary> {
        let histories = self.store.all_histories(filter)?;
        Ok(summarize(&histories, &self.config))
    }
}
