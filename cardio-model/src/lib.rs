//! Serving side of the cardiovascular risk model: the frozen artifact, the
//! category encoders, feature assembly and the scoring pipeline.

pub mod artifact;
pub mod encoder;
pub mod features;
pub mod pipeline;
pub mod service;

pub use artifact::{
    load_artifact_bytes, load_artifact_file, sha256_hex, ClassifierParams, FeatureSpec,
    GradientBoostingParams, LoadedArtifact, LogisticParams, RegressionTree, ScoringArtifact,
    StandardScaler, TreeNode, ARTIFACT_FORMAT,
};
pub use encoder::{CategoryVocabulary, EncoderRegistry};
pub use features::{normalize_boolean, FeatureBuilder, FeatureVector, BOOLEAN_TOKENS};
pub use pipeline::{sigmoid, ScoringPipeline};
pub use service::ScoringService;

use cardio_core::{ClinicalRecord, Result};

/// Score a JSON record against a JSON artifact in one call.
pub fn score_json_str(artifact_json: &str, record_json: &str) -> Result<f64> {
    let loaded = load_artifact_bytes(artifact_json.as_bytes(), None)?;
    let pipeline = ScoringPipeline::new(loaded)?;
    let record = ClinicalRecord::from_json_str(record_json)?;
    pipeline.score(&record)
}
