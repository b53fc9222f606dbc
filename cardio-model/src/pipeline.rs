//! Standardize, select, classify.

use std::sync::Arc;

use cardio_core::{CardioError, ClinicalRecord, Result};

use crate::artifact::{
    ClassifierParams, GradientBoostingParams, LoadedArtifact, LogisticParams, RegressionTree,
    ScoringArtifact, TreeNode,
};
use crate::encoder::EncoderRegistry;
use crate::features::{FeatureBuilder, FeatureVector};

/// Immutable scoring pipeline built from one artifact.
///
/// Holds no interior mutability, so a shared reference can score from any
/// number of threads at once.
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    artifact: Arc<ScoringArtifact>,
    digest: String,
    builder: FeatureBuilder,
}

impl ScoringPipeline {
    /// Validate the artifact and freeze it into a pipeline.
    pub fn new(loaded: LoadedArtifact) -> Result<Self> {
        let LoadedArtifact { digest, artifact } = loaded;
        artifact.validate()?;

        let builder = FeatureBuilder::new(EncoderRegistry::from_artifact(&artifact)?);
        if builder.width() != artifact.features.len() {
            return Err(CardioError::ArtifactMismatch(format!(
                "builder produces {} features, artifact expects {}",
                builder.width(),
                artifact.features.len()
            )));
        }

        Ok(Self {
            artifact: Arc::new(artifact),
            digest,
            builder,
        })
    }

    pub fn artifact(&self) -> &ScoringArtifact {
        &self.artifact
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn model_version(&self) -> &str {
        &self.artifact.model_version
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn build(&self, record: &ClinicalRecord) -> Result<FeatureVector> {
        self.builder.build(record)
    }

    /// Probability of disease for a raw record.
    pub fn score(&self, record: &ClinicalRecord) -> Result<f64> {
        let vector = self.build(record)?;
        self.score_vector(&vector)
    }

    /// Probability of disease for an already built vector.
    pub fn score_vector(&self, vector: &FeatureVector) -> Result<f64> {
        let expected = self.artifact.features.len();
        if vector.len() != expected {
            return Err(CardioError::ArtifactMismatch(format!(
                "feature vector has {} values, artifact expects {expected}",
                vector.len()
            )));
        }

        let standardized = self.standardize(vector.as_slice());
        let selected = self.select(&standardized);
        Ok(classify(&self.artifact.classifier, &selected))
    }

    fn standardize(&self, values: &[f64]) -> Vec<f64> {
        let scaler = &self.artifact.scaler;
        values
            .iter()
            .zip(scaler.mean.iter().zip(&scaler.scale))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }

    fn select(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(&self.artifact.selection)
            .filter(|(_, keep)| **keep)
            .map(|(value, _)| *value)
            .collect()
    }
}

fn classify(classifier: &ClassifierParams, features: &[f64]) -> f64 {
    let raw = match classifier {
        ClassifierParams::GradientBoosting(params) => boosted_log_odds(params, features),
        ClassifierParams::Logistic(params) => logistic_log_odds(params, features),
    };
    sigmoid(raw)
}

fn boosted_log_odds(params: &GradientBoostingParams, features: &[f64]) -> f64 {
    let total: f64 = params
        .trees
        .iter()
        .map(|tree| evaluate_tree(tree, features))
        .sum();
    params.init_log_odds + params.learning_rate * total
}

fn logistic_log_odds(params: &LogisticParams, features: &[f64]) -> f64 {
    params.intercept
        + params
            .coefficients
            .iter()
            .zip(features)
            .map(|(coefficient, value)| coefficient * value)
            .sum::<f64>()
}

// Node indices were checked at load to point forward and in bounds, so the
// walk always reaches a leaf. Split values are compared at f32 precision,
// the precision the trees were fit at.
fn evaluate_tree(tree: &RegressionTree, features: &[f64]) -> f64 {
    let mut index = 0;
    loop {
        match &tree.nodes[index] {
            TreeNode::Leaf { value } => return *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                index = if features[*feature] as f32 as f64 <= *threshold {
                    *left
                } else {
                    *right
                };
            }
        }
    }
}

/// Logistic function, evaluated without overflow for large `|z|`.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
