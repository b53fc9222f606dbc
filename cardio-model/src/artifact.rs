//! Serialized scoring artifact and its validation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use cardio_core::{CardioError, ClinicalField, FieldKind, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Format tag every artifact must carry.
pub const ARTIFACT_FORMAT: &str = "cardio-artifact/v1";

/// Name and kind of one model input, in training order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Per-feature standardization parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// One node of a regression tree. Split nodes send `x[feature] <= threshold`
/// left.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Regression tree stored as a node array rooted at index 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradientBoostingParams {
    pub learning_rate: f64,
    pub init_log_odds: f64,
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticParams {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

/// Frozen classifier applied to the selected features.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierParams {
    GradientBoosting(GradientBoostingParams),
    Logistic(LogisticParams),
}

/// Everything training produced that serving needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringArtifact {
    pub format: String,
    pub model_version: String,
    #[serde(default)]
    pub trained_at: Option<DateTime<Utc>>,
    pub features: Vec<FeatureSpec>,
    /// Category to code, per categorical feature name.
    pub vocabularies: BTreeMap<String, BTreeMap<String, u32>>,
    pub scaler: StandardScaler,
    pub selection: Vec<bool>,
    pub classifier: ClassifierParams,
}

impl ScoringArtifact {
    pub fn selected_count(&self) -> usize {
        self.selection.iter().filter(|keep| **keep).count()
    }

    /// Names of the features the classifier sees, in order.
    pub fn selected_features(&self) -> Vec<&str> {
        self.features
            .iter()
            .zip(&self.selection)
            .filter(|(_, keep)| **keep)
            .map(|(spec, _)| spec.name.as_str())
            .collect()
    }

    /// Check the artifact against the canonical clinical schema and its own
    /// internal shapes.
    pub fn validate(&self) -> Result<()> {
        if self.format != ARTIFACT_FORMAT {
            return Err(CardioError::Artifact(format!(
                "unsupported format {:?}, expected {ARTIFACT_FORMAT}",
                self.format
            )));
        }

        validate_schema(&self.features)?;
        self.validate_vocabularies()?;

        let width = self.features.len();
        check_len("scaler mean", self.scaler.mean.len(), width)?;
        check_len("scaler scale", self.scaler.scale.len(), width)?;
        check_len("selection mask", self.selection.len(), width)?;

        if let Some(index) = self
            .scaler
            .scale
            .iter()
            .position(|scale| !scale.is_finite() || *scale == 0.0)
        {
            return Err(mismatch(format!(
                "scale of {} must be finite and non-zero",
                self.features[index].name
            )));
        }
        if self.scaler.mean.iter().any(|mean| !mean.is_finite()) {
            return Err(mismatch("scaler mean contains a non-finite value".to_string()));
        }

        let selected = self.selected_count();
        if selected == 0 {
            return Err(mismatch("selection mask keeps no features".to_string()));
        }

        match &self.classifier {
            ClassifierParams::Logistic(params) => {
                check_len("logistic coefficients", params.coefficients.len(), selected)
            }
            ClassifierParams::GradientBoosting(params) => {
                if params.trees.is_empty() {
                    return Err(mismatch("gradient boosting has no trees".to_string()));
                }
                params
                    .trees
                    .iter()
                    .enumerate()
                    .try_for_each(|(index, tree)| validate_tree(index, tree, selected))
            }
        }
    }

    fn validate_vocabularies(&self) -> Result<()> {
        for spec in &self.features {
            let vocabulary = self.vocabularies.get(&spec.name);
            match (spec.kind, vocabulary) {
                (FieldKind::Categorical, None) => {
                    return Err(mismatch(format!("no vocabulary for {}", spec.name)));
                }
                (FieldKind::Categorical, Some(codes)) if codes.is_empty() => {
                    return Err(mismatch(format!("vocabulary of {} is empty", spec.name)));
                }
                (FieldKind::Categorical, Some(codes)) => {
                    let unique: BTreeSet<u32> = codes.values().copied().collect();
                    if unique.len() != codes.len() {
                        return Err(mismatch(format!(
                            "vocabulary of {} reuses a code",
                            spec.name
                        )));
                    }
                }
                (FieldKind::Numeric, Some(_)) => {
                    return Err(mismatch(format!(
                        "numeric feature {} has a vocabulary",
                        spec.name
                    )));
                }
                (FieldKind::Numeric, None) => {}
            }
        }

        if let Some(stray) = self
            .vocabularies
            .keys()
            .find(|name| !self.features.iter().any(|spec| &spec.name == *name))
        {
            return Err(mismatch(format!("vocabulary for unknown feature {stray}")));
        }
        Ok(())
    }
}

/// An artifact together with the SHA-256 digest of the bytes it came from.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub digest: String,
    pub artifact: ScoringArtifact,
}

/// Decode and validate an artifact. When `expected_digest` is given the
/// bytes must hash to it.
pub fn load_artifact_bytes(bytes: &[u8], expected_digest: Option<&str>) -> Result<LoadedArtifact> {
    let digest = sha256_hex(bytes);
    if let Some(expected) = expected_digest {
        if !expected.eq_ignore_ascii_case(&digest) {
            return Err(mismatch(format!(
                "digest {digest} does not match expected {expected}"
            )));
        }
    }

    let artifact: ScoringArtifact =
        serde_json::from_slice(bytes).map_err(|err| CardioError::Artifact(err.to_string()))?;
    artifact.validate()?;

    info!(
        "loaded scoring artifact {} ({}), {} of {} features selected",
        artifact.model_version,
        &digest[..12],
        artifact.selected_count(),
        artifact.features.len()
    );

    Ok(LoadedArtifact { digest, artifact })
}

pub fn load_artifact_file(
    path: impl AsRef<Path>,
    expected_digest: Option<&str>,
) -> Result<LoadedArtifact> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|err| CardioError::Artifact(format!("{}: {err}", path.display())))?;
    load_artifact_bytes(&bytes, expected_digest)
}

/// Compute SHA-256 hash as lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn validate_schema(features: &[FeatureSpec]) -> Result<()> {
    if features.len() != ClinicalField::ALL.len() {
        return Err(mismatch(format!(
            "artifact expects {} features, builder produces {}",
            features.len(),
            ClinicalField::ALL.len()
        )));
    }

    for (position, (spec, field)) in features.iter().zip(ClinicalField::ALL).enumerate() {
        if spec.name != field.name() {
            return Err(mismatch(format!(
                "feature {position} is {} in the artifact but {} in the builder",
                spec.name,
                field.name()
            )));
        }
        if spec.kind != field.kind() {
            return Err(mismatch(format!(
                "feature {} is {:?} in the artifact but {:?} in the builder",
                spec.name,
                spec.kind,
                field.kind()
            )));
        }
    }
    Ok(())
}

fn validate_tree(index: usize, tree: &RegressionTree, width: usize) -> Result<()> {
    if tree.nodes.is_empty() {
        return Err(mismatch(format!("tree {index} has no nodes")));
    }

    for (position, node) in tree.nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= width {
                    return Err(mismatch(format!(
                        "tree {index} node {position} splits on feature {feature} of {width}"
                    )));
                }
                if !threshold.is_finite() {
                    return Err(mismatch(format!(
                        "tree {index} node {position} has a non-finite threshold"
                    )));
                }
                // Children must point forward, which also rules out cycles.
                for child in [*left, *right] {
                    if child <= position || child >= tree.nodes.len() {
                        return Err(mismatch(format!(
                            "tree {index} node {position} has invalid child {child}"
                        )));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                if !value.is_finite() {
                    return Err(mismatch(format!(
                        "tree {index} leaf {position} is not finite"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(mismatch(format!(
            "{what} has {actual} entries, expected {expected}"
        )))
    }
}

fn mismatch(message: String) -> CardioError {
    CardioError::ArtifactMismatch(message)
}
