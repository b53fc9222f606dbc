//! Frozen category vocabularies.

use std::collections::BTreeMap;

use cardio_core::{CardioError, ClinicalField, FieldKind, Result};

use crate::artifact::ScoringArtifact;

/// Category to code mapping of one field, as fitted during training.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryVocabulary {
    field: ClinicalField,
    codes: BTreeMap<String, u32>,
}

impl CategoryVocabulary {
    pub fn field(&self) -> ClinicalField {
        self.field
    }

    pub fn code(&self, value: &str) -> Option<u32> {
        self.codes.get(value).copied()
    }

    /// Known categories ordered by code.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<(&str, u32)> = self
            .codes
            .iter()
            .map(|(value, code)| (value.as_str(), *code))
            .collect();
        categories.sort_by_key(|(_, code)| *code);
        categories.into_iter().map(|(value, _)| value).collect()
    }
}

/// Read-only lookup from categorical field values to integer codes.
#[derive(Debug, Clone, Default)]
pub struct EncoderRegistry {
    vocabularies: BTreeMap<ClinicalField, CategoryVocabulary>,
}

impl EncoderRegistry {
    /// Take the vocabularies persisted in a validated artifact.
    pub fn from_artifact(artifact: &ScoringArtifact) -> Result<Self> {
        let mut vocabularies = BTreeMap::new();
        for field in ClinicalField::ALL {
            if field.kind() != FieldKind::Categorical {
                continue;
            }
            let codes = artifact
                .vocabularies
                .get(field.name())
                .filter(|codes| !codes.is_empty())
                .ok_or_else(|| {
                    CardioError::ArtifactMismatch(format!("no vocabulary for {field}"))
                })?;
            vocabularies.insert(
                field,
                CategoryVocabulary {
                    field,
                    codes: codes.clone(),
                },
            );
        }
        Ok(Self { vocabularies })
    }

    pub fn vocabulary(&self, field: ClinicalField) -> Option<&CategoryVocabulary> {
        self.vocabularies.get(&field)
    }

    /// Code of `value` for `field`. Values outside the vocabulary are
    /// rejected, never mapped to a default.
    pub fn encode(&self, field: ClinicalField, value: &str) -> Result<u32> {
        self.vocabularies
            .get(&field)
            .and_then(|vocabulary| vocabulary.code(value))
            .ok_or_else(|| CardioError::UnknownCategory {
                field: field.name().to_string(),
                value: value.to_string(),
            })
    }
}
