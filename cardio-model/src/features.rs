//! Clinical record to feature vector.

use cardio_core::{CardioError, ClinicalField, ClinicalRecord, FieldKind, FieldValue, Result};

use crate::encoder::EncoderRegistry;

/// Accepted spellings of the boolean categories and the vocabulary entry each
/// one stands for. Anything else on a boolean-like field is rejected.
pub const BOOLEAN_TOKENS: [(&str, &str); 6] = [
    ("TRUE", "True"),
    ("True", "True"),
    ("true", "True"),
    ("FALSE", "False"),
    ("False", "False"),
    ("false", "False"),
];

/// Model inputs in canonical field order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Assembles feature vectors using frozen vocabularies.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    registry: EncoderRegistry,
}

impl FeatureBuilder {
    pub fn new(registry: EncoderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EncoderRegistry {
        &self.registry
    }

    /// Vector length every build produces.
    pub fn width(&self) -> usize {
        ClinicalField::ALL.len()
    }

    pub fn build(&self, record: &ClinicalRecord) -> Result<FeatureVector> {
        let mut values = Vec::with_capacity(self.width());
        for field in ClinicalField::ALL {
            let raw = record
                .get(field)
                .ok_or_else(|| CardioError::MissingFeature(field.name().to_string()))?;

            let value = match field.kind() {
                FieldKind::Numeric => coerce_numeric(field, raw)?,
                FieldKind::Categorical => {
                    let token = categorical_token(field, raw)?;
                    self.registry.encode(field, &token)? as f64
                }
            };
            values.push(value);
        }
        Ok(FeatureVector(values))
    }
}

/// Normalize a boolean-like token to its vocabulary spelling.
pub fn normalize_boolean(token: &str) -> Option<&'static str> {
    BOOLEAN_TOKENS
        .iter()
        .find(|(spelling, _)| *spelling == token)
        .map(|(_, canonical)| *canonical)
}

fn categorical_token(field: ClinicalField, raw: &FieldValue) -> Result<String> {
    if field.is_boolean_like() {
        let canonical = match raw {
            FieldValue::Flag(true) => Some("True"),
            FieldValue::Flag(false) => Some("False"),
            FieldValue::Text(text) => normalize_boolean(text),
            FieldValue::Number(_) => None,
        };
        return canonical
            .map(str::to_string)
            .ok_or_else(|| unknown_category(field, raw));
    }

    match raw {
        FieldValue::Text(text) => Ok(text.clone()),
        FieldValue::Number(_) => Ok(raw.display_text()),
        FieldValue::Flag(_) => Err(unknown_category(field, raw)),
    }
}

fn coerce_numeric(field: ClinicalField, raw: &FieldValue) -> Result<f64> {
    let value = match raw {
        FieldValue::Number(number) => Some(*number),
        FieldValue::Text(text) => text.trim().parse::<f64>().ok(),
        FieldValue::Flag(_) => None,
    };

    value
        .filter(|number| number.is_finite())
        .ok_or_else(|| CardioError::InvalidNumber {
            field: field.name().to_string(),
            value: raw.display_text(),
        })
}

fn unknown_category(field: ClinicalField, raw: &FieldValue) -> CardioError {
    CardioError::UnknownCategory {
        field: field.name().to_string(),
        value: raw.display_text(),
    }
}
