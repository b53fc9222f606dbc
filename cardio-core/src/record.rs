//! Clinical record: the raw inputs of one assessment.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CardioError, Result};

/// Whether a field is fed to the model as a number or through a vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Categorical,
}

/// The clinical attributes of the UCI heart disease schema.
///
/// Declaration order is the training-time feature order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ClinicalField {
    Age,
    Sex,
    Cp,
    Trestbps,
    Chol,
    Fbs,
    Restecg,
    Thalch,
    Exang,
    Oldpeak,
    Slope,
    Ca,
    Thal,
}

impl ClinicalField {
    /// Every field in canonical order.
    pub const ALL: [ClinicalField; 13] = [
        ClinicalField::Age,
        ClinicalField::Sex,
        ClinicalField::Cp,
        ClinicalField::Trestbps,
        ClinicalField::Chol,
        ClinicalField::Fbs,
        ClinicalField::Restecg,
        ClinicalField::Thalch,
        ClinicalField::Exang,
        ClinicalField::Oldpeak,
        ClinicalField::Slope,
        ClinicalField::Ca,
        ClinicalField::Thal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClinicalField::Age => "age",
            ClinicalField::Sex => "sex",
            ClinicalField::Cp => "cp",
            ClinicalField::Trestbps => "trestbps",
            ClinicalField::Chol => "chol",
            ClinicalField::Fbs => "fbs",
            ClinicalField::Restecg => "restecg",
            ClinicalField::Thalch => "thalch",
            ClinicalField::Exang => "exang",
            ClinicalField::Oldpeak => "oldpeak",
            ClinicalField::Slope => "slope",
            ClinicalField::Ca => "ca",
            ClinicalField::Thal => "thal",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ClinicalField::Age
            | ClinicalField::Trestbps
            | ClinicalField::Chol
            | ClinicalField::Thalch
            | ClinicalField::Oldpeak
            | ClinicalField::Ca => FieldKind::Numeric,
            _ => FieldKind::Categorical,
        }
    }

    /// Categorical fields whose categories are the two boolean tokens.
    pub fn is_boolean_like(self) -> bool {
        matches!(self, ClinicalField::Fbs | ClinicalField::Exang)
    }

    /// Human-readable label for dashboards and CLI output.
    pub fn label(self) -> &'static str {
        match self {
            ClinicalField::Age => "Age",
            ClinicalField::Sex => "Sex",
            ClinicalField::Cp => "Chest pain type",
            ClinicalField::Trestbps => "Resting blood pressure",
            ClinicalField::Chol => "Serum cholesterol",
            ClinicalField::Fbs => "Fasting blood sugar > 120 mg/dl",
            ClinicalField::Restecg => "Resting ECG",
            ClinicalField::Thalch => "Max heart rate",
            ClinicalField::Exang => "Exercise induced angina",
            ClinicalField::Oldpeak => "ST depression",
            ClinicalField::Slope => "ST slope",
            ClinicalField::Ca => "Major vessels",
            ClinicalField::Thal => "Thalassemia",
        }
    }
}

impl fmt::Display for ClinicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClinicalField {
    type Err = CardioError;

    fn from_str(value: &str) -> Result<Self> {
        ClinicalField::ALL
            .into_iter()
            .find(|field| field.name() == value)
            .ok_or_else(|| CardioError::UnknownField(value.to_string()))
    }
}

/// A raw field value as supplied by the record source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl FieldValue {
    /// Textual form used when reporting a rejected value.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Number(number) => format_number(*number),
            FieldValue::Flag(flag) => flag.to_string(),
            FieldValue::Text(text) => text.clone(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// Raw inputs of one assessment, keyed by clinical field.
///
/// Input order is irrelevant; the feature builder emits canonical order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ClinicalRecord {
    values: BTreeMap<ClinicalField, FieldValue>,
}

impl ClinicalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, field: ClinicalField, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    pub fn insert(&mut self, field: ClinicalField, value: impl Into<FieldValue>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: ClinicalField) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClinicalField, &FieldValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    /// Age as recorded, when it is numeric.
    pub fn age(&self) -> Option<f64> {
        match self.get(ClinicalField::Age)? {
            FieldValue::Number(age) => Some(*age),
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Flag(_) => None,
        }
    }

    /// Parse a record from a JSON object. Field names are validated here;
    /// values are validated by the feature builder.
    pub fn from_json_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| CardioError::InvalidRecord("expected a JSON object".to_string()))?;

        let mut record = ClinicalRecord::new();
        for (key, raw) in object {
            let field: ClinicalField = key.parse()?;
            let value = match raw {
                Value::Number(number) => number.as_f64().map(FieldValue::Number),
                Value::Bool(flag) => Some(FieldValue::Flag(*flag)),
                Value::String(text) => Some(FieldValue::Text(text.clone())),
                Value::Null => None,
                _ => {
                    return Err(CardioError::InvalidRecord(format!(
                        "{key} must be a number, boolean or string"
                    )))
                }
            };
            // null is treated as an absent field
            if let Some(value) = value {
                record.values.insert(field, value);
            }
        }

        Ok(record)
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(input).map_err(|err| CardioError::InvalidRecord(err.to_string()))?;
        Self::from_json_value(&value)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip_through_from_str() {
        for field in ClinicalField::ALL {
            assert_eq!(field.name().parse::<ClinicalField>().unwrap(), field);
        }
        assert!(matches!(
            "cholesterol".parse::<ClinicalField>(),
            Err(CardioError::UnknownField(_))
        ));
    }

    #[test]
    fn json_record_skips_nulls_and_rejects_nested_values() {
        let record =
            ClinicalRecord::from_json_str(r#"{"age": 54, "sex": "Male", "ca": null}"#).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.age(), Some(54.0));

        let err = ClinicalRecord::from_json_str(r#"{"age": [54]}"#).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(FieldValue::Number(1.0).display_text(), "1");
        assert_eq!(FieldValue::Number(1.5).display_text(), "1.5");
    }
}
