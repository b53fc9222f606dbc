#![allow(dead_code)]

use std::fs;

use cardio_core::ClinicalRecord;
use cardio_model::{load_artifact_bytes, ScoringPipeline};
use serde_json::Value;

pub fn artifact_path() -> String {
    format!(
        "{}/../artifacts/heart_disease_gb_v1.json",
        env!("CARGO_MANIFEST_DIR")
    )
}

pub fn fixture_path(name: &str) -> String {
    format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"))
}

pub fn artifact_bytes() -> Vec<u8> {
    fs::read(artifact_path()).expect("bundled artifact is readable")
}

pub fn artifact_value() -> Value {
    serde_json::from_slice(&artifact_bytes()).expect("bundled artifact is JSON")
}

pub fn pipeline_from_value(value: &Value) -> cardio_core::Result<ScoringPipeline> {
    let bytes = serde_json::to_vec(value).expect("artifact serializes");
    ScoringPipeline::new(load_artifact_bytes(&bytes, None)?)
}

pub fn bundled_pipeline() -> ScoringPipeline {
    pipeline_from_value(&artifact_value()).expect("bundled artifact is valid")
}

pub fn record_fixture(name: &str) -> ClinicalRecord {
    let json = fs::read_to_string(fixture_path(name)).expect("fixture is readable");
    ClinicalRecord::from_json_str(&json).expect("fixture is a record")
}

pub fn canonical_record_json() -> &'static str {
    r#"{"age": 54, "sex": "Male", "cp": "typical angina", "trestbps": 140, "chol": 239,
        "fbs": "FALSE", "restecg": "normal", "thalch": 160, "exang": "FALSE",
        "oldpeak": 1.2, "slope": "upsloping", "ca": 0, "thal": "normal"}"#
}
