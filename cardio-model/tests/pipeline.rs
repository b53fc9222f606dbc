mod common;

use cardio_core::{CardioError, ClinicalField, ClinicalRecord, RiskTier};
use cardio_model::{load_artifact_bytes, score_json_str, sha256_hex, FeatureVector};
use common::*;
use proptest::prelude::*;
use serde_json::{json, Value};

#[test]
fn bundled_artifact_loads_with_digest() {
    let bytes = artifact_bytes();
    let loaded = load_artifact_bytes(&bytes, None).unwrap();

    assert_eq!(loaded.digest.len(), 64);
    assert_eq!(loaded.digest, sha256_hex(&bytes));
    assert_eq!(loaded.artifact.selected_count(), 10);
    assert_eq!(
        loaded.artifact.selected_features(),
        vec!["age", "sex", "cp", "chol", "fbs", "thalch", "exang", "oldpeak", "slope", "ca"]
    );

    let upper = loaded.digest.to_uppercase();
    let verified = load_artifact_bytes(&bytes, Some(upper.as_str())).unwrap();
    assert_eq!(verified.digest, loaded.digest);
}

#[test]
fn digest_mismatch_is_fatal() {
    let zeros = "0".repeat(64);
    let err = load_artifact_bytes(&artifact_bytes(), Some(zeros.as_str())).unwrap_err();
    assert!(matches!(err, CardioError::ArtifactMismatch(_)));
    assert!(!err.is_client_error());
}

#[test]
fn fixtures_land_in_expected_tiers() {
    let pipeline = bundled_pipeline();

    let high = pipeline.score(&record_fixture("high_risk_record.json")).unwrap();
    let low = pipeline.score(&record_fixture("low_risk_record.json")).unwrap();

    assert_eq!(RiskTier::from_probability(high), RiskTier::High);
    assert_eq!(RiskTier::from_probability(low), RiskTier::Low);
    assert!((0.0..=1.0).contains(&high));
    assert!((0.0..=1.0).contains(&low));
}

#[test]
fn scoring_is_bitwise_deterministic() {
    let pipeline = bundled_pipeline();
    let record = record_fixture("high_risk_record.json");

    let first = pipeline.score(&record).unwrap();
    let second = pipeline.score(&record).unwrap();
    assert_eq!(first.to_bits(), second.to_bits());
}

#[test]
fn scrambled_field_order_scores_like_canonical_order() {
    let pipeline = bundled_pipeline();
    let canonical = ClinicalRecord::from_json_str(canonical_record_json()).unwrap();
    let scrambled = ClinicalRecord::from_json_str(
        r#"{"thal": "normal", "cp": "typical angina", "ca": 0, "age": 54, "slope": "upsloping",
            "sex": "Male", "oldpeak": 1.2, "exang": "FALSE", "thalch": 160, "restecg": "normal",
            "fbs": "FALSE", "chol": 239, "trestbps": 140}"#,
    )
    .unwrap();

    let expected = pipeline.build(&canonical).unwrap();
    let actual = pipeline.build(&scrambled).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(actual.as_slice()[0], 54.0);
    // sex=Male and cp=typical angina, by code
    assert_eq!(actual.as_slice()[1], 1.0);
    assert_eq!(actual.as_slice()[2], 3.0);

    assert_eq!(
        pipeline.score(&scrambled).unwrap().to_bits(),
        pipeline.score(&canonical).unwrap().to_bits()
    );
}

#[test]
fn boolean_spellings_share_one_category() {
    let pipeline = bundled_pipeline();
    let base = record_fixture("high_risk_record.json");

    let scores: Vec<u64> = ["TRUE", "True", "true"]
        .into_iter()
        .map(|token| base.clone().with(ClinicalField::Fbs, token))
        .chain(std::iter::once(base.clone().with(ClinicalField::Fbs, true)))
        .map(|record| pipeline.score(&record).unwrap().to_bits())
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] == pair[1]));

    let vector = pipeline
        .build(&base.clone().with(ClinicalField::Exang, false))
        .unwrap();
    assert_eq!(vector.as_slice()[8], 0.0);
}

#[test]
fn unrecognized_boolean_token_is_rejected() {
    let pipeline = bundled_pipeline();
    for token in ["yes", "1", "T", "nan", ""] {
        let record = record_fixture("low_risk_record.json").with(ClinicalField::Exang, token);
        let err = pipeline.score(&record).unwrap_err();
        assert!(
            matches!(&err, CardioError::UnknownCategory { field, .. } if field == "exang"),
            "{token:?} gave {err:?}"
        );
    }
}

#[test]
fn values_outside_vocabulary_never_encode() {
    let pipeline = bundled_pipeline();
    let cases: [(ClinicalField, &str); 6] = [
        (ClinicalField::Sex, "male"),
        (ClinicalField::Cp, "Typical Angina"),
        (ClinicalField::Restecg, "nan"),
        (ClinicalField::Slope, "steep"),
        (ClinicalField::Thal, "reversible defect"),
        (ClinicalField::Fbs, "maybe"),
    ];

    for (field, value) in cases {
        let record = record_fixture("low_risk_record.json").with(field, value);
        let err = pipeline.build(&record).unwrap_err();
        assert!(err.is_client_error());
        match err {
            CardioError::UnknownCategory {
                field: name,
                value: rejected,
            } => {
                assert_eq!(name, field.name());
                assert_eq!(rejected, value);
            }
            other => panic!("{field}: unexpected {other:?}"),
        }
    }

    let numeric_category = record_fixture("low_risk_record.json").with(ClinicalField::Cp, 3.0);
    assert!(matches!(
        pipeline.build(&numeric_category),
        Err(CardioError::UnknownCategory { .. })
    ));
}

#[test]
fn registry_lookup_is_exact() {
    let pipeline = bundled_pipeline();
    let registry = pipeline.builder().registry();

    assert_eq!(registry.encode(ClinicalField::Thal, "reversable defect").unwrap(), 3);
    assert!(registry.encode(ClinicalField::Age, "54").is_err());
    assert_eq!(
        registry.vocabulary(ClinicalField::Slope).unwrap().categories(),
        vec!["downsloping", "flat", "upsloping"]
    );
}

#[test]
fn missing_field_is_reported_by_name() {
    let pipeline = bundled_pipeline();
    let mut value: Value = serde_json::from_str(canonical_record_json()).unwrap();
    value.as_object_mut().unwrap().remove("thal");
    let record = ClinicalRecord::from_json_value(&value).unwrap();

    let err = pipeline.score(&record).unwrap_err();
    assert!(matches!(&err, CardioError::MissingFeature(field) if field == "thal"));
    assert!(err.is_client_error());
}

#[test]
fn numeric_text_is_coerced_and_garbage_rejected() {
    let pipeline = bundled_pipeline();
    let base = record_fixture("low_risk_record.json");

    let as_text = base.clone().with(ClinicalField::Age, " 41 ");
    assert_eq!(
        pipeline.score(&as_text).unwrap().to_bits(),
        pipeline.score(&base).unwrap().to_bits()
    );

    for bad in [
        base.clone().with(ClinicalField::Chol, "high"),
        base.clone().with(ClinicalField::Chol, "NaN"),
        base.clone().with(ClinicalField::Ca, true),
    ] {
        assert!(matches!(
            pipeline.score(&bad),
            Err(CardioError::InvalidNumber { .. })
        ));
    }
}

#[test]
fn unknown_field_name_is_a_client_error() {
    let err = ClinicalRecord::from_json_str(r#"{"age": 50, "cholesterol": 200}"#).unwrap_err();
    assert!(matches!(&err, CardioError::UnknownField(name) if name == "cholesterol"));
    assert!(err.is_client_error());
}

#[test]
fn wrong_vector_length_is_not_padded() {
    let pipeline = bundled_pipeline();
    for width in [12, 14] {
        let vector = FeatureVector::from_values(vec![0.0; width]);
        assert!(matches!(
            pipeline.score_vector(&vector),
            Err(CardioError::ArtifactMismatch(_))
        ));
    }
}

#[test]
fn single_tree_score_matches_hand_computation() {
    let mut value = artifact_value();
    let (mean, scale) = (vec![0.0; 13], vec![1.0; 13]);
    value["scaler"] = json!({"mean": mean, "scale": scale});
    let mut mask = vec![false; 13];
    mask[0] = true;
    value["selection"] = json!(mask);
    value["classifier"] = json!({
        "type": "gradient_boosting",
        "learning_rate": 1.0,
        "init_log_odds": 0.0,
        "trees": [{"nodes": [
            {"feature": 0, "threshold": 50.0, "left": 1, "right": 2},
            {"value": -1.0},
            {"value": 1.0}
        ]}]
    });
    let pipeline = pipeline_from_value(&value).unwrap();

    let older = record_fixture("high_risk_record.json");
    let younger = record_fixture("low_risk_record.json");
    assert!((pipeline.score(&older).unwrap() - 0.731_058_578_630_004_9).abs() < 1e-12);
    assert!((pipeline.score(&younger).unwrap() - 0.268_941_421_369_995_1).abs() < 1e-12);
}

#[test]
fn tree_splits_compare_at_single_precision() {
    let mut value = artifact_value();
    let (mean, scale) = (vec![0.0; 13], vec![1.0; 13]);
    value["scaler"] = json!({"mean": mean, "scale": scale});
    let mut mask = vec![false; 13];
    mask[0] = true;
    value["selection"] = json!(mask);
    value["classifier"] = json!({
        "type": "gradient_boosting",
        "learning_rate": 1.0,
        "init_log_odds": 0.0,
        "trees": [{"nodes": [
            {"feature": 0, "threshold": 50.0, "left": 1, "right": 2},
            {"value": -1.0},
            {"value": 1.0}
        ]}]
    });
    let pipeline = pipeline_from_value(&value).unwrap();
    let record = record_fixture("low_risk_record.json");

    // 50.000001 rounds to 50.0 in f32 and stays on the left branch.
    let at_threshold = pipeline
        .score(&record.clone().with(ClinicalField::Age, 50.000_001))
        .unwrap();
    assert!((at_threshold - 0.268_941_421_369_995_1).abs() < 1e-12);

    let above = pipeline
        .score(&record.with(ClinicalField::Age, 50.000_1))
        .unwrap();
    assert!((above - 0.731_058_578_630_004_9).abs() < 1e-12);
}

#[test]
fn json_entry_point_matches_pipeline() {
    let artifact = String::from_utf8(artifact_bytes()).unwrap();
    let expected = bundled_pipeline()
        .score(&ClinicalRecord::from_json_str(canonical_record_json()).unwrap())
        .unwrap();

    let score = score_json_str(&artifact, canonical_record_json()).unwrap();
    assert_eq!(score.to_bits(), expected.to_bits());

    let err = score_json_str(&artifact, r#"{"age": 54}"#).unwrap_err();
    assert!(matches!(err, CardioError::MissingFeature(_)));
    let err = score_json_str("{}", canonical_record_json()).unwrap_err();
    assert!(!err.is_client_error());
}

#[test]
fn logistic_classifier_is_supported() {
    let mut value = artifact_value();
    let (mean, scale) = (vec![50.0; 13], vec![10.0; 13]);
    value["scaler"] = json!({"mean": mean, "scale": scale});
    let mut mask = vec![false; 13];
    mask[0] = true;
    value["selection"] = json!(mask);
    value["classifier"] = json!({"type": "logistic", "coefficients": [2.0], "intercept": 0.0});
    let pipeline = pipeline_from_value(&value).unwrap();

    let record = record_fixture("low_risk_record.json").with(ClinicalField::Age, 50.0);
    assert_eq!(pipeline.score(&record).unwrap(), 0.5);

    let older = record.with(ClinicalField::Age, 55.0);
    // standardized age 0.5, log-odds 1.0
    assert!((pipeline.score(&older).unwrap() - 0.731_058_578_630_004_9).abs() < 1e-12);
}

fn assert_mismatch(value: &Value) {
    match pipeline_from_value(value) {
        Err(CardioError::ArtifactMismatch(_)) => {}
        other => panic!("expected artifact mismatch, got {other:?}"),
    }
}

#[test]
fn reordered_features_are_rejected() {
    let mut value = artifact_value();
    value["features"].as_array_mut().unwrap().swap(0, 1);
    assert_mismatch(&value);
}

#[test]
fn shape_errors_are_rejected() {
    let mut short_mask = artifact_value();
    short_mask["selection"].as_array_mut().unwrap().pop();
    assert_mismatch(&short_mask);

    let mut zero_scale = artifact_value();
    zero_scale["scaler"]["scale"][3] = json!(0.0);
    assert_mismatch(&zero_scale);

    let mut nothing_selected = artifact_value();
    nothing_selected["selection"] = json!(vec![false; 13]);
    assert_mismatch(&nothing_selected);

    let mut empty_vocabulary = artifact_value();
    empty_vocabulary["vocabularies"]["thal"] = json!({});
    assert_mismatch(&empty_vocabulary);

    let mut duplicate_code = artifact_value();
    duplicate_code["vocabularies"]["sex"] = json!({"Female": 0, "Male": 0});
    assert_mismatch(&duplicate_code);

    let mut numeric_vocabulary = artifact_value();
    numeric_vocabulary["vocabularies"]["age"] = json!({"old": 1});
    assert_mismatch(&numeric_vocabulary);
}

#[test]
fn malformed_trees_are_rejected() {
    let mut backwards = artifact_value();
    backwards["classifier"]["trees"][0]["nodes"][1]["left"] = json!(0);
    assert_mismatch(&backwards);

    let mut out_of_range = artifact_value();
    out_of_range["classifier"]["trees"][0]["nodes"][0]["feature"] = json!(10);
    assert_mismatch(&out_of_range);

    let mut dangling = artifact_value();
    dangling["classifier"]["trees"][5]["nodes"][0]["right"] = json!(99);
    assert_mismatch(&dangling);
}

#[test]
fn unknown_format_is_rejected() {
    let mut value = artifact_value();
    value["format"] = json!("joblib");
    assert!(matches!(
        pipeline_from_value(&value),
        Err(CardioError::Artifact(_))
    ));
}

proptest! {
    #[test]
    fn scores_are_probabilities_and_repeatable(
        age in 20.0f64..90.0,
        chol in 0.0f64..600.0,
        thalch in 60.0f64..210.0,
        oldpeak in -2.0f64..6.0,
        cp in prop::sample::select(vec!["asymptomatic", "atypical angina", "non-anginal", "typical angina"])
    ) {
        let pipeline = bundled_pipeline();
        let record = record_fixture("high_risk_record.json")
            .with(ClinicalField::Age, age)
            .with(ClinicalField::Chol, chol)
            .with(ClinicalField::Thalch, thalch)
            .with(ClinicalField::Oldpeak, oldpeak)
            .with(ClinicalField::Cp, cp);

        let first = pipeline.score(&record).unwrap();
        let second = pipeline.score(&record).unwrap();
        prop_assert!((0.0..=1.0).contains(&first));
        prop_assert_eq!(first.to_bits(), second.to_bits());
    }
}
