//! WASM <-> JavaScript bridge for scoring and dashboard summaries.

use cardio_core::{
    event_tiers, group_histories, summarize, CardioConfig, CardioError, ClinicalRecord, RiskTier,
    ScoreEvent, TierGranularity,
};
use cardio_model::{load_artifact_bytes, ScoringPipeline};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Deserialize)]
struct JsCardioConfig {
    #[serde(default)]
    granularity: Option<TierGranularity>,
    #[serde(default)]
    percent_decimals: Option<u32>,
}

impl From<JsCardioConfig> for CardioConfig {
    fn from(cfg: JsCardioConfig) -> Self {
        let mut base = CardioConfig::default();
        if let Some(granularity) = cfg.granularity {
            base.granularity = granularity;
        }
        if let Some(decimals) = cfg.percent_decimals {
            base.percent_decimals = decimals;
        }
        base
    }
}

#[derive(Serialize)]
struct JsScore {
    risk_score: f64,
    risk_percent: f64,
    tier: RiskTier,
}

/// Scoring pipeline held on the JS side; load once, score many times.
#[wasm_bindgen]
pub struct WasmScorer {
    pipeline: ScoringPipeline,
    decimals: u32,
}

#[wasm_bindgen]
impl WasmScorer {
    #[wasm_bindgen(constructor)]
    pub fn new(artifact_json: &str) -> Result<WasmScorer, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let loaded = load_artifact_bytes(artifact_json.as_bytes(), None).map_err(to_js_error)?;
        let pipeline = ScoringPipeline::new(loaded).map_err(to_js_error)?;
        Ok(WasmScorer {
            pipeline,
            decimals: CardioConfig::default().percent_decimals,
        })
    }

    #[wasm_bindgen(getter)]
    pub fn digest(&self) -> String {
        self.pipeline.digest().to_string()
    }

    #[wasm_bindgen(getter, js_name = modelVersion)]
    pub fn model_version(&self) -> String {
        self.pipeline.model_version().to_string()
    }

    /// Score a plain JS object of clinical fields.
    pub fn score(&self, record: JsValue) -> Result<JsValue, JsValue> {
        let value = from_value::<serde_json::Value>(record)
            .map_err(|err| JsValue::from_str(&format!("Cannot read record: {err}")))?;
        let record = ClinicalRecord::from_json_value(&value).map_err(to_js_error)?;
        let risk_score = self.pipeline.score(&record).map_err(to_js_error)?;

        to_value(&JsScore {
            risk_score,
            risk_percent: cardio_core::to_percent(risk_score, self.decimals),
            tier: RiskTier::from_probability(risk_score),
        })
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize score: {err}")))
    }
}

#[wasm_bindgen(js_name = tierFor)]
pub fn tier_for(probability: f64) -> String {
    RiskTier::from_probability(probability).to_string()
}

/// Doctor dashboard data from stored score events.
#[wasm_bindgen(js_name = summarizeEvents)]
pub fn summarize_events(events: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    let events = from_value::<Vec<ScoreEvent>>(events)
        .map_err(|err| JsValue::from_str(&format!("Cannot read score events: {err}")))?;
    let cfg = read_config(config)?;

    let summary = summarize(&group_histories(events), &cfg);
    to_value(&summary)
        .map_err(|err| JsValue::from_str(&format!("Cannot serialize summary: {err}")))
}

/// Patient dashboard trend and per-event tiers for one subject's events.
#[wasm_bindgen(js_name = patientTrend)]
pub fn patient_trend(events: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    #[derive(Serialize)]
    struct JsTrend {
        points: Vec<cardio_core::TrendPoint>,
        tiers: Vec<RiskTier>,
        average_percent: f64,
    }

    let events = from_value::<Vec<ScoreEvent>>(events)
        .map_err(|err| JsValue::from_str(&format!("Cannot read score events: {err}")))?;
    let cfg = read_config(config)?;

    let history = cardio_core::PatientHistory::new("", events);
    let trend = JsTrend {
        points: history.trend(cfg.percent_decimals),
        tiers: event_tiers(&history),
        average_percent: cardio_core::to_percent(history.mean_risk(), cfg.percent_decimals),
    };
    to_value(&trend).map_err(|err| JsValue::from_str(&format!("Cannot serialize trend: {err}")))
}

fn read_config(config: Option<JsValue>) -> Result<CardioConfig, JsValue> {
    match config {
        Some(js_cfg) => {
            let cfg: JsCardioConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Cannot read config: {err}")))?;
            Ok(CardioConfig::from(cfg))
        }
        None => Ok(CardioConfig::default()),
    }
}

fn to_js_error(err: CardioError) -> JsValue {
    let kind = if err.is_client_error() {
        "Invalid input"
    } else {
        "Scoring error"
    };
    JsValue::from_str(&format!("{kind}: {err}"))
}
