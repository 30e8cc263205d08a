//! Records produced by the built-in enrichment steps.
//!
//! These are pure data; the steps that compute them live in `costflow-enrich`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tags attached to one resource by rule evaluation ("virtual tags").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOverlay {
    pub resource_id: String,
    pub tags: BTreeMap<String, String>,
    /// Ids of the rules that matched, in processing order.
    pub rule_ids: Vec<String>,
}

/// How an emissions figure was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    /// rate per cost unit × billed cost
    CostRate,
    /// rate per usage unit × consumed quantity
    UsageRate,
    /// billed cost × flat default rate
    FlatRate,
}

/// Which level of the coefficient cascade matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoefficientMatch {
    /// (service, region)
    Exact,
    /// (service, "global")
    GlobalRegion,
    /// generic fallback rate
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionEstimate {
    pub resource_id: Option<String>,
    pub service: String,
    pub region: Option<String>,
    pub billed_cost: f64,
    pub consumed_quantity: Option<f64>,
    pub kg_co2e: f64,
    pub confidence: f64,
    pub method: EstimationMethod,
    pub matched: CoefficientMatch,
    /// Tags of the resource at estimation time, for allocating emissions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocation: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadCategory {
    LlmInference,
    LlmTraining,
    Embedding,
    ImageGeneration,
    SpeechAudio,
    VectorDatabase,
    GpuCompute,
    MlPlatform,
}

impl WorkloadCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadCategory::LlmInference => "llm_inference",
            WorkloadCategory::LlmTraining => "llm_training",
            WorkloadCategory::Embedding => "embedding",
            WorkloadCategory::ImageGeneration => "image_generation",
            WorkloadCategory::SpeechAudio => "speech_audio",
            WorkloadCategory::VectorDatabase => "vector_database",
            WorkloadCategory::GpuCompute => "gpu_compute",
            WorkloadCategory::MlPlatform => "ml_platform",
        }
    }
}

impl fmt::Display for WorkloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadClassification {
    pub resource_id: Option<String>,
    pub service: Option<String>,
    pub resource_name: Option<String>,
    pub instance_type: Option<String>,
    pub category: WorkloadCategory,
    /// Id of the first qualifying rule in priority order.
    pub rule_id: String,
    /// Fraction of the rule's declared pattern groups that matched.
    pub match_score: f64,
    pub billed_cost: f64,
    /// Approximate consumption units (e.g. tokens); absent for categories
    /// without per-unit pricing.
    pub estimated_units: Option<u64>,
}
