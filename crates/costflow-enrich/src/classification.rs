//! Workload classification from regex pattern groups.

use std::sync::Arc;
use std::time::Duration;

use costflow_cache::AggregationCache;
use costflow_core::config::EnrichConfig;
use costflow_core::dataset::EnrichedDataset;
use costflow_core::enrichment::{WorkloadCategory, WorkloadClassification};
use costflow_query::{MaterializedView, Predicate, Statement};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::columns::ColumnMap;
use crate::context::PipelineContext;
use crate::error::StepError;
use crate::source::{DefinitionSource, StaticSource};
use crate::tagging::TagOverlayStep;
use crate::traits::EnrichmentStep;

/// Minimum fraction of a rule's declared pattern groups that must match.
pub const MATCH_THRESHOLD: f64 = 0.7;

/// Price per 1,000 units for categories billed per unit (tokens).
pub fn price_per_thousand_units(category: WorkloadCategory) -> Option<f64> {
    match category {
        WorkloadCategory::LlmInference => Some(0.002),
        WorkloadCategory::LlmTraining => Some(0.008),
        WorkloadCategory::Embedding => Some(0.0001),
        _ => None,
    }
}

/// `billed_cost / price × 1000`, for per-unit categories.
pub fn estimate_units(category: WorkloadCategory, billed_cost: f64) -> Option<u64> {
    let price = price_per_thousand_units(category)?;
    if billed_cost <= 0.0 || !billed_cost.is_finite() {
        return Some(0);
    }
    Some((billed_cost / price * 1000.0).round() as u64)
}

/// Each non-empty pattern list is one group; a group matches when any of its
/// patterns matches the field (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub id: String,
    pub category: WorkloadCategory,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub service_patterns: Vec<String>,
    #[serde(default)]
    pub resource_name_patterns: Vec<String>,
    #[serde(default)]
    pub instance_type_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Service,
    ResourceName,
    InstanceType,
}

/// The fields of one resource a classifier looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFields<'a> {
    pub service: Option<&'a str>,
    pub resource_name: Option<&'a str>,
    pub instance_type: Option<&'a str>,
}

impl<'a> ResourceFields<'a> {
    fn get(&self, field: Field) -> Option<&'a str> {
        match field {
            Field::Service => self.service,
            Field::ResourceName => self.resource_name,
            Field::InstanceType => self.instance_type,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ClassificationRule,
    groups: Vec<(Field, Vec<Regex>)>,
}

impl CompiledRule {
    fn compile(rule: ClassificationRule) -> Result<Self, StepError> {
        let mut groups = Vec::new();
        for (field, patterns) in [
            (Field::Service, &rule.service_patterns),
            (Field::ResourceName, &rule.resource_name_patterns),
            (Field::InstanceType, &rule.instance_type_patterns),
        ] {
            if patterns.is_empty() {
                continue;
            }
            let compiled = patterns
                .iter()
                .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
                .collect::<Result<Vec<_>, _>>()?;
            groups.push((field, compiled));
        }
        if groups.is_empty() {
            return Err(StepError::Invalid(format!(
                "classification rule '{}' declares no pattern groups",
                rule.id
            )));
        }
        Ok(Self { rule, groups })
    }

    fn score(&self, fields: &ResourceFields<'_>) -> f64 {
        let matched = self
            .groups
            .iter()
            .filter(|(field, patterns)| {
                fields
                    .get(*field)
                    .map_or(false, |text| patterns.iter().any(|re| re.is_match(text)))
            })
            .count();
        matched as f64 / self.groups.len() as f64
    }
}

/// Priority-ordered rules; the first qualifying rule wins, not the best scoring.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Classifier {
    pub fn new(rules: Vec<ClassificationRule>) -> Result<Self, StepError> {
        let mut compiled = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        compiled.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then_with(|| a.rule.id.cmp(&b.rule.id))
        });
        Ok(Self { rules: compiled })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn classify(&self, fields: &ResourceFields<'_>) -> Option<(&ClassificationRule, f64)> {
        self.rules.iter().find_map(|r| {
            let score = r.score(fields);
            (score >= MATCH_THRESHOLD).then_some((&r.rule, score))
        })
    }
}

static DEFAULT_RULES: Lazy<Vec<ClassificationRule>> = Lazy::new(|| {
    let rule = |id: &str,
                category: WorkloadCategory,
                priority: i32,
                service: &[&str],
                name: &[&str],
                instance: &[&str]| ClassificationRule {
        id: id.to_string(),
        category,
        priority,
        service_patterns: service.iter().map(|s| s.to_string()).collect(),
        resource_name_patterns: name.iter().map(|s| s.to_string()).collect(),
        instance_type_patterns: instance.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        rule("embedding-api", WorkloadCategory::Embedding, 300, &["openai", "bedrock", "vertex", "azure openai"], &["embed"], &[]),
        rule("llm-training", WorkloadCategory::LlmTraining, 250, &["sagemaker", "vertex", "machine learning"], &["train", "fine-?tun"], &[]),
        rule("image-generation", WorkloadCategory::ImageGeneration, 240, &["openai", "bedrock", "vertex"], &["dall-?e", "stable-?diffusion", "imagen", "titan-image"], &[]),
        rule("speech-audio", WorkloadCategory::SpeechAudio, 230, &["openai", "transcribe", "polly", "speech"], &["whisper", "tts", "speech"], &[]),
        rule("llm-inference", WorkloadCategory::LlmInference, 200, &["openai", "bedrock", "anthropic", "vertex ai", "azure openai"], &[], &[]),
        rule("vector-database", WorkloadCategory::VectorDatabase, 150, &["pinecone", "weaviate", "qdrant", "opensearch"], &["vector", "embedding"], &[]),
        rule("gpu-compute", WorkloadCategory::GpuCompute, 100, &["ec2", "elastic compute", "compute engine", "virtual machines"], &[], &[r"^(p[2-5]|g[4-6]|inf[12]|trn1)[a-z0-9-]*\.", r"^a[23]-", r"^standard_n[cdv]"]),
        rule("ml-platform", WorkloadCategory::MlPlatform, 50, &["sagemaker", "vertex ai", "azure machine learning", "databricks"], &[], &[]),
    ]
});

/// Built-in rules for the common AI/ML services.
pub fn default_rules() -> Vec<ClassificationRule> {
    DEFAULT_RULES.clone()
}

pub struct ClassificationStep {
    dependencies: Vec<String>,
    source: Arc<dyn DefinitionSource<ClassificationRule>>,
    columns: ColumnMap,
    max_source_rows: usize,
    rule_ttl: Duration,
}

impl ClassificationStep {
    pub const NAME: &'static str = "classification";

    pub fn new(source: Arc<dyn DefinitionSource<ClassificationRule>>) -> Self {
        let cfg = EnrichConfig::default();
        Self {
            // Ordered after tagging for consistency; tags are not read.
            dependencies: vec![TagOverlayStep::NAME.to_string()],
            source,
            columns: ColumnMap::default(),
            max_source_rows: cfg.max_source_rows,
            rule_ttl: cfg.rule_cache_ttl(),
        }
    }

    pub fn with_default_rules() -> Self {
        Self::new(Arc::new(StaticSource::new("default", default_rules())))
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_config(mut self, cfg: &EnrichConfig) -> Self {
        self.max_source_rows = cfg.max_source_rows;
        self.rule_ttl = cfg.rule_cache_ttl();
        self
    }

    fn load_classifier(&self, ctx: &PipelineContext) -> Result<Classifier, StepError> {
        let cache = AggregationCache::new(Arc::clone(&ctx.cache), "rules", self.rule_ttl);
        let rules: Vec<ClassificationRule> =
            cache.get_or_try_insert_with("classification_rules", &self.source.describe(), || self.source.load())?;
        Classifier::new(rules)
    }

    fn classify_view(
        &self,
        ctx: &PipelineContext,
        view: &MaterializedView,
        classifier: &Classifier,
    ) -> Result<Vec<WorkloadClassification>, StepError> {
        let c = &self.columns;
        let groups = ctx.query.execute(&Statement::Aggregate {
            view: view.name.clone(),
            group_by: vec![
                c.resource_id.clone(),
                c.service.clone(),
                c.resource_name.clone(),
                c.instance_type.clone(),
            ],
            sums: vec![c.billed_cost.clone()],
            filter: Some(Predicate::IsNotNull { column: c.service.clone() }),
        })?;

        let mut out = Vec::new();
        for row in groups {
            let service = row.text(&c.service);
            let resource_name = row.text(&c.resource_name);
            let instance_type = row.text(&c.instance_type);
            let fields = ResourceFields {
                service: service.as_deref(),
                resource_name: resource_name.as_deref(),
                instance_type: instance_type.as_deref(),
            };
            let Some((rule, score)) = classifier.classify(&fields) else { continue };
            let (category, rule_id) = (rule.category, rule.id.clone());
            let billed_cost = row.value(&c.billed_cost).as_f64().unwrap_or(0.0);

            out.push(WorkloadClassification {
                resource_id: row.text(&c.resource_id),
                service,
                resource_name,
                instance_type,
                category,
                rule_id,
                match_score: score,
                billed_cost,
                estimated_units: estimate_units(category, billed_cost),
            });
        }
        Ok(out)
    }
}

impl EnrichmentStep for ClassificationStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn execute(&self, input: &EnrichedDataset, ctx: &PipelineContext) -> Result<EnrichedDataset, StepError> {
        let classifier = self.load_classifier(ctx)?;
        let c = &self.columns;
        let view = MaterializedView::materialize(
            ctx.query.as_ref(),
            ctx.view_name(Self::NAME),
            input.rows(),
            vec![
                c.resource_id.clone(),
                c.service.clone(),
                c.resource_name.clone(),
                c.instance_type.clone(),
                c.billed_cost.clone(),
            ],
            self.max_source_rows,
        )?;
        let result = self.classify_view(ctx, &view, &classifier);
        view.release(ctx.query.as_ref());
        let classifications = result?;

        tracing::debug!(run_id = %ctx.run_id, classified = classifications.len(), "workloads classified");
        let mut out = input.clone();
        out.append_classifications(classifications);
        Ok(out)
    }

    fn validate(&self, output: &EnrichedDataset) -> bool {
        output.classifications().is_some()
    }
}
