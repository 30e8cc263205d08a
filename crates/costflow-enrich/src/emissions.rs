//! Emission estimates via a coefficient join.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use costflow_cache::AggregationCache;
use costflow_core::config::EnrichConfig;
use costflow_core::dataset::EnrichedDataset;
use costflow_core::enrichment::EmissionEstimate;
use costflow_query::{MaterializedView, Predicate, Statement};

use crate::coefficients::{default_coefficients, Coefficient, CoefficientTable};
use crate::columns::ColumnMap;
use crate::context::PipelineContext;
use crate::error::StepError;
use crate::source::{DefinitionSource, StaticSource};
use crate::tagging::TagOverlayStep;
use crate::traits::EnrichmentStep;

/// One estimate per (resource, service, region) group of the source rows.
/// Runs after tagging so estimates carry the resource's tags for allocation.
pub struct EmissionsStep {
    dependencies: Vec<String>,
    source: Arc<dyn DefinitionSource<Coefficient>>,
    columns: ColumnMap,
    flat_rate: Option<f64>,
    max_source_rows: usize,
    table_ttl: Duration,
}

impl EmissionsStep {
    pub const NAME: &'static str = "emissions";

    pub fn new(source: Arc<dyn DefinitionSource<Coefficient>>) -> Self {
        let cfg = EnrichConfig::default();
        Self {
            dependencies: vec![TagOverlayStep::NAME.to_string()],
            source,
            columns: ColumnMap::default(),
            flat_rate: None,
            max_source_rows: cfg.max_source_rows,
            table_ttl: cfg.coefficient_cache_ttl(),
        }
    }

    /// Uses the built-in coefficient table.
    pub fn with_default_table() -> Self {
        Self::new(Arc::new(StaticSource::new("default", default_coefficients())))
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_flat_rate(mut self, rate: f64) -> Self {
        self.flat_rate = Some(rate);
        self
    }

    pub fn with_config(mut self, cfg: &EnrichConfig) -> Self {
        self.max_source_rows = cfg.max_source_rows;
        self.table_ttl = cfg.coefficient_cache_ttl();
        self
    }

    fn load_table(&self, ctx: &PipelineContext) -> Result<CoefficientTable, StepError> {
        let cache = AggregationCache::new(Arc::clone(&ctx.cache), "coefficients", self.table_ttl);
        let coefs: Vec<Coefficient> =
            cache.get_or_try_insert_with("table", &self.source.describe(), || self.source.load())?;
        let table = CoefficientTable::new(coefs);
        Ok(match self.flat_rate {
            Some(rate) => table.with_flat_rate(rate),
            None => table,
        })
    }

    fn estimate(
        &self,
        ctx: &PipelineContext,
        view: &MaterializedView,
        table: &CoefficientTable,
        input: &EnrichedDataset,
    ) -> Result<Vec<EmissionEstimate>, StepError> {
        let c = &self.columns;
        let groups = ctx.query.execute(&Statement::Aggregate {
            view: view.name.clone(),
            group_by: vec![c.resource_id.clone(), c.service.clone(), c.region.clone()],
            sums: vec![c.billed_cost.clone(), c.consumed_quantity.clone()],
            filter: Some(Predicate::IsNotNull { column: c.service.clone() }),
        })?;

        let tags: HashMap<&str, &BTreeMap<String, String>> = input
            .tag_overlays()
            .unwrap_or_default()
            .iter()
            .map(|o| (o.resource_id.as_str(), &o.tags))
            .collect();

        let mut out = Vec::with_capacity(groups.len());
        for row in groups {
            let Some(service) = row.text(&c.service) else { continue };
            let resource_id = row.text(&c.resource_id);
            let region = row.text(&c.region);
            let billed_cost = row.value(&c.billed_cost).as_f64().unwrap_or(0.0);
            let consumed_quantity = row.value(&c.consumed_quantity).as_f64();

            let est = table.estimate(&service, region.as_deref(), billed_cost, consumed_quantity);
            let allocation = resource_id
                .as_deref()
                .and_then(|id| tags.get(id))
                .map(|t| (*t).clone())
                .unwrap_or_default();

            out.push(EmissionEstimate {
                resource_id,
                service,
                region,
                billed_cost,
                consumed_quantity,
                kg_co2e: est.kg_co2e,
                confidence: est.confidence,
                method: est.method,
                matched: est.matched,
                allocation,
            });
        }
        Ok(out)
    }
}

impl EnrichmentStep for EmissionsStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn execute(&self, input: &EnrichedDataset, ctx: &PipelineContext) -> Result<EnrichedDataset, StepError> {
        let table = self.load_table(ctx)?;
        let c = &self.columns;
        let view = MaterializedView::materialize(
            ctx.query.as_ref(),
            ctx.view_name(Self::NAME),
            input.rows(),
            vec![
                c.resource_id.clone(),
                c.service.clone(),
                c.region.clone(),
                c.billed_cost.clone(),
                c.consumed_quantity.clone(),
            ],
            self.max_source_rows,
        )?;
        let result = self.estimate(ctx, &view, &table, input);
        view.release(ctx.query.as_ref());
        let estimates = result?;

        let total: f64 = estimates.iter().map(|e| e.kg_co2e).sum();
        tracing::debug!(run_id = %ctx.run_id, groups = estimates.len(), kg_co2e = total, "emissions estimated");

        let mut out = input.clone();
        out.append_emissions(estimates);
        Ok(out)
    }

    fn validate(&self, output: &EnrichedDataset) -> bool {
        output.emissions().is_some()
    }
}
