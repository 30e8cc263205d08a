//! Virtual tags from priority-ordered rules.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use costflow_cache::AggregationCache;
use costflow_core::config::EnrichConfig;
use costflow_core::dataset::EnrichedDataset;
use costflow_core::enrichment::TagOverlay;
use costflow_query::{MaterializedView, Predicate, Statement};

use crate::columns::ColumnMap;
use crate::context::PipelineContext;
use crate::error::StepError;
use crate::merge::TagMergePolicy;
use crate::rule::{evaluation_order, Rule};
use crate::source::DefinitionSource;
use crate::traits::EnrichmentStep;

/// Overlays in first-match order, merged per resource.
#[derive(Debug, Default)]
struct TagAccumulator {
    overlays: Vec<TagOverlay>,
    index: HashMap<String, usize>,
}

impl TagAccumulator {
    fn apply(&mut self, resource_id: String, rule: &Rule, policy: TagMergePolicy) {
        match self.index.get(&resource_id) {
            Some(&i) => {
                let overlay = &mut self.overlays[i];
                policy.merge(&mut overlay.tags, &rule.tags);
                overlay.rule_ids.push(rule.id.clone());
            }
            None => {
                self.index.insert(resource_id.clone(), self.overlays.len());
                self.overlays.push(TagOverlay {
                    resource_id,
                    tags: rule.tags.clone(),
                    rule_ids: vec![rule.id.clone()],
                });
            }
        }
    }
}

pub struct TagOverlayStep {
    source: Arc<dyn DefinitionSource<Rule>>,
    policy: TagMergePolicy,
    columns: ColumnMap,
    max_source_rows: usize,
    rule_ttl: Duration,
}

impl TagOverlayStep {
    pub const NAME: &'static str = "tag_overlay";

    pub fn new(source: Arc<dyn DefinitionSource<Rule>>) -> Self {
        let cfg = EnrichConfig::default();
        Self {
            source,
            policy: TagMergePolicy::default(),
            columns: ColumnMap::default(),
            max_source_rows: cfg.max_source_rows,
            rule_ttl: cfg.rule_cache_ttl(),
        }
    }

    pub fn with_policy(mut self, policy: TagMergePolicy) -> Self {
        self.policy = policy;
        self
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

    /// Active rules in evaluation order, from the cache when fresh.
    fn load_rules(&self, ctx: &PipelineContext) -> Result<Vec<Rule>, StepError> {
        let cache = AggregationCache::new(Arc::clone(&ctx.cache), "rules", self.rule_ttl);
        let params = (ctx.org_id.as_deref(), self.source.describe());
        let rules: Vec<Rule> = cache.get_or_try_insert_with("tag_rules", &params, || self.source.load())?;
        Ok(evaluation_order(rules))
    }

    fn evaluate(
        &self,
        ctx: &PipelineContext,
        view: &MaterializedView,
        rules: &[(Rule, Predicate)],
    ) -> Result<Vec<TagOverlay>, StepError> {
        let rid = &self.columns.resource_id;
        let mut acc = TagAccumulator::default();
        for (rule, predicate) in rules {
            let filter = Predicate::And(vec![
                Predicate::IsNotNull { column: rid.clone() },
                predicate.clone(),
            ]);
            let rows = ctx
                .query
                .execute(&Statement::select_distinct(view.name.clone(), vec![rid.clone()], filter))?;
            tracing::trace!(rule = %rule.id, matched = rows.len(), "tag rule evaluated");
            for row in rows {
                if let Some(id) = row.text(rid) {
                    acc.apply(id, rule, self.policy);
                }
            }
        }
        Ok(acc.overlays)
    }
}

impl EnrichmentStep for TagOverlayStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn execute(&self, input: &EnrichedDataset, ctx: &PipelineContext) -> Result<EnrichedDataset, StepError> {
        let rules = self.load_rules(ctx)?;
        let mut out = input.clone();
        if rules.is_empty() {
            out.append_tag_overlays(Vec::new());
            return Ok(out);
        }

        let compiled = rules
            .into_iter()
            .map(|r| r.condition.to_predicate().map(|p| (r, p)))
            .collect::<Result<Vec<_>, _>>()?;

        // Resource id first, then every field a rule reads.
        let mut columns = vec![self.columns.resource_id.clone()];
        for (_, p) in &compiled {
            for c in p.columns() {
                if !columns.iter().any(|x| x == c) {
                    columns.push(c.to_string());
                }
            }
        }

        let view = MaterializedView::materialize(
            ctx.query.as_ref(),
            ctx.view_name(Self::NAME),
            input.rows(),
            columns,
            self.max_source_rows,
        )?;
        let result = self.evaluate(ctx, &view, &compiled);
        view.release(ctx.query.as_ref());
        let overlays = result?;

        tracing::debug!(run_id = %ctx.run_id, resources = overlays.len(), "tag overlays computed");
        out.append_tag_overlays(overlays);
        Ok(out)
    }

    fn validate(&self, output: &EnrichedDataset) -> bool {
        output.tag_overlays().is_some()
    }
}
