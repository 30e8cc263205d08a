//! Registration, ordering and execution of enrichment steps.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use costflow_core::config::{EngineConfig, PipelineConfig};
use costflow_core::dataset::{now_millis, EnrichedDataset, RawDataset};
use costflow_core::hash::hash_names;
use costflow_enrich::{
    ClassificationStep, DefinitionSource, EmissionsStep, EnrichmentStep, PipelineContext, Rule,
    StepError, TagOverlayStep,
};

use crate::error::{DependencyError, ExecError};
use crate::metrics::emit_span;
use crate::result::{PipelineResult, RunMetadata, StepOutcome, StepStatus};

/// Owns the step registry and the computed execution order.
pub struct Pipeline {
    cfg: PipelineConfig,
    steps: HashMap<String, Arc<dyn EnrichmentStep>>,
    /// Names in first-registration order; drives traversal order.
    registration: Vec<String>,
    order: Option<Vec<String>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cfg", &self.cfg)
            .field("steps", &self.registration)
            .field("order", &self.order)
            .finish()
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            cfg,
            steps: HashMap::new(),
            registration: Vec::new(),
            order: None,
        }
    }

    /// Tagging, emissions and classification with the built-in coefficient
    /// table and classification rules.
    pub fn standard(cfg: &EngineConfig, tag_rules: Arc<dyn DefinitionSource<Rule>>) -> Self {
        let mut p = Self::new(cfg.pipeline.clone());
        p.register(TagOverlayStep::new(tag_rules).with_config(&cfg.enrich));
        p.register(EmissionsStep::with_default_table().with_config(&cfg.enrich));
        p.register(ClassificationStep::with_default_rules().with_config(&cfg.enrich));
        p
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn register<S: EnrichmentStep + 'static>(&mut self, step: S) -> &mut Self {
        self.register_arc(Arc::new(step))
    }

    /// Re-registering a name replaces the earlier step and invalidates the order.
    pub fn register_arc(&mut self, step: Arc<dyn EnrichmentStep>) -> &mut Self {
        let name = step.name().to_string();
        if self.steps.insert(name.clone(), step).is_some() {
            tracing::warn!(step = %name, "step re-registered; replacing previous definition");
        } else {
            self.registration.push(name);
        }
        self.order = None;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> &[String] {
        &self.registration
    }

    /// The order computed by the last successful `build`, if still valid.
    pub fn order(&self) -> Option<&[String]> {
        self.order.as_deref()
    }

    /// Compute (or reuse) the execution order.
    pub fn build(&mut self) -> Result<&[String], DependencyError> {
        if self.order.is_none() {
            self.order = Some(self.compute_order(false)?);
        }
        Ok(self.order.as_deref().unwrap_or_default())
    }

    /// With `skip_missing`, unregistered dependencies are passed over so the
    /// traversal can still reach cycles elsewhere in the graph.
    fn compute_order(&self, skip_missing: bool) -> Result<Vec<String>, DependencyError> {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.registration.len());
        for name in &self.registration {
            self.visit(name, skip_missing, &mut visiting, &mut visited, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        skip_missing: bool,
        visiting: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), DependencyError> {
        if visited.contains(name) {
            return Ok(());
        }
        if !visiting.insert(name.to_string()) {
            return Err(DependencyError::Cycle { step: name.to_string() });
        }

        if let Some(step) = self.steps.get(name) {
            for dep in step.dependencies() {
                if !self.steps.contains_key(dep) {
                    if skip_missing {
                        continue;
                    }
                    return Err(DependencyError::Missing {
                        step: name.to_string(),
                        dependency: dep.clone(),
                    });
                }
                self.visit(dep, skip_missing, visiting, visited, order)?;
            }
        }

        visiting.remove(name);
        visited.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Every problem that would stop `build`, as readable messages. Never fails.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for name in &self.registration {
            let Some(step) = self.steps.get(name) else { continue };
            for dep in step.dependencies() {
                if !self.steps.contains_key(dep) {
                    problems.push(
                        DependencyError::Missing {
                            step: name.clone(),
                            dependency: dep.clone(),
                        }
                        .to_string(),
                    );
                }
            }
        }
        if let Err(e) = self.compute_order(true) {
            problems.push(e.to_string());
        }
        problems
    }

    /// Run every step in order against `raw`.
    ///
    /// The threaded dataset only advances on a step that both executed and
    /// validated. A failure aborts the run unless `continue_on_error` is set,
    /// in which case the step is recorded as skipped and its input passes
    /// through. A deadline overrun always aborts.
    pub fn execute(&mut self, raw: impl Into<Arc<RawDataset>>, ctx: &PipelineContext) -> PipelineResult {
        let started = Instant::now();
        let mut meta = RunMetadata::new(ctx.run_id, now_millis());

        let order = match self.build() {
            Ok(order) => order.to_vec(),
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "pipeline build failed");
                finish(&mut meta, started);
                return PipelineResult::failed(ExecError::Dependency(e), meta);
            }
        };
        meta.order_digest = Some(hash_names(&order).to_hex());
        tracing::info!(run_id = %ctx.run_id, steps = order.len(), "pipeline run started");

        let limit = self.cfg.max_duration();
        let mut current = EnrichedDataset::from_raw(raw.into());

        for (i, name) in order.iter().enumerate() {
            if let Some(limit) = limit {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    let err = timeout(limit, elapsed, name);
                    return abort(meta, &order, i, None, err, started);
                }
            }

            let step = match self.steps.get(name) {
                Some(step) => Arc::clone(step),
                None => continue,
            };
            let step_started = Instant::now();
            let outcome = run_step(step.as_ref(), &current, ctx);
            let step_ms = millis(step_started.elapsed());

            if let Some(limit) = limit {
                let elapsed = started.elapsed();
                if elapsed > limit {
                    // Output of a step that finished past the deadline is discarded.
                    let err = timeout(limit, elapsed, name);
                    return abort(meta, &order, i, Some(step_ms), err, started);
                }
            }

            match outcome {
                Ok(next) => {
                    current = next;
                    meta.steps_executed.push(name.clone());
                    meta.steps.push(StepOutcome {
                        name: name.clone(),
                        status: StepStatus::Completed,
                        duration_ms: step_ms,
                    });
                    tracing::debug!(run_id = %ctx.run_id, step = %name, duration_ms = step_ms, "step completed");
                    emit_span("step_completed", &[("step", name.clone()), ("duration_ms", step_ms.to_string())]);
                }
                Err(err) if self.cfg.continue_on_error => {
                    tracing::warn!(run_id = %ctx.run_id, step = %name, error = %err, "step failed; continuing");
                    meta.warnings.push(format!("step '{name}' skipped: {err}"));
                    meta.steps_skipped.push(name.clone());
                    meta.steps.push(StepOutcome {
                        name: name.clone(),
                        status: StepStatus::Failed { reason: err.to_string() },
                        duration_ms: step_ms,
                    });
                }
                Err(err) => {
                    tracing::warn!(run_id = %ctx.run_id, step = %name, error = %err, "step failed; aborting run");
                    return abort(meta, &order, i, Some(step_ms), err, started);
                }
            }
        }

        finish(&mut meta, started);
        tracing::info!(
            run_id = %ctx.run_id,
            executed = meta.steps_executed.len(),
            skipped = meta.steps_skipped.len(),
            duration_ms = meta.duration_ms,
            "pipeline run finished"
        );
        emit_span("run_finished", &[("run_id", ctx.run_id.to_string()), ("duration_ms", meta.duration_ms.to_string())]);
        PipelineResult::succeeded(current, meta)
    }
}

fn run_step(
    step: &dyn EnrichmentStep,
    input: &EnrichedDataset,
    ctx: &PipelineContext,
) -> Result<EnrichedDataset, ExecError> {
    let name = step.name();
    if let Some(field) = ctx.first_missing(step.required_context()) {
        return Err(ExecError::StepExecution {
            step: name.to_string(),
            source: StepError::MissingContext(field),
        });
    }
    let output = step.execute(input, ctx).map_err(|source| ExecError::StepExecution {
        step: name.to_string(),
        source,
    })?;
    if !step.validate(&output) {
        return Err(ExecError::Validation { step: name.to_string() });
    }
    Ok(output)
}

fn timeout(limit: Duration, elapsed: Duration, step: &str) -> ExecError {
    ExecError::Timeout {
        limit_ms: millis(limit),
        elapsed_ms: millis(elapsed),
        step: step.to_string(),
    }
}

fn finish(meta: &mut RunMetadata, started: Instant) {
    meta.duration_ms = millis(started.elapsed());
    meta.finished_ms = meta.started_ms.saturating_add(meta.duration_ms);
}

/// Fail the run at `order[at]`: that step and every later one are skipped.
/// `ran_ms` is set when the failing step actually executed.
fn abort(
    mut meta: RunMetadata,
    order: &[String],
    at: usize,
    ran_ms: Option<u64>,
    err: ExecError,
    started: Instant,
) -> PipelineResult {
    for (j, name) in order.iter().enumerate().skip(at) {
        meta.steps_skipped.push(name.clone());
        let status = match (j == at, ran_ms) {
            (true, Some(_)) => StepStatus::Failed { reason: err.to_string() },
            _ => StepStatus::NotRun,
        };
        meta.steps.push(StepOutcome {
            name: name.clone(),
            status,
            duration_ms: if j == at { ran_ms.unwrap_or(0) } else { 0 },
        });
    }
    finish(&mut meta, started);
    PipelineResult::failed(err, meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use costflow_cache::VolatileCache;
    use costflow_core::dataset::{DataFormat, SourceMetadata};
    use costflow_query::MemoryEngine;

    struct Named {
        name: String,
        deps: Vec<String>,
    }

    impl Named {
        fn new(name: &str, deps: &[&str]) -> Self {
            Self {
                name: name.into(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
            }
        }
    }

    impl EnrichmentStep for Named {
        fn name(&self) -> &str {
            &self.name
        }
        fn dependencies(&self) -> &[String] {
            &self.deps
        }
        fn execute(&self, input: &EnrichedDataset, _: &PipelineContext) -> Result<EnrichedDataset, StepError> {
            let mut out = input.clone();
            out.append_extension("trail", [serde_json::json!(self.name)]);
            Ok(out)
        }
    }

    fn ctx() -> PipelineContext {
        PipelineContext::new(Arc::new(MemoryEngine::new()), Arc::new(VolatileCache::new(None, 8, None)))
    }

    fn raw() -> RawDataset {
        RawDataset::new(vec![], SourceMetadata::new("test", DataFormat::Json))
    }

    #[test]
    fn order_respects_dependencies_regardless_of_registration() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("c", &["b"]));
        p.register(Named::new("b", &["a"]));
        p.register(Named::new("a", &[]));
        assert_eq!(p.build().unwrap(), &["a", "b", "c"]);
    }

    #[test]
    fn re_registration_invalidates_order() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("a", &[]));
        p.register(Named::new("b", &[]));
        assert_eq!(p.build().unwrap(), &["a", "b"]);

        p.register(Named::new("a", &["b"]));
        assert!(p.order().is_none());
        assert_eq!(p.build().unwrap(), &["b", "a"]);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("a", &["a"]));
        assert_eq!(p.build().unwrap_err(), DependencyError::Cycle { step: "a".into() });
    }

    #[test]
    fn validate_lists_missing_and_cycles_without_failing() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("a", &["ghost"]));
        p.register(Named::new("x", &["y"]));
        p.register(Named::new("y", &["x"]));
        let problems = p.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("ghost"));
        assert!(problems[1].contains("cycle"));

        let mut q = Pipeline::new(PipelineConfig::default());
        q.register(Named::new("x", &["y"]));
        q.register(Named::new("y", &["x"]));
        assert_eq!(q.validate().len(), 1);
        assert!(q.validate()[0].contains("cycle"));
    }

    #[test]
    fn validate_finds_cycle_through_a_step_with_a_missing_dependency() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("x", &["ghost", "y"]));
        p.register(Named::new("y", &["x"]));
        let problems = p.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|m| m.contains("ghost")));
        assert!(problems.iter().any(|m| m.contains("cycle")));
        // build still reports the first problem it meets.
        assert!(matches!(p.build(), Err(DependencyError::Missing { .. })));
    }

    #[test]
    fn build_failure_runs_nothing() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("a", &["ghost"]));
        let res = p.execute(raw(), &ctx());
        assert!(!res.success);
        assert!(matches!(res.cause(), Some(ExecError::Dependency(_))));
        assert!(res.metadata.steps_executed.is_empty());
        assert!(res.metadata.steps_skipped.is_empty());
        assert!(res.metadata.order_digest.is_none());
    }

    #[test]
    fn successful_run_threads_data_and_records_outcomes() {
        let mut p = Pipeline::new(PipelineConfig::default());
        p.register(Named::new("b", &["a"]));
        p.register(Named::new("a", &[]));
        let res = p.execute(raw(), &ctx());
        assert!(res.success);
        assert_eq!(res.metadata.steps_executed, vec!["a", "b"]);
        assert_eq!(res.metadata.steps.len(), 2);
        assert!(res.metadata.outcome("b").map_or(false, |o| o.status == StepStatus::Completed));
        let trail = res.data.unwrap();
        assert_eq!(
            trail.extension("trail").unwrap(),
            &[serde_json::json!("a"), serde_json::json!("b")]
        );
    }
}
