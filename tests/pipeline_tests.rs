//! Orchestrator behaviour: dependency errors, failure policies, deadlines.

mod test_data_gen;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use costflow_core::config::PipelineConfig;
use costflow_core::dataset::EnrichedDataset;
use costflow_enrich::{ContextField, EnrichmentStep, PipelineContext, RunAttributes, StepError};
use costflow_exec::{DependencyError, ExecError, Pipeline, StepStatus};
use serde_json::json;
use test_data_gen::{memory_context, sample_dataset};

#[derive(Clone, Copy)]
enum Behavior {
    Mark,
    Fail,
    DropMarks,
    Sleep(Duration),
}

/// Appends its own name to the "trail" extension, or misbehaves on request.
struct Probe {
    name: String,
    deps: Vec<String>,
    required: Vec<ContextField>,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl Probe {
    fn new(name: &str, deps: &[&str], behavior: Behavior) -> Self {
        Self {
            name: name.into(),
            deps: deps.iter().map(|d| d.to_string()).collect(),
            required: Vec::new(),
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn requiring(mut self, field: ContextField) -> Self {
        self.required.push(field);
        self
    }
}

impl EnrichmentStep for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.deps
    }

    fn required_context(&self) -> &[ContextField] {
        &self.required
    }

    fn execute(&self, input: &EnrichedDataset, _ctx: &PipelineContext) -> Result<EnrichedDataset, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = input.clone();
        match self.behavior {
            Behavior::Mark => out.append_extension("trail", [json!(self.name)]),
            Behavior::Fail => return Err(StepError::Invalid(format!("{} exploded", self.name))),
            Behavior::DropMarks => {}
            Behavior::Sleep(d) => {
                std::thread::sleep(d);
                out.append_extension("trail", [json!(self.name)]);
            }
        }
        Ok(out)
    }

    fn validate(&self, output: &EnrichedDataset) -> bool {
        match self.behavior {
            Behavior::DropMarks => false,
            _ => output.extension("trail").is_some(),
        }
    }
}

fn trail(data: &EnrichedDataset) -> Vec<String> {
    data.extension("trail")
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn three_steps(cfg: PipelineConfig, middle: Behavior) -> (Pipeline, Arc<AtomicUsize>) {
    let s3 = Probe::new("S3", &["S2"], Behavior::Mark);
    let s3_calls = Arc::clone(&s3.calls);
    let mut p = Pipeline::new(cfg);
    p.register(s3);
    p.register(Probe::new("S2", &["S1"], middle));
    p.register(Probe::new("S1", &[], Behavior::Mark));
    (p, s3_calls)
}

#[test]
fn mutual_dependency_is_a_cycle() {
    let mut p = Pipeline::new(PipelineConfig::default());
    p.register(Probe::new("A", &["B"], Behavior::Mark));
    p.register(Probe::new("B", &["A"], Behavior::Mark));

    let err = p.build().unwrap_err();
    assert!(matches!(err, DependencyError::Cycle { .. }));
    assert!(p.order().is_none());
}

#[test]
fn missing_dependency_names_the_ghost() {
    let mut p = Pipeline::new(PipelineConfig::default());
    p.register(Probe::new("A", &["ghost"], Behavior::Mark));

    match p.build().unwrap_err() {
        DependencyError::Missing { step, dependency } => {
            assert_eq!(step, "A");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fail_fast_stops_at_the_failing_step() {
    let (mut p, s3_calls) = three_steps(PipelineConfig::default(), Behavior::Fail);
    let res = p.execute(sample_dataset(), &memory_context());

    assert!(!res.success);
    assert!(res.data.is_none());
    assert!(res.error.as_deref().unwrap().contains("S2"));
    assert_eq!(res.metadata.steps_executed, vec!["S1"]);
    assert_eq!(res.metadata.steps_skipped, vec!["S2", "S3"]);
    assert_eq!(s3_calls.load(Ordering::SeqCst), 0);

    let statuses: Vec<&StepStatus> = res.metadata.steps.iter().map(|o| &o.status).collect();
    assert!(matches!(statuses[..], [StepStatus::Completed, StepStatus::Failed { .. }, StepStatus::NotRun]));
}

#[test]
fn continue_on_error_passes_input_through() {
    let cfg = PipelineConfig {
        continue_on_error: true,
        ..PipelineConfig::default()
    };
    let (mut p, s3_calls) = three_steps(cfg, Behavior::Fail);
    let res = p.execute(sample_dataset(), &memory_context());

    assert!(res.success);
    assert!(res.is_partial());
    assert_eq!(res.metadata.steps_executed, vec!["S1", "S3"]);
    assert_eq!(res.metadata.steps_skipped, vec!["S2"]);
    assert_eq!(res.metadata.warnings.len(), 1);
    assert!(res.metadata.warnings[0].contains("S2"));
    assert_eq!(s3_calls.load(Ordering::SeqCst), 1);
    // S3 ran on S1's output untouched by S2.
    assert_eq!(trail(res.data.as_ref().unwrap()), vec!["S1", "S3"]);
}

#[test]
fn validation_failure_counts_as_step_failure() {
    let (mut p, _) = three_steps(PipelineConfig::default(), Behavior::DropMarks);
    // DropMarks still returns the input (which has S1's mark) but rejects it.
    let res = p.execute(sample_dataset(), &memory_context());
    assert!(!res.success);
    assert!(matches!(res.cause(), Some(ExecError::Validation { step }) if step == "S2"));
}

#[test]
fn executed_and_skipped_partition_the_order() {
    for continue_on_error in [false, true] {
        let cfg = PipelineConfig {
            continue_on_error,
            ..PipelineConfig::default()
        };
        let (mut p, _) = three_steps(cfg, Behavior::Fail);
        let order = p.build().unwrap().to_vec();
        let res = p.execute(sample_dataset(), &memory_context());

        let mut seen: Vec<String> = res
            .metadata
            .steps_executed
            .iter()
            .chain(&res.metadata.steps_skipped)
            .cloned()
            .collect();
        seen.sort();
        let mut expected = order.clone();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(res.metadata.steps.len(), order.len());
    }
}

#[test]
fn deadline_discards_late_output_and_aborts() {
    let cfg = PipelineConfig {
        continue_on_error: true,
        max_duration_ms: Some(20),
    };
    let mut p = Pipeline::new(cfg);
    p.register(Probe::new("fast", &[], Behavior::Mark));
    p.register(Probe::new("slow", &["fast"], Behavior::Sleep(Duration::from_millis(60))));
    p.register(Probe::new("after", &["slow"], Behavior::Mark));

    let res = p.execute(sample_dataset(), &memory_context());
    assert!(!res.success, "timeouts abort even under continue-on-error");
    assert!(res.data.is_none());
    match res.cause() {
        Some(ExecError::Timeout { limit_ms, step, .. }) => {
            assert_eq!(*limit_ms, 20);
            assert_eq!(step, "slow");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(res.metadata.steps_executed, vec!["fast"]);
    assert_eq!(res.metadata.steps_skipped, vec!["slow", "after"]);
}

#[test]
fn zero_deadline_runs_nothing() {
    let cfg = PipelineConfig {
        continue_on_error: false,
        max_duration_ms: Some(0),
    };
    let mut p = Pipeline::new(cfg);
    let probe = Probe::new("only", &[], Behavior::Mark);
    let calls = Arc::clone(&probe.calls);
    p.register(probe);

    let res = p.execute(sample_dataset(), &memory_context());
    assert!(matches!(res.cause(), Some(ExecError::Timeout { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(res.metadata.steps[0].status, StepStatus::NotRun);
}

#[test]
fn missing_required_context_fails_the_step() {
    let cfg = PipelineConfig {
        continue_on_error: true,
        ..PipelineConfig::default()
    };
    let mut p = Pipeline::new(cfg);
    p.register(Probe::new("needs-file", &[], Behavior::Mark).requiring(ContextField::FileName));

    let res = p.execute(sample_dataset(), &memory_context());
    assert!(res.success);
    assert_eq!(res.metadata.steps_skipped, vec!["needs-file"]);
    assert!(res.metadata.warnings[0].contains("file_name"));

    let ctx = memory_context().with_attributes(RunAttributes {
        file_name: Some("bill-2024-05.csv".into()),
        ..RunAttributes::default()
    });
    let res = p.execute(sample_dataset(), &ctx);
    assert_eq!(res.metadata.steps_executed, vec!["needs-file"]);
}

#[test]
fn run_metadata_is_stable_for_the_same_order() {
    let (mut p, _) = three_steps(PipelineConfig::default(), Behavior::Mark);
    let ctx = memory_context();
    let a = p.execute(sample_dataset(), &ctx);
    let b = p.execute(sample_dataset(), &ctx);
    assert_eq!(a.metadata.order_digest, b.metadata.order_digest);
    assert!(a.metadata.order_digest.is_some());
    assert_eq!(a.metadata.run_id, ctx.run_id);
    assert!(a.metadata.finished_ms >= a.metadata.started_ms);

    let json = serde_json::to_value(&a).unwrap();
    assert_eq!(json["success"], json!(true));
    assert_eq!(json["metadata"]["steps"][0]["status"], json!("completed"));
}
