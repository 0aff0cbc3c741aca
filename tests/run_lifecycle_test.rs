//! Run lifecycle integration tests
//!
//! End-to-end coverage of the state machine over the in-memory backend:
//! terminal states, idempotent close, best-effort flush on failure, and
//! the training-vs-telemetry error split.

use std::sync::Arc;
use trueno_track::client::{MemoryClient, TrackingClient};
use trueno_track::record::{
    ExperimentId, MetricRecord, Param, ParamValue, RunId, RunRecord, RunState, TagRecord,
};
use trueno_track::{
    Error, ExperimentRegistry, RunContext, RunOutcome, ScopeError, FAILURE_REASON_TAG,
};

fn fixture() -> (Arc<MemoryClient>, ExperimentId, RunContext, tempfile::TempDir) {
    let client = Arc::new(MemoryClient::new());
    let registry = ExperimentRegistry::new(client.clone() as Arc<dyn TrackingClient>);
    let experiment = registry.resolve_or_create("Wine").unwrap();
    let staging = tempfile::tempdir().unwrap();
    let ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path(),
    );
    (client, experiment, ctx, staging)
}

// =============================================================================
// Wine scenario: the canonical success path
// =============================================================================

#[test]
fn test_wine_scenario_success() {
    let (client, experiment, mut ctx, staging) = fixture();

    let confusion_matrix = staging.path().join("Confusion-matrix.png");
    std::fs::write(&confusion_matrix, b"png-bytes").unwrap();

    ctx.open(&experiment).unwrap();
    let run_id = ctx.run_id().unwrap().clone();
    ctx.log_param("max_depth", 2i64).unwrap();
    ctx.log_metric("accuracy", 0.94, 0).unwrap();
    ctx.log_artifact(&confusion_matrix, None).unwrap();
    ctx.close(RunOutcome::Success).unwrap();

    let run = client.run(&run_id).unwrap();
    assert_eq!(run.state(), RunState::Finished);
    assert!(run.ended_at().unwrap() >= run.started_at());

    let params = client.params_for_run(&run_id);
    assert_eq!(params.len(), 1);
    assert_eq!(params["max_depth"], ParamValue::Int(2));

    let accuracy = client.metrics_for_key(&run_id, "accuracy");
    assert_eq!(accuracy.len(), 1);
    assert_eq!(accuracy[0].step(), 0);
    assert!((accuracy[0].value() - 0.94).abs() < f64::EPSILON);

    let artifacts = client.artifacts_for_run(&run_id);
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].relative_path(), "Confusion-matrix.png");
}

// =============================================================================
// Failure path: best-effort flush, original error re-surfaced
// =============================================================================

#[test]
fn test_scope_failure_flushes_and_propagates() {
    let (client, experiment, mut ctx, _staging) = fixture();

    let result: Result<(), ScopeError<(), anyhow::Error>> = ctx.scope(&experiment, |run| {
        run.log_metric("accuracy", 0.80, 0)?;
        Err(anyhow::anyhow!("training diverged"))
    });

    let run_id = most_recent_run(&client);
    match result {
        Err(ScopeError::Training(e)) => assert_eq!(e.to_string(), "training diverged"),
        other => panic!("expected Training error, got {other:?}"),
    }

    let run = client.run(&run_id).unwrap();
    assert_eq!(run.state(), RunState::Failed);
    assert!(run.ended_at().unwrap() >= run.started_at());

    // Partial telemetry survived the failure.
    let accuracy = client.metrics_for_key(&run_id, "accuracy");
    assert_eq!(accuracy.len(), 1);
    assert!((accuracy[0].value() - 0.80).abs() < f64::EPSILON);
    assert_eq!(
        client.tags_for_run(&run_id).get(FAILURE_REASON_TAG).map(String::as_str),
        Some("training diverged")
    );
}

#[test]
fn test_scope_success_finishes_run() {
    let (client, experiment, mut ctx, _staging) = fixture();

    let trained: Result<&str, ScopeError<&str, anyhow::Error>> = ctx.scope(&experiment, |run| {
        run.log_param("n_estimators", 8i64)?;
        Ok("fitted")
    });
    assert_eq!(trained.unwrap(), "fitted");

    let run_id = most_recent_run(&client);
    assert_eq!(client.run(&run_id).unwrap().state(), RunState::Finished);
}

// =============================================================================
// Idempotent close and terminal-state enforcement
// =============================================================================

#[test]
fn test_double_close_no_error_no_duplicate_flush() {
    let (client, experiment, mut ctx, _staging) = fixture();

    ctx.open(&experiment).unwrap();
    let run_id = ctx.run_id().unwrap().clone();
    ctx.log_metric("loss", 0.5, 0).unwrap();
    ctx.close(RunOutcome::Success).unwrap();
    ctx.close(RunOutcome::Success).unwrap();

    assert_eq!(client.metrics_for_key(&run_id, "loss").len(), 1);
}

#[test]
fn test_operations_after_close_rejected() {
    let (_client, experiment, mut ctx, _staging) = fixture();

    ctx.open(&experiment).unwrap();
    ctx.close(RunOutcome::Success).unwrap();

    assert!(matches!(
        ctx.log_param("late", 1i64),
        Err(Error::RunClosed { .. })
    ));
    assert!(matches!(
        ctx.log_metric("late", 0.0, 0),
        Err(Error::RunClosed { .. })
    ));
    assert!(matches!(
        ctx.set_tag("late", "tag"),
        Err(Error::RunClosed { .. })
    ));
}

#[test]
fn test_nested_open_rejected() {
    let (_client, experiment, mut ctx, _staging) = fixture();
    ctx.open(&experiment).unwrap();
    assert!(matches!(
        ctx.open(&experiment),
        Err(Error::RunAlreadyActive { .. })
    ));
}

// =============================================================================
// Telemetry failures stay distinguishable from training failures
// =============================================================================

/// Backend whose tag store is down; everything else works.
struct TagsDown(MemoryClient);

impl TrackingClient for TagsDown {
    fn create_experiment(&self, name: &str) -> trueno_track::Result<ExperimentId> {
        self.0.create_experiment(name)
    }
    fn get_experiment_by_name(&self, name: &str) -> trueno_track::Result<Option<ExperimentId>> {
        self.0.get_experiment_by_name(name)
    }
    fn create_run(&self, experiment_id: &ExperimentId) -> trueno_track::Result<RunRecord> {
        self.0.create_run(experiment_id)
    }
    fn log_params(&self, run_id: &RunId, params: &[Param]) -> trueno_track::Result<()> {
        self.0.log_params(run_id, params)
    }
    fn log_metrics(&self, run_id: &RunId, metrics: &[MetricRecord]) -> trueno_track::Result<()> {
        self.0.log_metrics(run_id, metrics)
    }
    fn set_tags(&self, _run_id: &RunId, _tags: &[TagRecord]) -> trueno_track::Result<()> {
        Err(Error::Backend("tag store down".to_string()))
    }
    fn log_artifact(
        &self,
        run_id: &RunId,
        relative_path: &str,
        bytes: &[u8],
        checksum: &str,
    ) -> trueno_track::Result<()> {
        self.0.log_artifact(run_id, relative_path, bytes, checksum)
    }
    fn update_run_state(
        &self,
        run_id: &RunId,
        state: RunState,
        ended_at: chrono::DateTime<chrono::Utc>,
    ) -> trueno_track::Result<()> {
        self.0.update_run_state(run_id, state, ended_at)
    }
}

#[test]
fn test_telemetry_failure_still_returns_trained_value() {
    let client = Arc::new(TagsDown(MemoryClient::new()));
    let experiment = client.create_experiment("Wine").unwrap();
    let staging = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path(),
    );

    let result: Result<u32, ScopeError<u32, anyhow::Error>> = ctx.scope(&experiment, |run| {
        run.set_tag("Author", "alice")?;
        Ok(42)
    });

    match result {
        Err(ScopeError::Telemetry { value, source }) => {
            assert_eq!(value, 42);
            assert!(matches!(source, Error::Flush { .. }));
        }
        other => panic!("expected Telemetry error carrying the value, got {other:?}"),
    }

    // The run itself still reached a terminal state.
    let run_id = most_recent_run(&client.0);
    assert_eq!(client.0.run(&run_id).unwrap().state(), RunState::Finished);
}

// =============================================================================
// Parallel trials: independent contexts over one shared client
// =============================================================================

#[test]
fn test_parallel_contexts_do_not_interfere() {
    let client = Arc::new(MemoryClient::new());
    let registry = Arc::new(ExperimentRegistry::new(
        client.clone() as Arc<dyn TrackingClient>
    ));
    let staging = tempfile::tempdir().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|trial| {
            let client = client.clone();
            let registry = Arc::clone(&registry);
            let staging_root = staging.path().to_path_buf();
            std::thread::spawn(move || {
                let experiment = registry.resolve_or_create("sweep").unwrap();
                let mut ctx = RunContext::with_staging_root(
                    client as Arc<dyn TrackingClient>,
                    staging_root,
                );
                ctx.open(&experiment).unwrap();
                let run_id = ctx.run_id().unwrap().clone();
                ctx.log_param("trial", i64::from(trial)).unwrap();
                ctx.log_metric("accuracy", f64::from(trial) / 10.0, 0).unwrap();
                ctx.close(RunOutcome::Success).unwrap();
                run_id
            })
        })
        .collect();

    let run_ids: Vec<RunId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(client.run_count(), 8);

    for (trial, run_id) in run_ids.iter().enumerate() {
        let params = client.params_for_run(run_id);
        assert_eq!(params["trial"], ParamValue::Int(trial as i64));
        assert_eq!(client.run(run_id).unwrap().state(), RunState::Finished);
    }
}

// =============================================================================
// Reserved tags: run name and provenance stamp
// =============================================================================

#[test]
fn test_run_name_and_code_version_tags() {
    let (client, experiment, mut ctx, _staging) = fixture();

    ctx.open_named(&experiment, "baseline-rf").unwrap();
    let run_id = ctx.run_id().unwrap().clone();
    ctx.set_code_version("9f2c41a").unwrap();
    ctx.close(RunOutcome::Success).unwrap();

    let tags = client.tags_for_run(&run_id);
    assert_eq!(
        tags.get(trueno_track::RUN_NAME_TAG).map(String::as_str),
        Some("baseline-rf")
    );
    assert_eq!(
        tags.get(trueno_track::CODE_VERSION_TAG).map(String::as_str),
        Some("9f2c41a")
    );
}

fn most_recent_run(client: &MemoryClient) -> RunId {
    // Single-run tests only need "the" run; with several, callers keep ids.
    assert_eq!(client.run_count(), 1, "fixture expects exactly one run");
    client
        .run_ids()
        .into_iter()
        .next()
        .expect("one run present")
}
