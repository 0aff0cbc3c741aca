//! Autologging integration tests
//!
//! The wrapper around a fit-like call, composed with the scoped lifecycle:
//! config scalars land as params, timing and evaluation scores as metrics,
//! and instrumentation failures stay inside the warning tag.

use std::sync::Arc;
use trueno_track::client::{MemoryClient, TrackingClient};
use trueno_track::record::ParamValue;
use trueno_track::{
    Autolog, ExperimentRegistry, HyperParams, RunContext, ScopeError, AUTOLOG_WARNING_TAG,
    ELAPSED_METRIC,
};

struct ForestConfig {
    max_depth: i64,
    n_estimators: i64,
}

impl HyperParams for ForestConfig {
    fn params(&self) -> Vec<(String, ParamValue)> {
        vec![
            ("max_depth".to_string(), self.max_depth.into()),
            ("n_estimators".to_string(), self.n_estimators.into()),
        ]
    }

    fn extra_tags(&self) -> Vec<(String, String)> {
        vec![("Project".to_string(), "Wine Classification".to_string())]
    }
}

#[test]
fn test_autolog_inside_scope_records_everything() {
    let client = Arc::new(MemoryClient::new());
    let registry = ExperimentRegistry::new(client.clone() as Arc<dyn TrackingClient>);
    let experiment = registry.resolve_or_create("Wine").unwrap();
    let staging = tempfile::tempdir().unwrap();

    let mut ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path(),
    );

    let config = ForestConfig { max_depth: 2, n_estimators: 8 };
    let trained: Result<f64, ScopeError<f64, anyhow::Error>> = ctx.scope(&experiment, |run| {
        Autolog::new(run).fit_scored(
            &config,
            || Ok::<f64, anyhow::Error>(0.94),
            |accuracy| vec![("accuracy".to_string(), *accuracy)],
        )
    });
    assert!((trained.unwrap() - 0.94).abs() < f64::EPSILON);

    let run_id = client.run_ids().into_iter().next().unwrap();
    let params = client.params_for_run(&run_id);
    assert_eq!(params["max_depth"], ParamValue::Int(2));
    assert_eq!(params["n_estimators"], ParamValue::Int(8));

    assert_eq!(client.metrics_for_key(&run_id, ELAPSED_METRIC).len(), 1);
    let accuracy = client.metrics_for_key(&run_id, "accuracy");
    assert_eq!(accuracy.len(), 1);
    assert!((accuracy[0].value() - 0.94).abs() < f64::EPSILON);

    let tags = client.tags_for_run(&run_id);
    assert_eq!(
        tags.get("Project").map(String::as_str),
        Some("Wine Classification")
    );
    assert!(!tags.contains_key(AUTOLOG_WARNING_TAG));
}

#[test]
fn test_autolog_does_not_mask_training_failure() {
    let client = Arc::new(MemoryClient::new());
    let experiment = client.create_experiment("Wine").unwrap();
    let staging = tempfile::tempdir().unwrap();

    let mut ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path(),
    );

    let config = ForestConfig { max_depth: 2, n_estimators: 8 };
    let result: Result<f64, ScopeError<f64, anyhow::Error>> = ctx.scope(&experiment, |run| {
        Autolog::new(run).fit(&config, || Err(anyhow::anyhow!("singular matrix")))
    });

    match result {
        Err(ScopeError::Training(e)) => assert_eq!(e.to_string(), "singular matrix"),
        other => panic!("expected the training error, got {other:?}"),
    }

    // Config captured before the call still made it out (best-effort flush).
    let run_id = client.run_ids().into_iter().next().unwrap();
    let params = client.params_for_run(&run_id);
    assert_eq!(params["max_depth"], ParamValue::Int(2));
}

#[test]
fn test_autolog_without_open_run_only_warns() {
    let client = Arc::new(MemoryClient::new());
    let staging = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path(),
    );

    // No run is open; instrumentation must still not break the job.
    let config = ForestConfig { max_depth: 2, n_estimators: 8 };
    let fitted: Result<u32, std::io::Error> = Autolog::new(&mut ctx).fit(&config, || Ok(11));
    assert_eq!(fitted.unwrap(), 11);
}
