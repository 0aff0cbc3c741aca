//! File backend integration tests
//!
//! The wine scenario end-to-end against the file store, plus the durability
//! properties the in-memory backend cannot show: records readable by a
//! fresh client over the same root, and at-most-once name-index creation
//! under concurrent writers.

use std::sync::Arc;
use trueno_track::client::{FileStoreClient, TrackingClient, TrackingUri};
use trueno_track::record::{ExperimentId, ParamValue, RunState};
use trueno_track::{ExperimentRegistry, RunContext, RunOutcome};

#[test]
fn test_wine_scenario_on_disk() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();

    let client = Arc::new(FileStoreClient::new(root.path()).unwrap());
    let registry = ExperimentRegistry::new(client.clone() as Arc<dyn TrackingClient>);
    let experiment = registry.resolve_or_create("Wine").unwrap();

    let confusion_matrix = staging.path().join("Confusion-matrix.png");
    std::fs::write(&confusion_matrix, b"png-bytes").unwrap();

    let mut ctx = RunContext::with_staging_root(
        client.clone() as Arc<dyn TrackingClient>,
        staging.path().join("stage"),
    );
    ctx.open(&experiment).unwrap();
    let run_id = ctx.run_id().unwrap().clone();
    ctx.log_param("max_depth", 2i64).unwrap();
    ctx.log_metric("accuracy", 0.94, 0).unwrap();
    ctx.set_tags([("Author", "alice"), ("Project", "Wine Classification")])
        .unwrap();
    ctx.log_artifact(&confusion_matrix, None).unwrap();
    ctx.close(RunOutcome::Success).unwrap();

    let run = client.read_run(&run_id).unwrap().unwrap();
    assert_eq!(run.state(), RunState::Finished);
    assert!(run.ended_at().unwrap() >= run.started_at());

    let params = client.read_params(&run_id).unwrap();
    assert_eq!(params["max_depth"], ParamValue::Int(2));

    let metrics = client.read_metrics(&run_id).unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].key(), "accuracy");

    let tags = client.read_tags(&run_id).unwrap();
    assert_eq!(tags.get("Author").map(String::as_str), Some("alice"));

    let artifacts = client.read_artifacts(&run_id).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].relative_path(), "Confusion-matrix.png");
    assert!(artifacts[0].checksum().starts_with("sha256:"));

    let bytes_path = client
        .artifact_path(&run_id, "Confusion-matrix.png")
        .unwrap();
    assert_eq!(std::fs::read(bytes_path).unwrap(), b"png-bytes");
}

#[test]
fn test_history_survives_reconnect() {
    let root = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();

    let run_id = {
        let client = Arc::new(FileStoreClient::new(root.path()).unwrap());
        let experiment = client.create_experiment("Wine").unwrap();
        let mut ctx = RunContext::with_staging_root(
            client.clone() as Arc<dyn TrackingClient>,
            staging.path(),
        );
        ctx.open(&experiment).unwrap();
        let run_id = ctx.run_id().unwrap().clone();
        ctx.log_metric("loss", 0.3, 7).unwrap();
        ctx.close(RunOutcome::Success).unwrap();
        run_id
    };

    // A brand-new client over the same root sees the whole history.
    let reopened = FileStoreClient::new(root.path()).unwrap();
    assert!(reopened.get_experiment_by_name("Wine").unwrap().is_some());
    let run = reopened.read_run(&run_id).unwrap().unwrap();
    assert_eq!(run.state(), RunState::Finished);
    let metrics = reopened.read_metrics(&run_id).unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].step(), 7);
}

#[test]
fn test_concurrent_name_creation_single_experiment() {
    let root = tempfile::tempdir().unwrap();
    let client = Arc::new(FileStoreClient::new(root.path()).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || client.create_experiment("contended").unwrap())
        })
        .collect();

    let ids: Vec<ExperimentId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_tracking_uri_selects_file_backend() {
    let root = tempfile::tempdir().unwrap();
    let uri = TrackingUri::parse(&format!("file:{}", root.path().display())).unwrap();
    let client = uri.connect().unwrap();

    let id = client.create_experiment("Wine").unwrap();
    assert_eq!(client.get_experiment_by_name("Wine").unwrap(), Some(id));
    // The layout landed under the requested root.
    assert!(root.path().join("experiments").is_dir());
}
