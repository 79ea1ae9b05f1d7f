//! Runner and pipeline against throwaway shell scripts standing in for the
//! prediction tool.
//!
//! ```bash
//! cargo test --package foldyx-jobs --test test_fake_tool
//! ```
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use foldyx_common::{ChainEntry, FoldyxError, MoleculeType, RunOptions};
use foldyx_config::ToolConfig;
use foldyx_jobs::builder::AffinityRequest;
use foldyx_jobs::pipeline::PredictionPipeline;
use foldyx_jobs::runner::{JobRunner, ToolCommand};

/// Writes the rank-0 layout for job `prediction_config` under `--out_dir` ($4).
const SUCCESS_SCRIPT: &str = r#"#!/bin/sh
echo "Loading model weights"
echo "running MSA for $2" >&2
printf 'bad \377 byte\n'
pred="$4/boltz_results_input/predictions/prediction_config"
mkdir -p "$pred"
echo "data_prediction_config" > "$pred/prediction_config_model_0.cif"
echo '{"confidence_score": 0.8123, "iptm": 0.7, "complex_plddt": 0.85}' > "$pred/confidence_prediction_config_model_0.json"
echo '{"affinity_pred_value": -3.0, "affinity_probability_binary": 0.82}' > "$pred/affinity_prediction_config.json"
echo "Done"
"#;

const FAILING_SCRIPT: &str = r#"#!/bin/sh
echo "starting"
echo "CUDA out of memory" >&2
exit 3
"#;

const SLOW_SCRIPT: &str = r#"#!/bin/sh
echo "started"
exec sleep 30
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn tool(script: &Path) -> ToolConfig {
    ToolConfig {
        executable: script.to_string_lossy().into_owned(),
        ..ToolConfig::default()
    }
}

fn chains() -> Vec<ChainEntry> {
    vec![
        ChainEntry::new("A", MoleculeType::Protein, "MQIFVKTLTGK"),
        ChainEntry::new("L", MoleculeType::LigandSmiles, "C1=CC=C(C=C1)C(=O)O"),
    ]
}

#[tokio::test]
async fn test_successful_run_streams_log_and_collects_results() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "fake-boltz", SUCCESS_SCRIPT);
    let pipeline = PredictionPipeline::new(
        tmp.path().join("runs"),
        "prediction_config",
        JobRunner::new(tool(&script)),
    );

    let mut streamed = Vec::new();
    let outcome = pipeline
        .run(
            &chains(),
            Some(&AffinityRequest::new("L")),
            &RunOptions::default(),
            1,
            |line| streamed.push(line.to_string()),
        )
        .await
        .unwrap();

    assert!(streamed.contains(&"Loading model weights".to_string()));
    assert!(streamed.iter().any(|l| l.starts_with("running MSA for ") && l.ends_with("/input")));
    assert!(streamed.iter().any(|l| l.contains('\u{FFFD}')));
    assert_eq!(outcome.log.line_count, streamed.len());
    assert!(outcome.log.text.contains("Done"));

    let results = outcome.results;
    assert!(results.structure.is_some());
    assert_eq!(results.confidence.confidence_score, "0.812");
    assert_eq!(results.affinity.predicted_value, "-3.00");
    assert_eq!(results.affinity.binder_probability, "82.00%");
    assert!(results.notes.is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_is_process_error_with_log() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "fake-boltz", FAILING_SCRIPT);
    let pipeline = PredictionPipeline::new(
        tmp.path().join("runs"),
        "prediction_config",
        JobRunner::new(tool(&script)),
    );

    let err = pipeline
        .run(&chains(), None, &RunOptions::default(), 1, |_| {})
        .await
        .unwrap_err();

    match err {
        FoldyxError::Process { code, log } => {
            assert_eq!(code, Some(3));
            assert!(log.contains("starting"));
            assert!(log.contains("CUDA out of memory"));
        }
        other => panic!("expected Process error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_tool_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = PredictionPipeline::new(
        tmp.path().join("runs"),
        "prediction_config",
        JobRunner::new(tool(&tmp.path().join("not-installed"))),
    );
    let err = pipeline
        .run(&chains(), None, &RunOptions::default(), 1, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, FoldyxError::ToolNotFound { .. }));
}

#[tokio::test]
async fn test_cancel_kills_running_tool() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "slow-tool", SLOW_SCRIPT);
    let runner = JobRunner::new(tool(&script));

    let mut handle = runner
        .spawn(&ToolCommand::new(script.to_string_lossy()))
        .unwrap();

    // first line arrives while the process is still alive
    let first = tokio::time::timeout(Duration::from_secs(10), handle.next_line())
        .await
        .expect("line should stream before exit");
    assert_eq!(first.as_deref(), Some("started"));

    handle.cancel_token().cancel();
    let err = tokio::time::timeout(Duration::from_secs(10), handle.finish())
        .await
        .expect("cancelled run should finish promptly")
        .unwrap_err();
    assert!(matches!(err, FoldyxError::Cancelled));
}

#[tokio::test]
async fn test_timeout_kills_running_tool() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "slow-tool", SLOW_SCRIPT);
    let runner = JobRunner::new(tool(&script)).with_timeout(Some(Duration::from_millis(300)));

    let handle = runner
        .spawn(&ToolCommand::new(script.to_string_lossy()))
        .unwrap();
    let err = tokio::time::timeout(Duration::from_secs(10), handle.finish())
        .await
        .expect("timed out run should finish promptly")
        .unwrap_err();
    assert!(matches!(err, FoldyxError::TimedOut { .. }));
}

const TWO_STREAM_SCRIPT: &str = r#"#!/bin/sh
for i in 1 2 3 4 5; do
    echo "out $i"
    echo "err $i" >&2
done
"#;

#[tokio::test]
async fn test_each_stream_keeps_its_own_order() {
    let tmp = tempfile::tempdir().unwrap();
    let script = write_script(tmp.path(), "two-streams", TWO_STREAM_SCRIPT);
    let runner = JobRunner::new(tool(&script));

    let mut handle = runner
        .spawn(&ToolCommand::new(script.to_string_lossy()))
        .unwrap();
    let mut lines = Vec::new();
    while let Some(line) = handle.next_line().await {
        lines.push(line);
    }
    let log = handle.finish().await.unwrap();
    assert_eq!(log.line_count, 10);

    let only = |prefix: &str| -> Vec<String> {
        lines.iter().filter(|l| l.starts_with(prefix)).cloned().collect()
    };
    let expected = |prefix: &str| -> Vec<String> { (1..=5).map(|i| format!("{} {}", prefix, i)).collect() };
    assert_eq!(only("out"), expected("out"));
    assert_eq!(only("err"), expected("err"));
}
