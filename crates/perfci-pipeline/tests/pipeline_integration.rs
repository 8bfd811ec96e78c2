//! End-to-end pipeline runs against scripted and process workers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use perfci_core::{
    ArtifactCodec, MemoryRunHost, ProcessConfig, RcaStrategy, ResultsFolders, TrendStore,
};
use perfci_pipeline::fakes::{ScriptedExecutor, ScriptedStep};
use perfci_pipeline::{
    PipelineOrchestrator, PipelinePaths, PipelineStage, PipelineState, ProcessExecutor,
    RemoteExecutor, TaskRequest,
};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    host: Arc<MemoryRunHost>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("project")).unwrap();
        Self {
            dir,
            host: Arc::new(MemoryRunHost::new()),
        }
    }

    fn paths(&self) -> PipelinePaths {
        PipelinePaths {
            remote_workspace: self.dir.path().join("project"),
            local_results: self.dir.path().join("results"),
        }
    }

    fn local(&self) -> &Path {
        self.dir.path()
    }

    fn folders(&self) -> ResultsFolders {
        ResultsFolders::new(self.dir.path().join("results"), "demo")
    }

    fn orchestrator(
        &self,
        config: ProcessConfig,
        executor: Arc<dyn RemoteExecutor>,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            config,
            ArtifactCodec::default(),
            executor,
            self.host.clone(),
            self.paths(),
        )
    }
}

fn config() -> ProcessConfig {
    ProcessConfig::builder("demo")
        .execute_rca(false)
        .build()
        .unwrap()
}

fn rca_config() -> ProcessConfig {
    ProcessConfig::builder("demo")
        .execute_rca(true)
        .rca_strategy(RcaStrategy::Levelwise)
        .build()
        .unwrap()
}

fn measurement_file(clazz: &str, method: &str) -> String {
    format!(
        r#"{{"test_case": "{}#{}", "values": {{"HEAD": [1.2, 1.3], "HEAD~1": [1.0, 1.1]}}}}"#,
        clazz, method
    )
}

const CHANGES: &str = r#"{"versions": {"HEAD": {"testcase_changes": {"a.ATest": [
    {"method": "x", "old_time": 1.05, "change_percent": 19.0, "t_value": 4.2}
]}}}}"#;

const CALL_TREE: &str = r#"{"call": "a.ATest#x", "mean_old": 1.05, "mean_current": 1.25,
    "is_change": true, "children": [{"call": "a.Impl#slow", "is_change": true}]}"#;

/// Twelve artifacts and no changes file.
fn twelve_artifacts() -> ScriptedExecutor {
    let mut executor = ScriptedExecutor::new()
        .with_measure_artifact(
            "statistics.json",
            r#"{"statistics": {"a.ATest#x": {"mean_old": 1.05, "mean_current": 1.25}}}"#,
        )
        .with_measure_artifact(
            "deps_demo.json",
            r#"{"HEAD": {"a.A": ["a.ATest#x"]}}"#,
        )
        .with_measure_artifact("execute_demo.json", r#"{"HEAD": ["a.ATest#x"]}"#);
    for i in 0..9 {
        executor = executor.with_measure_artifact(
            format!("HEAD_HEAD~1/test{}.json", i),
            measurement_file("a.ATest", &format!("m{}", i)),
        );
    }
    executor
}

#[tokio::test]
async fn test_successful_run_without_rca() {
    let fixture = Fixture::new();
    let executor = Arc::new(twelve_artifacts());
    let result = fixture
        .orchestrator(config(), executor.clone())
        .run()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.files_synced, 12);
    assert_eq!(
        result.visited,
        vec![
            PipelineState::Idle,
            PipelineState::Measuring,
            PipelineState::Syncing,
            PipelineState::Reporting,
            PipelineState::Done { success: true },
        ]
    );

    // ProjectChanges absent: empty changes, one trend entry
    let measurement = result.measurement.unwrap();
    assert!(measurement.changes.is_empty());
    assert_eq!(measurement.histograms.len(), 9);
    let codec = ArtifactCodec::default();
    let trend = TrendStore::new(fixture.folders().trend_file(), &codec)
        .load()
        .unwrap();
    assert_eq!(trend.len(), 1);
    assert_eq!(trend.entries()[0].run_id, result.run_id);

    let selection = result.selection.unwrap();
    assert_eq!(selection.changed_entities(), vec!["a.A"]);
    assert_eq!(selection.dynamic_selection, vec!["a.ATest#x".to_string()]);
    assert!(selection.coverage_selection.is_none());

    assert!(fixture.host.attached("measurement").is_some());
    assert!(fixture.host.attached("rts").is_some());
    assert!(fixture.host.attached("rca").is_none());
    assert!(!fixture.host.is_failed());
    assert_eq!(executor.call_names(), vec!["measure"]);
}

#[tokio::test]
async fn test_measure_failure_skips_everything_else() {
    let fixture = Fixture::new();
    let executor = Arc::new(twelve_artifacts().measure(ScriptedStep::Fail));
    let result = fixture
        .orchestrator(rca_config(), executor.clone())
        .run()
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.final_state, PipelineState::Done { success: false });
    assert_eq!(result.failed_stage, Some(PipelineStage::Measure));
    assert!(!result.executed(PipelineStage::Sync));
    assert!(!result.executed(PipelineStage::Report));
    assert!(!result.executed(PipelineStage::RcaRun));
    assert!(result.measurement.is_none());
    assert_eq!(executor.call_names(), vec!["measure"]);

    assert!(fixture.host.is_failed());
    assert!(fixture.host.attached_names().is_empty());
    assert!(!fixture.folders().trend_file().exists());
}

#[tokio::test]
async fn test_measure_error_carries_cause() {
    let fixture = Fixture::new();
    let executor = Arc::new(
        ScriptedExecutor::new().measure(ScriptedStep::Raise("OutOfMemoryError".to_string())),
    );
    let result = fixture.orchestrator(config(), executor).run().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(PipelineStage::Measure));
    assert!(result.error.unwrap().contains("OutOfMemoryError"));
    assert!(fixture.host.is_failed());
}

#[tokio::test]
async fn test_rca_disabled_ends_after_reporting() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new().with_measure_artifact("changes.json", CHANGES));
    let result = fixture
        .orchestrator(config(), executor.clone())
        .run()
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.reached(PipelineState::Reporting));
    assert!(!result.executed(PipelineStage::RcaRun));
    assert_eq!(
        result.visited.last(),
        Some(&PipelineState::Done { success: true })
    );
    assert_eq!(executor.call_names(), vec!["measure"]);
}

#[tokio::test]
async fn test_rca_toggle_decides_whether_search_runs() {
    let executor = || {
        Arc::new(
            ScriptedExecutor::new()
                .with_measure_artifact("changes.json", CHANGES)
                .with_rca_artifact("rca/HEAD/a.ATest/x.json", CALL_TREE),
        )
    };

    let off = Fixture::new();
    let without = executor();
    let result = off
        .orchestrator(config(), without.clone())
        .run()
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.files_synced, 1);
    assert!(!result.reached(PipelineState::RcaRunning));
    assert!(result.rca.is_none());
    assert_eq!(without.call_names(), vec!["measure"]);
    assert!(off.host.attached("rca").is_none());

    let on = Fixture::new();
    let with = executor();
    let result = on
        .orchestrator(rca_config(), with.clone())
        .run()
        .await
        .unwrap();
    assert!(result.success, "{:?}", result.error);
    assert!(result.reached(PipelineState::RcaReporting));
    assert!(result.rca.is_some());
    assert_eq!(with.call_names(), vec!["measure", "root_cause_search"]);
    assert!(on.host.attached("rca").is_some());
}

#[tokio::test]
async fn test_rca_run_reports_call_trees() {
    let fixture = Fixture::new();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_measure_artifact("changes.json", CHANGES)
            .with_rca_artifact("rca/HEAD/a.ATest/x.json", CALL_TREE),
    );
    let result = fixture
        .orchestrator(rca_config(), executor.clone())
        .run()
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.visited,
        vec![
            PipelineState::Idle,
            PipelineState::Measuring,
            PipelineState::Syncing,
            PipelineState::Reporting,
            PipelineState::RcaRunning,
            PipelineState::RcaSyncing,
            PipelineState::RcaReporting,
            PipelineState::Done { success: true },
        ]
    );

    let rca = result.rca.unwrap();
    assert_eq!(rca.analysed_count(), 1);
    assert_eq!(
        rca.results[0].tree.as_ref().unwrap().root_causes(),
        vec!["a.Impl#slow"]
    );
    assert!(fixture.host.attached("rca").is_some());

    let calls = executor.calls();
    assert_eq!(executor.call_names(), vec!["measure", "root_cause_search"]);
    match &calls[1] {
        TaskRequest::RootCauseSearch {
            changes,
            cause_searcher,
            ..
        } => {
            assert_eq!(cause_searcher.strategy, RcaStrategy::Levelwise);
            assert_eq!(changes.version(&"HEAD".into()).changed_tests().len(), 1);
        }
        other => panic!("unexpected request {:?}", other),
    }
}

#[tokio::test]
async fn test_rca_failure_fails_run() {
    let fixture = Fixture::new();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_measure_artifact("changes.json", CHANGES)
            .root_cause(ScriptedStep::Fail),
    );
    let result = fixture.orchestrator(rca_config(), executor).run().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(PipelineStage::RcaRun));
    assert!(!result.executed(PipelineStage::RcaSync));
    // measurement results stay attached
    assert!(result.measurement.is_some());
    assert!(fixture.host.attached("measurement").is_some());
    assert!(fixture.host.is_failed());
}

#[tokio::test]
async fn test_malformed_artifact_fails_reporting() {
    let fixture = Fixture::new();
    let executor =
        Arc::new(ScriptedExecutor::new().with_measure_artifact("statistics.json", "{not json"));
    let result = fixture.orchestrator(config(), executor).run().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(PipelineStage::Report));
    assert!(result.error.unwrap().contains("statistics.json"));
    // synced artifacts stay in place
    assert!(fixture.folders().statistics_file().exists());
    assert!(fixture.host.is_failed());
}

#[tokio::test]
async fn test_failed_report_leaves_no_trend_entry() {
    let fixture = Fixture::new();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_measure_artifact("statistics.json", r#"{"statistics": {}}"#)
            .with_measure_artifact("deps_demo.json", "[broken"),
    );
    let result = fixture.orchestrator(config(), executor).run().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(PipelineStage::Report));
    assert!(result.error.as_ref().unwrap().contains("deps_demo.json"));
    let codec = ArtifactCodec::default();
    let trend = TrendStore::new(fixture.folders().trend_file(), &codec)
        .load()
        .unwrap();
    assert!(trend.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_root_cause_search_timeout_is_failure() {
    let fixture = Fixture::new();
    let config = ProcessConfig::builder("demo")
        .execute_rca(true)
        .measure_timeout_secs(30)
        .build()
        .unwrap();
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_measure_artifact("changes.json", CHANGES)
            .root_cause(ScriptedStep::Hang),
    );
    let result = fixture.orchestrator(config, executor).run().await.unwrap();

    assert!(!result.success);
    assert!(!result.cancelled);
    assert_eq!(result.failed_stage, Some(PipelineStage::RcaRun));
    assert!(result.error.as_ref().unwrap().contains("timed out"));
    assert!(!result.executed(PipelineStage::RcaSync));
    assert!(fixture.host.attached("measurement").is_some());
    assert!(fixture.host.is_failed());
}

#[tokio::test(start_paused = true)]
async fn test_measure_timeout_is_failure() {
    let fixture = Fixture::new();
    let config = ProcessConfig::builder("demo")
        .execute_rca(false)
        .measure_timeout_secs(30)
        .build()
        .unwrap();
    let executor = Arc::new(ScriptedExecutor::new().measure(ScriptedStep::Hang));
    let result = fixture.orchestrator(config, executor).run().await.unwrap();

    assert!(!result.success);
    assert!(!result.cancelled);
    assert_eq!(result.failed_stage, Some(PipelineStage::Measure));
    assert!(result.error.as_ref().unwrap().contains("timed out"));
    assert!(!result.executed(PipelineStage::Sync));
    assert!(fixture.host.is_failed());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_measure() {
    let fixture = Fixture::new();
    let executor = Arc::new(ScriptedExecutor::new().measure(ScriptedStep::Hang));
    let result = fixture
        .orchestrator(config(), executor)
        .run_until(tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.cancelled);
    assert_eq!(result.failed_stage, Some(PipelineStage::Measure));
    assert_eq!(result.final_state, PipelineState::Done { success: false });
    assert!(result.error.unwrap().contains("cancelled"));
    assert!(fixture.host.is_failed());
}

#[tokio::test]
async fn test_repeated_runs_append_trend_in_order() {
    let fixture = Fixture::new();
    let mut run_ids = Vec::new();
    for _ in 0..3 {
        let executor = Arc::new(twelve_artifacts());
        let result = fixture.orchestrator(config(), executor).run().await.unwrap();
        assert!(result.success);
        run_ids.push(result.run_id);
    }

    let codec = ArtifactCodec::default();
    let trend = TrendStore::new(fixture.folders().trend_file(), &codec)
        .load()
        .unwrap();
    let recorded: Vec<String> = trend.entries().iter().map(|e| e.run_id.clone()).collect();
    assert_eq!(recorded, run_ids);
    let sequences: Vec<u64> = trend.entries().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_process_worker_end_to_end() {
    let fixture = Fixture::new();
    let results = fixture.local().join("project_fullPeass");
    let script = format!(
        "cat > /dev/null; mkdir -p '{dir}'; \
         echo '{{\"statistics\": {{}}}}' > '{dir}/statistics.json'; \
         echo '{{\"success\": true}}'",
        dir = results.display()
    );
    let executor = Arc::new(ProcessExecutor::new(vec![
        "sh".to_string(),
        "-c".to_string(),
        script,
    ]));
    let result = fixture.orchestrator(config(), executor).run().await.unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.files_synced, 1);
    assert!(fixture.folders().statistics_file().exists());
}
