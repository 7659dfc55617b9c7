mod common;

use common::{orchestrator, test_config, Project, ScriptedParser};
use deltascan::core::{AnalysisMode, OutcomeStatus};
use deltascan::errors::PipelineError;
use pretty_assertions::assert_eq;
use std::path::Path;

fn sample_project() -> Project {
    Project::with_files(&[
        ("src/app.py", "dep: src/util.py\ndep: os\n"),
        ("src/util.py", "print('util')\n"),
        ("tests/test_app.py", "dep: src/app.py\n"),
        ("README.md", "# docs\n"),
        ("node_modules/lib/index.js", "ignored\n"),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_runs_are_idempotent() {
    let project = sample_project();
    let first = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();
    let second = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();

    assert!(first.same_analysis(&second));
    assert_eq!(first.mode, AnalysisMode::Full);
    assert_eq!(first.files.len(), 3);
    assert_eq!(second.cache_stats.hits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_result_contents() {
    let project = sample_project();
    let result = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();

    let paths: Vec<&str> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["src/app.py", "src/util.py", "tests/test_app.py"]);
    assert!(result.files.iter().all(|f| f.content_hash().is_some()));

    let app = result.report_for("src/app.py").unwrap();
    assert_eq!(app.dependencies, vec!["os".to_string(), "src/util.py".to_string()]);
    assert_eq!(result.quality.unresolved_dependencies, 1);
    assert_eq!(result.quality.files_parsed, 3);
    assert!((result.quality.success_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(result.complexity.total_artifacts, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_corrupt_cache_falls_back_to_full_run() {
    let project = sample_project();
    let full = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();

    std::fs::write(project.cache_file(), b"{ not json").unwrap();
    let parser = ScriptedParser::new();
    let incremental = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert!(incremental.same_analysis(&full));
    assert_eq!(incremental.mode, AnalysisMode::Full);
    assert_eq!(parser.call_count(), 3);

    // the fallback rewrote a valid cache
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_version_mismatch_is_an_empty_cache() {
    let project = sample_project();
    orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();
    std::fs::write(
        project.cache_file(),
        r#"{"version": 999, "generator": "future", "entries": {}}"#,
    )
    .unwrap();

    let parser = ScriptedParser::new();
    let result = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(result.mode, AnalysisMode::Incremental);
    assert_eq!(parser.call_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_timeout_is_fatal_for_full_runs() {
    let project = Project::with_files(&[("slow.py", "hang: 400\n")]);
    let mut config = test_config();
    config.scheduler.run_timeout_ms = 50;

    let error = orchestrator(config.clone(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::RunTimeout { .. }));
    assert_eq!(error.code().as_str(), "E020");
    assert!(error.is_fatal());

    // the incremental entry point falls back, and the fallback times out too
    let error = orchestrator(config, ScriptedParser::new())
        .analyze_project_incremental(project.root())
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::RunTimeout { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_root_is_invalid() {
    let error = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(Path::new("/definitely/not/here"))
        .await
        .unwrap_err();
    assert!(matches!(error, PipelineError::InvalidRoot(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_project() {
    let project = Project::new();
    let result = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert!(result.files.is_empty());
    assert_eq!(result.count_status(OutcomeStatus::Parsed), 0);
    assert!((result.quality.success_rate - 1.0).abs() < f64::EPSILON);
}
