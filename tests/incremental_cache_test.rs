mod common;

use common::{orchestrator, test_config, Project, ScriptedParser};
use deltascan::core::OutcomeStatus;
use pretty_assertions::assert_eq;

fn chain_project() -> Project {
    // a <- b <- c, d unrelated
    Project::with_files(&[
        ("a.py", "print('a')\n"),
        ("b.py", "dep: a.py\n"),
        ("c.py", "dep: b.py\n"),
        ("d.py", "print('d')\n"),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unchanged_project_is_served_from_cache() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    let first = orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();
    assert_eq!(parser.call_count(), 4);
    assert!(project.cache_file().exists());

    parser.reset();
    let second = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert_eq!(parser.call_count(), 0);
    assert_eq!(second.count_status(OutcomeStatus::Cached), 4);
    assert_eq!(second.cache_stats.hits, 4);
    assert_eq!(second.cache_stats.misses, 0);
    assert!((second.cache_stats.hit_rate - 1.0).abs() < f64::EPSILON);
    assert!(first.same_analysis(&second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_change_cascades_to_transitive_dependents_only() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    project.touch("a.py");
    parser.reset();
    let result = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert_eq!(parser.parsed(), vec!["a.py", "b.py", "c.py"]);
    assert_eq!(result.report_for("d.py").unwrap().status, OutcomeStatus::Cached);
    assert_eq!(result.cache_stats.invalidated, 2);
    assert_eq!(result.cache_stats.hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependent_sorting_before_its_dependency_is_reparsed() {
    let project = Project::with_files(&[
        ("a.py", "dep: z.py\n"),
        ("m.py", "print('m')\n"),
        ("z.py", "print('z')\n"),
    ]);
    let mut config = test_config();
    config.scheduler.max_concurrent_files = 1;
    let parser = ScriptedParser::new();
    orchestrator(config.clone(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    project.touch("z.py");
    parser.reset();
    orchestrator(config, parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert_eq!(parser.parsed(), vec!["a.py", "z.py"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependency_cycle_terminates_and_is_reported() {
    let project = Project::with_files(&[
        ("a.py", "dep: b.py\n"),
        ("b.py", "dep: a.py\n"),
        ("c.py", "print('c')\n"),
    ]);
    let parser = ScriptedParser::new();
    let first = orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();
    assert_eq!(
        first.quality.dependency_cycles,
        vec![vec!["a.py".to_string(), "b.py".to_string()]]
    );

    project.touch("a.py");
    parser.reset();
    let second = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert_eq!(parser.parsed(), vec!["a.py", "b.py"]);
    assert_eq!(second.report_for("c.py").unwrap().status, OutcomeStatus::Cached);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deleted_file_invalidates_dependents() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    project.remove("a.py");
    parser.reset();
    let result = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();

    assert_eq!(parser.parsed(), vec!["b.py", "c.py"]);
    assert!(result.report_for("a.py").is_none());
    // a.py no longer resolves, so b.py keeps the raw identifier
    assert_eq!(result.quality.unresolved_dependencies, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_reparse_drops_stale_entry() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    project.write("d.py", "fail\n");
    let failed = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(failed.report_for("d.py").unwrap().status, OutcomeStatus::Failed);

    // the file is not cached, so the next run tries it again
    parser.reset();
    orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.parsed(), vec!["d.py"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_entries_are_reparsed() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    // age every entry past the expiry
    let raw = std::fs::read_to_string(project.cache_file()).unwrap();
    let mut document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for entry in document["entries"].as_object_mut().unwrap().values_mut() {
        entry["cached_at"] = serde_json::json!("2000-01-01T00:00:00Z");
    }
    std::fs::write(project.cache_file(), document.to_string()).unwrap();

    parser.reset();
    let result = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.call_count(), 4);
    assert_eq!(result.cache_stats.hits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compressed_cache_round_trips() {
    let project = chain_project();
    let mut config = test_config();
    config.cache.compression_enabled = true;
    let parser = ScriptedParser::new();
    orchestrator(config.clone(), parser.clone())
        .analyze_project(project.root())
        .await
        .unwrap();

    let bytes = std::fs::read(project.cache_file()).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    parser.reset();
    let result = orchestrator(config, parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.call_count(), 0);
    assert_eq!(result.cache_stats.hits, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_disabled_cache_is_never_written() {
    let project = chain_project();
    let mut config = test_config();
    config.cache.enabled = false;
    let parser = ScriptedParser::new();
    let o = orchestrator(config, parser.clone());

    o.analyze_project(project.root()).await.unwrap();
    parser.reset();
    let result = o.analyze_project_incremental(project.root()).await.unwrap();

    assert!(!project.cache_file().exists());
    assert_eq!(parser.call_count(), 4);
    assert_eq!(result.cache_stats.hits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_orchestrator_reuses_cache_across_runs() {
    let project = chain_project();
    let parser = ScriptedParser::new();
    let o = orchestrator(test_config(), parser.clone());

    o.analyze_project(project.root()).await.unwrap();
    project.touch("c.py");
    parser.reset();
    o.analyze_project_incremental(project.root()).await.unwrap();

    assert_eq!(parser.parsed(), vec!["c.py"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_added_file_binds_earlier_unresolved_import() {
    let project = Project::with_files(&[("a.py", "dep: util\n"), ("b.py", "print('b')\n")]);
    let first = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();
    assert_eq!(first.report_for("a.py").unwrap().dependencies, vec!["util"]);

    project.write("util.py", "print('util')\n");
    let parser = ScriptedParser::new();
    let incremental = orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.parsed(), vec!["a.py", "util.py"]);
    assert_eq!(incremental.report_for("a.py").unwrap().dependencies, vec!["util.py"]);
    assert_eq!(incremental.quality.unresolved_dependencies, 0);

    let full = orchestrator(test_config(), ScriptedParser::new())
        .analyze_project(project.root())
        .await
        .unwrap();
    assert!(incremental.same_analysis(&full));
    assert!(!first.same_analysis(&full));

    // editing the new file now reaches its importer
    project.touch("util.py");
    let parser = ScriptedParser::new();
    orchestrator(test_config(), parser.clone())
        .analyze_project_incremental(project.root())
        .await
        .unwrap();
    assert_eq!(parser.parsed(), vec!["a.py", "util.py"]);
}
