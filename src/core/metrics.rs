use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::{Artifact, FileReport, OutcomeStatus};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ComplexitySummary {
    pub total_artifacts: usize,
    pub total_complexity: u64,
    pub average_complexity: f64,
    pub max_complexity: u32,
    pub high_complexity_count: usize,
}

impl ComplexitySummary {
    pub fn from_artifacts(artifacts: &[Artifact], threshold: u32) -> Self {
        if artifacts.is_empty() {
            return Self::default();
        }

        let total: u64 = artifacts.iter().map(|a| a.complexity as u64).sum();
        Self {
            total_artifacts: artifacts.len(),
            total_complexity: total,
            average_complexity: total as f64 / artifacts.len() as f64,
            max_complexity: artifacts.iter().map(|a| a.complexity).max().unwrap_or(0),
            high_complexity_count: artifacts
                .iter()
                .filter(|a| a.complexity > threshold)
                .count(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub files_total: usize,
    pub files_parsed: usize,
    pub files_cached: usize,
    pub files_failed: usize,
    pub files_timed_out: usize,
    /// Share of files that produced a usable result, 1.0 for an empty project
    pub success_rate: f64,
    pub relations_per_file: f64,
    /// Dependencies that did not resolve to a discovered file
    pub unresolved_dependencies: usize,
    /// Groups of files that depend on each other in a cycle, sorted
    pub dependency_cycles: Vec<Vec<String>>,
}

impl QualityMetrics {
    /// Equal apart from the parsed/cached split, which depends on the run mode
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.files_total == other.files_total
            && self.files_failed == other.files_failed
            && self.files_timed_out == other.files_timed_out
            && self.success_rate == other.success_rate
            && self.relations_per_file == other.relations_per_file
            && self.unresolved_dependencies == other.unresolved_dependencies
            && self.dependency_cycles == other.dependency_cycles
    }

    pub fn from_reports(reports: &[FileReport], total_relations: usize) -> Self {
        let count = |status: OutcomeStatus| reports.iter().filter(|r| r.status == status).count();
        let files_total = reports.len();
        let files_parsed = count(OutcomeStatus::Parsed);
        let files_cached = count(OutcomeStatus::Cached);

        let known: BTreeSet<&str> = reports.iter().map(|r| r.path.as_str()).collect();
        let unresolved_dependencies = reports
            .iter()
            .flat_map(|r| r.dependencies.iter())
            .filter(|d| !known.contains(d.as_str()))
            .count();

        let (success_rate, relations_per_file) = if files_total == 0 {
            (1.0, 0.0)
        } else {
            (
                (files_parsed + files_cached) as f64 / files_total as f64,
                total_relations as f64 / files_total as f64,
            )
        };

        Self {
            files_total,
            files_parsed,
            files_cached,
            files_failed: count(OutcomeStatus::Failed),
            files_timed_out: count(OutcomeStatus::TimedOut),
            success_rate,
            relations_per_file,
            unresolved_dependencies,
            dependency_cycles: find_dependency_cycles(reports),
        }
    }
}

/// Build the resolved file dependency graph as a petgraph DiGraph
fn build_petgraph(reports: &[FileReport]) -> (DiGraph<&str, ()>, HashMap<&str, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut node_map = HashMap::new();

    for report in reports {
        let node = graph.add_node(report.path.as_str());
        node_map.insert(report.path.as_str(), node);
    }

    for report in reports {
        let from = node_map[report.path.as_str()];
        for dep in &report.dependencies {
            if let Some(&to) = node_map.get(dep.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }

    (graph, node_map)
}

/// Strongly connected components with more than one file, or a file importing itself
pub fn find_dependency_cycles(reports: &[FileReport]) -> Vec<Vec<String>> {
    let (graph, _) = build_petgraph(reports);

    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.contains_edge(n, n))
        })
        .map(|component| {
            let mut files: Vec<String> = component.iter().map(|&n| graph[n].to_string()).collect();
            files.sort();
            files
        })
        .collect();
    cycles.sort();
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(complexity: u32) -> Artifact {
        Artifact {
            id: format!("a{complexity}"),
            kind: "function".into(),
            name: "f".into(),
            file: "a.rs".into(),
            line: 1,
            complexity,
            attributes: serde_json::Value::Null,
        }
    }

    fn report(path: &str, status: OutcomeStatus, deps: &[&str]) -> FileReport {
        FileReport {
            path: path.into(),
            status,
            elapsed_ms: 0,
            artifacts: 0,
            relations: 0,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            error: None,
            error_code: None,
        }
    }

    #[test]
    fn test_same_outcome_ignores_parsed_cached_split() {
        let util = report("b.py", OutcomeStatus::Parsed, &[]);
        let cached_util = report("b.py", OutcomeStatus::Cached, &[]);
        let resolved = report("a.py", OutcomeStatus::Parsed, &["b.py"]);
        let raw = report("a.py", OutcomeStatus::Parsed, &["b"]);

        let full = QualityMetrics::from_reports(&[resolved.clone(), util], 0);
        let incremental = QualityMetrics::from_reports(&[resolved, cached_util.clone()], 0);
        let unresolved = QualityMetrics::from_reports(&[raw, cached_util], 0);

        assert!(full.same_outcome(&incremental));
        assert!(!full.same_outcome(&unresolved));
    }

    #[test]
    fn test_complexity_summary() {
        let summary =
            ComplexitySummary::from_artifacts(&[artifact(2), artifact(12), artifact(4)], 10);
        assert_eq!(summary.total_artifacts, 3);
        assert_eq!(summary.total_complexity, 18);
        assert_eq!(summary.max_complexity, 12);
        assert_eq!(summary.high_complexity_count, 1);
        assert!((summary.average_complexity - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            ComplexitySummary::from_artifacts(&[], 10),
            ComplexitySummary::default()
        );
    }

    #[test]
    fn test_quality_counts_and_cycles() {
        let reports = vec![
            report("a.py", OutcomeStatus::Parsed, &["b.py"]),
            report("b.py", OutcomeStatus::Cached, &["a.py", "os"]),
            report("c.py", OutcomeStatus::Failed, &[]),
            report("d.py", OutcomeStatus::TimedOut, &["d.py"]),
        ];
        let quality = QualityMetrics::from_reports(&reports, 8);

        assert_eq!(quality.files_total, 4);
        assert_eq!(quality.files_failed, 1);
        assert_eq!(quality.files_timed_out, 1);
        assert!((quality.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((quality.relations_per_file - 2.0).abs() < f64::EPSILON);
        assert_eq!(quality.unresolved_dependencies, 1);
        assert_eq!(
            quality.dependency_cycles,
            vec![
                vec!["a.py".to_string(), "b.py".to_string()],
                vec!["d.py".to_string()]
            ]
        );
    }
}
