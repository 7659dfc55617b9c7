//! Reverse dependency index.
//!
//! Keys are interned into dense ids; `dependents[id]` holds the ids of files that
//! list `id` among their dependencies. The index is derived from cache entries and
//! rebuilt on load, never persisted.

use std::collections::{BTreeSet, HashMap, VecDeque};

pub type NodeId = usize;

#[derive(Debug, Default, Clone)]
pub struct DependencyIndex {
    ids: HashMap<String, NodeId>,
    names: Vec<String>,
    dependents: Vec<BTreeSet<NodeId>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, key: &str) -> NodeId {
        if let Some(&id) = self.ids.get(key) {
            return id;
        }
        let id = self.names.len();
        self.names.push(key.to_string());
        self.dependents.push(BTreeSet::new());
        self.ids.insert(key.to_string(), id);
        id
    }

    fn lookup(&self, key: &str) -> Option<NodeId> {
        self.ids.get(key).copied()
    }

    /// Replace `file`'s dependency edges, touching only the edges that changed.
    pub fn update(&mut self, file: &str, old: &BTreeSet<String>, new: &BTreeSet<String>) {
        let file_id = self.intern(file);

        for removed in old.difference(new) {
            if let Some(dep_id) = self.lookup(removed) {
                self.dependents[dep_id].remove(&file_id);
            }
        }
        for added in new.difference(old) {
            let dep_id = self.intern(added);
            self.dependents[dep_id].insert(file_id);
        }
    }

    /// Drop every edge from `file` to the given dependencies.
    pub fn remove_file(&mut self, file: &str, dependencies: &BTreeSet<String>) {
        let Some(file_id) = self.lookup(file) else {
            return;
        };
        for dep in dependencies {
            if let Some(dep_id) = self.lookup(dep) {
                self.dependents[dep_id].remove(&file_id);
            }
        }
    }

    /// Files that list `key` directly, sorted
    pub fn direct_dependents(&self, key: &str) -> Vec<&str> {
        let Some(id) = self.lookup(key) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self.dependents[id]
            .iter()
            .map(|&d| self.names[d].as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Every file that reaches `key` through dependency edges, excluding `key` itself.
    ///
    /// Breadth-first with a visited set, so cycles terminate. Output is sorted.
    pub fn transitive_dependents(&self, key: &str) -> Vec<String> {
        let Some(start) = self.lookup(key) else {
            return Vec::new();
        };

        let mut visited = vec![false; self.names.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for &dependent in &self.dependents[current] {
                if !visited[dependent] {
                    visited[dependent] = true;
                    found.push(self.names[dependent].clone());
                    queue.push_back(dependent);
                }
            }
        }

        found.sort_unstable();
        found
    }

    pub fn edge_count(&self) -> usize {
        self.dependents.iter().map(BTreeSet::len).sum()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.names.clear();
        self.dependents.clear();
    }
}
