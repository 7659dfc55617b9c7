//! Maps raw dependency identifiers reported by a parser onto discovered files.

use std::collections::{BTreeSet, HashSet};

use crate::io::normalize_key;

const MODULE_PREFIXES: &[&str] = &["crate::", "self::", "::"];

const PACKAGE_ENTRIES: &[&str] = &["mod", "__init__", "index"];

pub struct DependencyResolver {
    known: HashSet<String>,
}

impl DependencyResolver {
    pub fn new<'a>(known: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            known: known.into_iter().map(str::to_string).collect(),
        }
    }

    fn find(&self, candidate: &str) -> Option<String> {
        let normalized = normalize_key(candidate)?;
        self.known.contains(&normalized).then_some(normalized)
    }

    /// Resolve one raw identifier for `file`, or return it unchanged.
    ///
    /// Tried in order: the identifier as a project path, a path relative to the
    /// file's directory (also with the file's extension), then a module path using
    /// `::` or `.` separators, from the longest prefix down.
    pub fn resolve(&self, file: &str, raw: &str) -> String {
        let raw = raw.trim();
        let (dir, extension) = split_file(file);

        if let Some(hit) = self.find(raw) {
            return hit;
        }

        let relative = join(dir, raw);
        if let Some(hit) = self.find(&relative) {
            return hit;
        }
        if let Some(ext) = extension {
            if let Some(hit) = self
                .find(&format!("{relative}.{ext}"))
                .or_else(|| self.find(&format!("{raw}.{ext}")))
            {
                return hit;
            }
            if let Some(hit) = self.resolve_module_path(dir, raw, ext) {
                return hit;
            }
        }

        raw.to_string()
    }

    fn resolve_module_path(&self, dir: &str, raw: &str, ext: &str) -> Option<String> {
        if raw.contains('/') {
            return None;
        }
        let stripped = MODULE_PREFIXES
            .iter()
            .find_map(|p| raw.strip_prefix(p))
            .unwrap_or(raw);
        let segments: Vec<&str> = stripped
            .split("::")
            .flat_map(|s| s.split('.'))
            .filter(|s| !s.is_empty())
            .collect();

        for len in (1..=segments.len()).rev() {
            let path = segments[..len].join("/");
            let mut candidates = vec![
                format!("{path}.{ext}"),
                join(dir, &format!("{path}.{ext}")),
                format!("src/{path}.{ext}"),
            ];
            for entry in PACKAGE_ENTRIES {
                candidates.push(format!("{path}/{entry}.{ext}"));
                candidates.push(format!("src/{path}/{entry}.{ext}"));
            }
            if let Some(hit) = candidates.iter().find_map(|c| self.find(c)) {
                return Some(hit);
            }
        }
        None
    }

    pub fn resolve_all(&self, file: &str, raw: &BTreeSet<String>) -> BTreeSet<String> {
        raw.iter()
            .map(|r| self.resolve(file, r))
            .filter(|r| r != file)
            .collect()
    }
}

fn split_file(file: &str) -> (&str, Option<&str>) {
    let (dir, name) = file.rsplit_once('/').unwrap_or(("", file));
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty());
    (dir, extension)
}

fn join(dir: &str, raw: &str) -> String {
    if dir.is_empty() {
        raw.to_string()
    } else {
        format!("{dir}/{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DependencyResolver {
        DependencyResolver::new([
            "src/lib.rs",
            "src/cache/mod.rs",
            "src/cache/store.rs",
            "web/app.js",
            "web/util.js",
            "pkg/__init__.py",
            "pkg/models.py",
            "native/buf.h",
        ])
    }

    #[test]
    fn test_exact_and_relative() {
        let r = resolver();
        assert_eq!(r.resolve("web/app.js", "web/util.js"), "web/util.js");
        assert_eq!(r.resolve("web/app.js", "./util"), "web/util.js");
        assert_eq!(r.resolve("native/buf.c", "buf.h"), "native/buf.h");
        assert_eq!(r.resolve("src/cache/mod.rs", "store"), "src/cache/store.rs");
    }

    #[test]
    fn test_module_paths() {
        let r = resolver();
        assert_eq!(
            r.resolve("src/lib.rs", "crate::cache::store::CacheStore"),
            "src/cache/store.rs"
        );
        assert_eq!(r.resolve("src/lib.rs", "crate::cache"), "src/cache/mod.rs");
        assert_eq!(r.resolve("main.py", "pkg.models"), "pkg/models.py");
        assert_eq!(r.resolve("main.py", "pkg"), "pkg/__init__.py");
    }

    #[test]
    fn test_unresolved_kept_raw() {
        let r = resolver();
        assert_eq!(r.resolve("main.py", "os.path"), "os.path");
        assert_eq!(r.resolve("web/app.js", "react"), "react");
    }

    #[test]
    fn test_resolve_all_drops_self_reference() {
        let r = resolver();
        let raw: BTreeSet<String> = ["./app", "./util"].iter().map(|s| s.to_string()).collect();
        let resolved = r.resolve_all("web/app.js", &raw);
        assert_eq!(resolved, BTreeSet::from(["web/util.js".to_string()]));
    }
}
