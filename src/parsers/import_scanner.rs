//! Line-oriented scanner producing module, function and import information for
//! the common source languages, without building a syntax tree.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeSet;

use crate::core::{Artifact, FileRecord, ParseContext, ParseOutput, Parser, Relation};

/// Lines scanned between cancellation checks
const CHECK_EVERY: usize = 256;

const NOT_FUNCTIONS: &[&str] = &["if", "while", "for", "switch", "return", "sizeof", "else"];

struct LanguageRules {
    name: &'static str,
    extensions: &'static [&'static str],
    comment: &'static str,
    import: Regex,
    function: Regex,
    branch: Regex,
}

impl LanguageRules {
    fn new(
        name: &'static str,
        extensions: &'static [&'static str],
        comment: &'static str,
        patterns: [&str; 3],
    ) -> Result<Self> {
        let compile =
            |p: &str| Regex::new(p).with_context(|| format!("invalid {name} pattern: {p}"));
        Ok(Self {
            name,
            extensions,
            comment,
            import: compile(patterns[0])?,
            function: compile(patterns[1])?,
            branch: compile(patterns[2])?,
        })
    }

    fn captured<'t>(regex: &Regex, line: &'t str) -> Option<&'t str> {
        let caps = regex.captures(line)?;
        caps.iter().skip(1).flatten().next().map(|m| m.as_str())
    }
}

struct FunctionSpan {
    name: String,
    line: usize,
    branches: u32,
}

/// Default [`Parser`] of the `deltascan` binary.
///
/// Each file yields one `module` artifact, one `function` artifact per definition,
/// `contains` relations from the module to its functions and `imports` relations
/// for every import. Complexity is one plus the number of decision points.
pub struct ImportScanner {
    languages: Vec<LanguageRules>,
}

impl ImportScanner {
    pub fn new() -> Result<Self> {
        let languages = vec![
            LanguageRules::new(
                "rust",
                &["rs"],
                "//",
                [
                    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:use|mod)\s+([A-Za-z0-9_:]+)",
                    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)",
                    r"\b(?:if|while|for|match)\b|&&|\|\|",
                ],
            )?,
            LanguageRules::new(
                "python",
                &["py", "pyi"],
                "#",
                [
                    r"^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))",
                    r"^\s*(?:async\s+)?def\s+(\w+)",
                    r"\b(?:if|elif|while|for|except|and|or)\b",
                ],
            )?,
            LanguageRules::new(
                "javascript",
                &["js", "jsx", "mjs", "cjs", "ts", "tsx"],
                "//",
                [
                    r#"(?:^\s*import\s+(?:[^'"]*?\s+from\s+)?|\brequire\(\s*|\bimport\(\s*|^\s*export\s+[^'"]*?\s+from\s+)['"]([^'"]+)['"]"#,
                    r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)|\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>",
                    r"\b(?:if|while|for|case|catch)\b|&&|\|\||\?\?",
                ],
            )?,
            LanguageRules::new(
                "c",
                &["c", "h", "cc", "cpp", "cxx", "hpp"],
                "//",
                [
                    r#"^\s*#\s*include\s*[<"]([^>"]+)[>"]"#,
                    r"^[A-Za-z_][\w\s\*&:<>,]*?\b([A-Za-z_]\w*)\s*\([^;]*$",
                    r"\b(?:if|while|for|case|catch)\b|&&|\|\|",
                ],
            )?,
            LanguageRules::new(
                "go",
                &["go"],
                "//",
                [
                    r#"^\s*(?:import\s+)?(?:[\w.]+\s+)?"([^"]+)"\s*$"#,
                    r"^func\s+(?:\([^)]*\)\s*)?(\w+)",
                    r"\b(?:if|for|case|select)\b|&&|\|\|",
                ],
            )?,
        ];
        Ok(Self { languages })
    }

    fn rules_for(&self, extension: Option<&str>) -> Option<&LanguageRules> {
        let extension = extension?;
        self.languages
            .iter()
            .find(|rules| rules.extensions.contains(&extension))
    }

    /// Scan already-loaded source text.
    pub fn scan_source(
        &self,
        file: &FileRecord,
        source: &str,
        ctx: &ParseContext,
    ) -> Result<ParseOutput> {
        let rules = self.rules_for(file.extension.as_deref());
        let module_id = format!("{}::module", file.relative_path);

        let mut imports = BTreeSet::new();
        let mut functions: Vec<FunctionSpan> = Vec::new();
        let mut module_branches = 0u32;
        let mut lines = 0usize;

        for (number, line) in source.lines().enumerate() {
            if number % CHECK_EVERY == 0 && ctx.should_stop() {
                anyhow::bail!("scan of {} stopped at line {}", file.relative_path, number + 1);
            }
            lines += 1;
            let Some(rules) = rules else {
                continue;
            };
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with(rules.comment) {
                continue;
            }

            if let Some(import) = LanguageRules::captured(&rules.import, line) {
                imports.insert(import.trim_end_matches("::*").to_string());
                continue;
            }

            if let Some(name) = LanguageRules::captured(&rules.function, line) {
                if !NOT_FUNCTIONS.contains(&name) {
                    functions.push(FunctionSpan {
                        name: name.to_string(),
                        line: number + 1,
                        branches: 0,
                    });
                    continue;
                }
            }

            let branches = rules.branch.find_iter(line).count() as u32;
            module_branches += branches;
            if let Some(current) = functions.last_mut() {
                current.branches += branches;
            }
        }

        let language = rules.map_or("text", |r| r.name);
        let mut artifacts = vec![Artifact {
            id: module_id.clone(),
            kind: "module".into(),
            name: file.name.clone(),
            file: file.relative_path.clone(),
            line: 1,
            complexity: 1 + module_branches,
            attributes: json!({
                "language": language,
                "lines": lines,
                "imports": imports.len(),
                "functions": functions.len(),
            }),
        }];
        let mut relations = Vec::with_capacity(imports.len() + functions.len());

        for function in &functions {
            let id = format!("{}::{}@{}", file.relative_path, function.name, function.line);
            relations.push(Relation {
                from: module_id.clone(),
                to: id.clone(),
                kind: "contains".into(),
            });
            artifacts.push(Artifact {
                id,
                kind: "function".into(),
                name: function.name.clone(),
                file: file.relative_path.clone(),
                line: function.line,
                complexity: 1 + function.branches,
                attributes: json!({ "language": language }),
            });
        }
        relations.extend(imports.iter().map(|import| Relation {
            from: module_id.clone(),
            to: import.clone(),
            kind: "imports".into(),
        }));

        Ok(ParseOutput {
            artifacts,
            relations,
            dependencies: imports,
        })
    }
}

impl Parser for ImportScanner {
    fn parse_file(&self, file: &FileRecord, ctx: &ParseContext) -> Result<ParseOutput> {
        let bytes = std::fs::read(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        let source = String::from_utf8_lossy(&bytes);
        self.scan_source(file, &source, ctx)
    }

    fn name(&self) -> &str {
        "import-scanner"
    }
}
