//! Import discovery and repo-internal resolution.
//!
//! Python `import`/`from … import`, JS/TS static imports, `require(...)` and
//! dynamic `import(...)` are scraped per file. Relative specifiers that
//! resolve to a file in the inventory become file-to-file edges; everything
//! else is an external module handed to library canonicalization.

use crate::types::LanguageKind;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Where an import points.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTarget {
    /// Repo-relative POSIX path of another inventory file.
    Internal(String),
    /// External module name as written (canonicalized later).
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Importing file.
    pub file: String,
    pub target: ImportTarget,
}

static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+([\w\.]+(?:\s*,\s*[\w\.]+)*)").unwrap());
static PY_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+(\.*[\w\.]*)\s+import\s+").unwrap());
static JS_STATIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\s[^;\n]*?from\s+['"]([^'"]+)['"]"#).unwrap()
});
static JS_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap());
static JS_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Scrape the import specifiers of one file.
pub fn discover(lang: LanguageKind, file: &str, source: &str, repo_files: &BTreeSet<String>) -> Vec<ImportRecord> {
    let mut records = Vec::new();
    let mut seen = BTreeSet::new();

    let mut push = |target: ImportTarget| {
        if let ImportTarget::External(module) = &target {
            // A fully-relative `from .. import x` that resolved nowhere.
            if module.is_empty() {
                return;
            }
        }
        if seen.insert(target.clone()) {
            records.push(ImportRecord {
                file: file.to_string(),
                target,
            });
        }
    };

    match lang {
        LanguageKind::Python => {
            for caps in PY_IMPORT.captures_iter(source) {
                for module in caps[1].split(',') {
                    let module = module.trim().split_whitespace().next().unwrap_or("");
                    if !module.is_empty() {
                        push(resolve_python(file, module, repo_files));
                    }
                }
            }
            for caps in PY_FROM.captures_iter(source) {
                let module = caps[1].trim();
                if !module.is_empty() {
                    push(resolve_python(file, module, repo_files));
                }
            }
        }
        LanguageKind::Typescript | LanguageKind::Javascript => {
            for re in [&*JS_STATIC, &*JS_BARE, &*JS_CALL] {
                for caps in re.captures_iter(source) {
                    push(resolve_js(file, &caps[1], repo_files));
                }
            }
        }
        // Symbol extraction covers the remaining languages; their module
        // systems have no counterpart in the py/js manifest ecosystems.
        LanguageKind::Rust | LanguageKind::Go | LanguageKind::Java => {}
    }

    records
}

/// Resolve a Python module against the repository layout: absolute modules
/// from the repo root, relative modules (leading dots) from the importing
/// file's package.
fn resolve_python(file: &str, module: &str, repo_files: &BTreeSet<String>) -> ImportTarget {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = &module[dots..];

    let base_parts: Vec<String> = if dots == 0 {
        Vec::new()
    } else {
        let dir = parent_dir(file);
        let mut parts: Vec<String> = dir.split('/').filter(|s| !s.is_empty()).map(String::from).collect();
        for _ in 1..dots {
            parts.pop();
        }
        parts
    };

    let mut parts = base_parts;
    parts.extend(rest.split('.').filter(|s| !s.is_empty()).map(String::from));
    let joined = parts.join("/");

    for candidate in [format!("{joined}.py"), format!("{joined}/__init__.py")] {
        if repo_files.contains(&candidate) {
            return ImportTarget::Internal(candidate);
        }
    }
    ImportTarget::External(rest.to_string())
}

/// Resolve a JS/TS specifier: relative paths try the usual extension and
/// index fallbacks; bare specifiers are packages.
fn resolve_js(file: &str, spec: &str, repo_files: &BTreeSet<String>) -> ImportTarget {
    if !spec.starts_with('.') {
        // Bare specifier: keep scoped prefix, drop subpaths (`lodash/fp`).
        let package = match spec.strip_prefix('@') {
            Some(_) => spec.splitn(3, '/').take(2).collect::<Vec<_>>().join("/"),
            None => spec.split('/').next().unwrap_or(spec).to_string(),
        };
        return ImportTarget::External(package);
    }

    let joined = join_relative(&parent_dir(file), spec);
    if repo_files.contains(&joined) {
        return ImportTarget::Internal(joined);
    }
    for ext in ["ts", "tsx", "js", "jsx"] {
        let with_ext = format!("{joined}.{ext}");
        if repo_files.contains(&with_ext) {
            return ImportTarget::Internal(with_ext);
        }
    }
    for ext in ["ts", "tsx", "js", "jsx"] {
        let index = format!("{joined}/index.{ext}");
        if repo_files.contains(&index) {
            return ImportTarget::Internal(index);
        }
    }
    // Unresolvable relative import: treat as external so it is still visible.
    ImportTarget::External(spec.to_string())
}

fn parent_dir(file: &str) -> String {
    match file.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

fn join_relative(base: &str, spec: &str) -> String {
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in spec.split('/') {
        match seg {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn python_internal_and_external() {
        let repo = files(&["pkg/util.py", "pkg/sub/__init__.py", "app.py"]);
        let src = "import os\nimport pkg.util\nfrom pkg.sub import thing\nfrom sklearn import svm\n";
        let records = discover(LanguageKind::Python, "app.py", src, &repo);
        assert!(records.contains(&ImportRecord {
            file: String::from("app.py"),
            target: ImportTarget::Internal(String::from("pkg/util.py")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("app.py"),
            target: ImportTarget::Internal(String::from("pkg/sub/__init__.py")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("app.py"),
            target: ImportTarget::External(String::from("os")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("app.py"),
            target: ImportTarget::External(String::from("sklearn")),
        }));
    }

    #[test]
    fn python_relative_imports() {
        let repo = files(&["pkg/a.py", "pkg/b.py", "pkg/inner/c.py"]);
        let records = discover(
            LanguageKind::Python,
            "pkg/inner/c.py",
            "from .. import a\nfrom ..b import thing\n",
            &repo,
        );
        assert!(records.contains(&ImportRecord {
            file: String::from("pkg/inner/c.py"),
            target: ImportTarget::Internal(String::from("pkg/b.py")),
        }));
    }

    #[test]
    fn js_specifiers() {
        let repo = files(&["src/app.ts", "src/lib/db.ts", "src/lib/index.ts"]);
        let src = "import { q } from './lib/db';\nimport * as lib from './lib';\nimport React from 'react';\nconst _ = require('lodash/fp');\nconst lazy = await import('@scope/pkg/deep');\n";
        let records = discover(LanguageKind::Typescript, "src/app.ts", src, &repo);
        assert!(records.contains(&ImportRecord {
            file: String::from("src/app.ts"),
            target: ImportTarget::Internal(String::from("src/lib/db.ts")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("src/app.ts"),
            target: ImportTarget::Internal(String::from("src/lib/index.ts")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("src/app.ts"),
            target: ImportTarget::External(String::from("react")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("src/app.ts"),
            target: ImportTarget::External(String::from("lodash")),
        }));
        assert!(records.contains(&ImportRecord {
            file: String::from("src/app.ts"),
            target: ImportTarget::External(String::from("@scope/pkg")),
        }));
    }

    #[test]
    fn duplicates_are_collapsed() {
        let repo = files(&[]);
        let src = "import os\nimport os\n";
        let records = discover(LanguageKind::Python, "a.py", src, &repo);
        assert_eq!(records.len(), 1);
    }
}
