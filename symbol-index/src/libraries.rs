//! Library seeding and canonicalization.
//!
//! Two sources converge on one `Library` per slug: declared dependencies from
//! manifests (requirements-style, package.json-style) and modules discovered
//! in import statements. The slug is the canonical form of *any* known alias,
//! so `scikit-learn` in a manifest and `sklearn` in an import merge.

use crate::errors::{Error, Result};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibrarySource {
    Manifest,
    Discovered,
}

impl LibrarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibrarySource::Manifest => "manifest",
            LibrarySource::Discovered => "discovered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRecord {
    /// Canonical lowercased identifier (the Library node key).
    pub slug: String,
    pub display_name: String,
    /// "py" | "js".
    pub ecosystem: String,
    pub version: Option<String>,
    pub source: LibrarySource,
    pub aliases: BTreeSet<String>,
}

impl LibraryRecord {
    fn new(declared: &str, ecosystem: &str, version: Option<String>, source: LibrarySource) -> Self {
        let slug = slugify(declared);
        let mut aliases = BTreeSet::new();
        aliases.insert(declared.to_string());
        aliases.insert(slug.clone());
        for alias in known_aliases(&slug) {
            aliases.insert(alias);
        }
        Self {
            slug,
            display_name: declared.to_string(),
            ecosystem: ecosystem.to_string(),
            version,
            source,
            aliases,
        }
    }
}

/// Canonical slug: lowercase, underscores and dots collapsed to dashes,
/// repeats squeezed. Scoped npm names keep the `@scope/name` shape.
pub fn slugify(name: &str) -> String {
    let trimmed = name.trim();
    let (scope, rest) = match trimmed.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, rest)) => (Some(scope.to_ascii_lowercase()), rest),
            None => (None, trimmed),
        },
        None => (None, trimmed),
    };

    let mut out = String::with_capacity(rest.len());
    let mut last_dash = false;
    for ch in rest.chars() {
        let mapped = match ch {
            '_' | '.' | '-' => '-',
            c => c.to_ascii_lowercase(),
        };
        if mapped == '-' {
            if !last_dash && !out.is_empty() {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.push(mapped);
            last_dash = false;
        }
    }
    let core = out.trim_end_matches('-').to_string();
    match scope {
        Some(scope) => format!("@{scope}/{core}"),
        None => core,
    }
}

/// Curated cross-ecosystem alias seed: canonical slug -> import names (and
/// back). The mechanism is generic; this table is just the data.
static ALIAS_SEED: &[(&str, &[&str])] = &[
    ("scikit-learn", &["sklearn"]),
    ("pillow", &["PIL"]),
    ("beautifulsoup4", &["bs4"]),
    ("opencv-python", &["cv2"]),
    ("pyyaml", &["yaml"]),
    ("python-dateutil", &["dateutil"]),
    ("typescript", &["ts"]),
];

static ALIAS_LOOKUP: LazyLock<BTreeMap<String, String>> = LazyLock::new(|| {
    let mut map = BTreeMap::new();
    for (slug, aliases) in ALIAS_SEED {
        for alias in *aliases {
            map.insert(slugify(alias), (*slug).to_string());
        }
    }
    map
});

fn known_aliases(slug: &str) -> Vec<String> {
    ALIAS_SEED
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, aliases)| aliases.iter().map(|a| (*a).to_string()).collect())
        .unwrap_or_default()
}

/// Map an imported module name to its canonical library slug.
pub fn module_to_slug(module: &str) -> String {
    let top = module.split(['.', '/']).next().unwrap_or(module);
    let slug = slugify(top);
    ALIAS_LOOKUP.get(&slug).cloned().unwrap_or(slug)
}

/// Parse a requirements-style manifest. Comment and option lines are skipped;
/// any other unparseable line fails the whole manifest (the caller skips it
/// and counts one error).
pub fn parse_requirements(path: &str, text: &str) -> Result<Vec<LibraryRecord>> {
    static LINE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"^(?P<name>[A-Za-z0-9][A-Za-z0-9._-]*)(?:\[[^\]]*\])?\s*(?:(?:==|>=|<=|~=|!=|===|>|<)\s*(?P<version>[^;,#\s]+))?",
        )
        .expect("requirements line regex is valid")
    });

    let mut out = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('-') {
            // blank, comment-only, or pip option (-r, -e, --hash, ...)
            continue;
        }
        let caps = LINE.captures(line).ok_or_else(|| Error::ManifestMalformed {
            path: path.to_string(),
            detail: format!("line {}: {raw:?}", lineno + 1),
        })?;
        // A match that consumed nothing meaningful is still malformed.
        let name = caps.name("name").map(|m| m.as_str()).unwrap_or("");
        if name.is_empty() {
            return Err(Error::ManifestMalformed {
                path: path.to_string(),
                detail: format!("line {}: {raw:?}", lineno + 1),
            });
        }
        let version = caps.name("version").map(|m| m.as_str().to_string());
        out.push(LibraryRecord::new(name, "py", version, LibrarySource::Manifest));
    }
    debug!("libraries: {} -> {} requirement(s)", path, out.len());
    Ok(out)
}

/// Parse a package.json-style manifest across all dependency sections.
pub fn parse_package_json(path: &str, text: &str) -> Result<Vec<LibraryRecord>> {
    let doc: Value = serde_json::from_str(text).map_err(|e| Error::ManifestMalformed {
        path: path.to_string(),
        detail: e.to_string(),
    })?;

    let mut out = Vec::new();
    for section in [
        "dependencies",
        "devDependencies",
        "peerDependencies",
        "optionalDependencies",
    ] {
        let Some(deps) = doc.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, version) in deps {
            out.push(LibraryRecord::new(
                name,
                "js",
                version.as_str().map(|v| v.trim_start_matches(['^', '~']).to_string()),
                LibrarySource::Manifest,
            ));
        }
    }
    debug!("libraries: {} -> {} package(s)", path, out.len());
    Ok(out)
}

/// A library discovered through an import rather than a manifest.
pub fn discovered(module: &str, ecosystem: &str) -> LibraryRecord {
    let slug = module_to_slug(module);
    let mut rec = LibraryRecord::new(&slug, ecosystem, None, LibrarySource::Discovered);
    rec.aliases.insert(module.to_string());
    rec
}

/// Merge by slug: manifest data wins over discovered, aliases union.
pub fn merge_by_slug(records: Vec<LibraryRecord>) -> Vec<LibraryRecord> {
    let mut merged: BTreeMap<String, LibraryRecord> = BTreeMap::new();
    for rec in records {
        match merged.get_mut(&rec.slug) {
            None => {
                merged.insert(rec.slug.clone(), rec);
            }
            Some(existing) => {
                existing.aliases.extend(rec.aliases.iter().cloned());
                let manifest_wins = rec.source == LibrarySource::Manifest
                    && existing.source == LibrarySource::Discovered;
                if manifest_wins {
                    existing.display_name = rec.display_name;
                    existing.source = LibrarySource::Manifest;
                }
                if existing.version.is_none() {
                    existing.version = rec.version;
                }
            }
        }
    }
    merged.into_values().collect()
}

/// Is this path a dependency manifest we know how to parse?
pub fn manifest_kind(path: &str) -> Option<&'static str> {
    let name = path.rsplit('/').next().unwrap_or(path).to_ascii_lowercase();
    if name == "package.json" {
        Some("js")
    } else if name.starts_with("requirements") && name.ends_with(".txt") {
        Some("py")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_separators() {
        assert_eq!(slugify("Scikit_Learn"), "scikit-learn");
        assert_eq!(slugify("foo__bar..baz"), "foo-bar-baz");
        assert_eq!(slugify("@Types/Node"), "@types/node");
    }

    #[test]
    fn manifest_and_import_share_one_slug() {
        let declared = parse_requirements("requirements.txt", "scikit-learn==1.4.0\n").unwrap();
        let imported = discovered("sklearn", "py");
        let merged = merge_by_slug(declared.into_iter().chain([imported]).collect());
        assert_eq!(merged.len(), 1);
        let lib = &merged[0];
        assert_eq!(lib.slug, "scikit-learn");
        assert_eq!(lib.source, LibrarySource::Manifest);
        assert_eq!(lib.version.as_deref(), Some("1.4.0"));
        assert!(lib.aliases.contains("sklearn"));
    }

    #[test]
    fn requirements_skips_comments_and_options() {
        let text = "# pinned\nrequests==2.32.0\n-r base.txt\n\nnumpy>=1.26  # math\n";
        let libs = parse_requirements("requirements.txt", text).unwrap();
        let slugs: Vec<_> = libs.iter().map(|l| l.slug.as_str()).collect();
        assert_eq!(slugs, vec!["requests", "numpy"]);
        assert_eq!(libs[1].version.as_deref(), Some("1.26"));
    }

    #[test]
    fn broken_requirements_line_fails_the_manifest() {
        let err = parse_requirements("requirements.txt", "requests\n===broken===\n").unwrap_err();
        assert!(matches!(err, Error::ManifestMalformed { .. }));
    }

    #[test]
    fn package_json_covers_all_sections() {
        let text = r#"{
            "name": "app",
            "dependencies": {"react": "^18.2.0", "@types/node": "~20.0.0"},
            "devDependencies": {"vitest": "1.0.0"}
        }"#;
        let libs = parse_package_json("package.json", text).unwrap();
        let mut slugs: Vec<_> = libs.iter().map(|l| l.slug.as_str()).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["@types/node", "react", "vitest"]);
        let react = libs.iter().find(|l| l.slug == "react").unwrap();
        assert_eq!(react.version.as_deref(), Some("18.2.0"));
    }

    #[test]
    fn module_mapping_uses_alias_table() {
        assert_eq!(module_to_slug("sklearn.linear_model"), "scikit-learn");
        assert_eq!(module_to_slug("yaml"), "pyyaml");
        assert_eq!(module_to_slug("requests"), "requests");
    }

    #[test]
    fn manifest_detection() {
        assert_eq!(manifest_kind("requirements.txt"), Some("py"));
        assert_eq!(manifest_kind("app/requirements-dev.txt"), Some("py"));
        assert_eq!(manifest_kind("web/package.json"), Some("js"));
        assert_eq!(manifest_kind("Cargo.toml"), None);
    }
}
