//! Sprint mapping: walks the planning-document tree, recognizes per-sprint
//! folders, and extracts sprint windows from front-matter or inline metadata.
//!
//! Timestamps are kept exactly as received when they carry an offset. A bare
//! date is explicitly normalized to midnight UTC before anything is stored —
//! never by string concatenation.

pub mod errors;

pub use errors::{Error, Result};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One recognized sprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintRecord {
    pub number: i64,
    pub title: String,
    /// RFC3339 with offset, exactly as normalized at parse time.
    pub start: String,
    pub end: String,
    /// Repo-relative POSIX folder holding the sprint's documents.
    pub folder: String,
    /// Repo-relative POSIX paths of documents under the folder.
    pub docs: Vec<String>,
}

impl SprintRecord {
    /// Whether an RFC3339 timestamp falls inside `[start, end]`.
    pub fn contains(&self, timestamp: &str) -> bool {
        let (Ok(ts), Ok(start), Ok(end)) = (
            DateTime::parse_from_rfc3339(timestamp),
            DateTime::parse_from_rfc3339(&self.start),
            DateTime::parse_from_rfc3339(&self.end),
        ) else {
            return false;
        };
        start <= ts && ts <= end
    }
}

static SPRINT_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sprint[-_ ]?(\d+)$").unwrap());
static INLINE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s*Sprint\s+(\d+)\s*[:\-]?\s*(.*)$").unwrap());
static INLINE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\*\*start:?\*\*:?\s*([0-9T:+\-\.Z]+)").unwrap());
static INLINE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\*\*end:?\*\*:?\s*([0-9T:+\-\.Z]+)").unwrap());

/// Walk `repo_root/<docs_root>` and collect sprints from folders matching
/// `sprint-N`. Folders without parseable metadata are skipped with a warning.
pub fn discover_sprints(repo_root: &Path, docs_roots: &[String]) -> Vec<SprintRecord> {
    let mut out = Vec::new();
    for docs_root in docs_roots {
        let base = repo_root.join(docs_root);
        if !base.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&base)
            .min_depth(1)
            .max_depth(3)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(caps) = SPRINT_DIR.captures(&name) else {
                continue;
            };
            let number: i64 = caps[1].parse().unwrap_or(0);
            let folder = rel_posix(repo_root, entry.path());
            match read_sprint(entry.path(), number, &folder) {
                Ok(sprint) => out.push(sprint),
                Err(err) => warn!("sprints: skipping {folder}: {err}"),
            }
        }
    }
    out.sort_by_key(|s| s.number);
    info!("sprints: discovered {}", out.len());
    out
}

fn read_sprint(dir: &Path, number: i64, folder: &str) -> Result<SprintRecord> {
    let docs = list_docs(dir, folder);

    // Metadata comes from the folder's README/PRD (or the first markdown
    // file), front-matter first, inline markers as fallback.
    let mut meta_text = None;
    for candidate in ["README.md", "PRD.md", "prd.md", "readme.md"] {
        let p = dir.join(candidate);
        if p.is_file() {
            meta_text = fs::read_to_string(&p).ok();
            break;
        }
    }
    if meta_text.is_none() {
        meta_text = docs.first().and_then(|rel| {
            let inside = rel.strip_prefix(&format!("{folder}/"))?;
            fs::read_to_string(dir.join(inside)).ok()
        });
    }
    let text = meta_text.ok_or_else(|| Error::Metadata {
        folder: folder.to_string(),
        detail: String::from("no markdown file"),
    })?;

    let fm = front_matter(&text);
    let title = fm
        .as_ref()
        .and_then(|v| v.get("title").and_then(|t| t.as_str()).map(str::to_string))
        .or_else(|| INLINE_TITLE.captures(&text).map(|c| c[2].trim().to_string()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Sprint {number}"));

    let number = fm
        .as_ref()
        .and_then(|v| {
            v.get("sprint")
                .or_else(|| v.get("number"))
                .and_then(|n| n.as_i64())
        })
        .unwrap_or(number);

    let raw_start = fm
        .as_ref()
        .and_then(|v| yaml_string(v.get("start")))
        .or_else(|| INLINE_START.captures(&text).map(|c| c[1].to_string()))
        .ok_or_else(|| Error::Metadata {
            folder: folder.to_string(),
            detail: String::from("missing start"),
        })?;
    let raw_end = fm
        .as_ref()
        .and_then(|v| yaml_string(v.get("end")))
        .or_else(|| INLINE_END.captures(&text).map(|c| c[1].to_string()))
        .ok_or_else(|| Error::Metadata {
            folder: folder.to_string(),
            detail: String::from("missing end"),
        })?;

    let start = parse_sprint_timestamp(&raw_start)?;
    let end = parse_sprint_timestamp(&raw_end)?;

    debug!("sprints: {} {} .. {}", folder, start, end);
    Ok(SprintRecord {
        number,
        title,
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        folder: folder.to_string(),
        docs,
    })
}

/// Parse a sprint boundary. Values with an offset are taken as received; a
/// bare date or naive datetime is interpreted as UTC (midnight for dates).
pub fn parse_sprint_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim().trim_matches(['"', '\'']);
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Ok(Utc.from_utc_datetime(&midnight).fixed_offset());
    }
    Err(Error::BadTimestamp(raw.to_string()))
}

fn list_docs(dir: &Path, folder: &str) -> Vec<String> {
    let mut docs = Vec::new();
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if name.ends_with(".md") || name.ends_with(".markdown") || name.ends_with(".rst") {
                if let Ok(rel) = entry.path().strip_prefix(dir) {
                    docs.push(format!("{folder}/{}", rel.to_string_lossy().replace('\\', "/")));
                }
            }
        }
    }
    docs.sort();
    docs
}

fn front_matter(text: &str) -> Option<serde_yml::Value> {
    let rest = text.strip_prefix("---")?;
    if !rest.starts_with(['\n', '\r']) {
        return None;
    }
    let end = rest.find("\n---")?;
    serde_yml::from_str(&rest[..end]).ok()
}

/// Front-matter dates may parse as YAML dates rather than strings.
fn yaml_string(value: Option<&serde_yml::Value>) -> Option<String> {
    let value = value?;
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    serde_yml::to_string(value)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn rel_posix(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn bare_dates_become_midnight_utc() {
        let dt = parse_sprint_timestamp("2024-05-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn offsets_are_preserved_as_received() {
        let dt = parse_sprint_timestamp("2024-05-01T09:30:00+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T09:30:00+02:00");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_sprint_timestamp("next tuesday").is_err());
    }

    #[test]
    fn window_containment_compares_instants() {
        let sprint = SprintRecord {
            number: 1,
            title: String::from("Sprint 1"),
            start: String::from("2024-05-01T00:00:00+00:00"),
            end: String::from("2024-05-14T23:59:59+00:00"),
            folder: String::from("docs/sprint-1"),
            docs: vec![],
        };
        // 01:00+02:00 is 23:00 UTC the previous day: outside.
        assert!(!sprint.contains("2024-05-01T01:00:00+02:00"));
        assert!(sprint.contains("2024-05-03T12:00:00+02:00"));
    }

    #[test]
    fn discovers_front_matter_sprints() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("docs/sprints/sprint-2");
        fs::create_dir_all(&folder).unwrap();
        fs::write(
            folder.join("PRD.md"),
            "---\ntitle: Ingest pipeline\nstart: 2024-05-01\nend: 2024-05-14\n---\n# Sprint 2: Ingest pipeline\n",
        )
        .unwrap();

        let sprints = discover_sprints(dir.path(), &[String::from("docs")]);
        assert_eq!(sprints.len(), 1);
        let s = &sprints[0];
        assert_eq!(s.number, 2);
        assert_eq!(s.title, "Ingest pipeline");
        assert_eq!(s.start, "2024-05-01T00:00:00+00:00");
        assert_eq!(s.folder, "docs/sprints/sprint-2");
        assert_eq!(s.docs, vec![String::from("docs/sprints/sprint-2/PRD.md")]);
    }

    #[test]
    fn inline_metadata_is_a_fallback() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("docs/sprint-7");
        fs::create_dir_all(&folder).unwrap();
        fs::write(
            folder.join("README.md"),
            "# Sprint 7: Hardening\n\n**Start:** 2024-06-01T00:00:00+02:00\n**End:** 2024-06-14\n",
        )
        .unwrap();

        let sprints = discover_sprints(dir.path(), &[String::from("docs")]);
        assert_eq!(sprints.len(), 1);
        assert_eq!(sprints[0].title, "Hardening");
        assert_eq!(sprints[0].start, "2024-06-01T00:00:00+02:00");
        assert_eq!(sprints[0].end, "2024-06-14T00:00:00+00:00");
    }
}
