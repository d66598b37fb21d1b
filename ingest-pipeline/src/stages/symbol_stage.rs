//! Stage 4: Symbol nodes, library seeding and the imports graph.

use crate::context::{RunArtifacts, RunContext};
use crate::errors::Result;
use crate::stages::now_iso;
use crate::telemetry::{StageId, StageTelemetry};

use graph_store::{EdgeSpec, EdgeType, GraphStore, NodeLabel};
use repo_scan::{FileKind, Profile};
use serde_json::{Value, json};
use symbol_index::{
    ImportRecord, ImportTarget, LanguageKind, SymbolRecord, discover, manifest_kind,
    merge_by_slug, module_to_slug, parse_package_json, parse_requirements, parse_symbols,
};
use tracing::info;

pub async fn run(
    ctx: &RunContext,
    store: &GraphStore,
    artifacts: &mut RunArtifacts,
) -> Result<StageTelemetry> {
    let mut t = StageTelemetry::begin(StageId::Symbols);

    let (inventory, plan) = match (&artifacts.inventory, &artifacts.plan) {
        (Some(i), Some(p)) => (i, p),
        _ => {
            t.record_error("missing_input", "-", "scan stage did not run");
            return Ok(t.finish());
        }
    };

    // The quick profile skips chunking, so symbols are parsed here instead.
    if artifacts.symbols.is_empty() && ctx.profile == Profile::Quick {
        for path in plan.files_to_process() {
            let Some(f) = inventory.get(path) else { continue };
            if f.kind != FileKind::Code {
                continue;
            }
            let (Some(lang), Some(text)) = (LanguageKind::from_path(&f.path), f.text.as_ref())
            else {
                continue;
            };
            match parse_symbols(lang, &f.path, text) {
                Ok(symbols) => artifacts.symbols.extend(symbols),
                Err(err) => t.record_error("parse", &f.path, err),
            }
        }
    }

    let created_at = now_iso();

    // Modified files re-declare their symbols; retire the previous set first
    // so renames never leave duplicates behind.
    let stale: Vec<Value> = plan.modified.iter().map(|p| json!(p)).collect();
    if !stale.is_empty() {
        store
            .run(
                "UNWIND $paths AS p \
                 MATCH (s:Symbol)-[:DEFINED_IN]->(:File {path: p}) \
                 DETACH DELETE s",
                vec![("paths", Value::Array(stale.clone()))],
            )
            .await?;
        store
            .run(
                "UNWIND $paths AS p \
                 MATCH (:File {path: p})-[r:IMPORTS|USES_LIBRARY]->() \
                 DELETE r",
                vec![("paths", Value::Array(stale))],
            )
            .await?;
    }

    // Symbol nodes + DEFINED_IN.
    let mut symbols_written = 0usize;
    for batch in artifacts.symbols.chunks(ctx.cfg.chunk_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        let rows: Vec<Value> = batch.iter().map(|s| symbol_row(s, &created_at)).collect();
        store.batch_upsert_nodes(NodeLabel::Symbol, &rows).await?;

        let defined: Vec<Value> = batch
            .iter()
            .map(|s| {
                json!({"from": s.uid, "to": s.file, "props": {"created_at": created_at}})
            })
            .collect();
        symbols_written += store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::DefinedIn, NodeLabel::Symbol, NodeLabel::File),
                &defined,
            )
            .await?;
    }
    t.set("symbols_created", symbols_written as i64);

    // Library seeding from dependency manifests (all of them; parsing is
    // cheap and unchanged manifests merge idempotently).
    let mut libraries = Vec::new();
    for f in &inventory.files {
        let Some(ecosystem) = manifest_kind(&f.path) else {
            continue;
        };
        let Some(text) = f.text.as_ref() else { continue };
        let parsed = match ecosystem {
            "py" => parse_requirements(&f.path, text),
            _ => parse_package_json(&f.path, text),
        };
        match parsed {
            Ok(libs) => libraries.extend(libs),
            Err(err) => t.record_error("manifest_malformed", &f.path, err),
        }
    }
    let manifest_count = libraries.len();

    // Import discovery over the processed code files.
    let mut imports: Vec<ImportRecord> = Vec::new();
    let repo_files = inventory.path_set();
    for path in plan.files_to_process() {
        let Some(f) = inventory.get(path) else { continue };
        if f.kind != FileKind::Code {
            continue;
        }
        let (Some(lang), Some(text)) = (LanguageKind::from_path(&f.path), f.text.as_ref()) else {
            continue;
        };
        imports.extend(discover(lang, &f.path, text, &repo_files));
    }

    for import in &imports {
        if let ImportTarget::External(module) = &import.target {
            let ecosystem = match LanguageKind::from_path(&import.file) {
                Some(LanguageKind::Python) => "py",
                _ => "js",
            };
            libraries.push(symbol_index::libraries::discovered(module, ecosystem));
        }
    }
    let merged = merge_by_slug(libraries);
    t.set("libraries_total", merged.len() as i64);
    t.set("libraries_manifest", manifest_count as i64);

    for batch in merged.chunks(ctx.cfg.chunk_batch_size) {
        if ctx.stop_requested() {
            t.stopped_early = true;
            break;
        }
        let rows: Vec<Value> = batch
            .iter()
            .map(|l| {
                json!({
                    "slug": l.slug,
                    "display_name": l.display_name,
                    "ecosystem": l.ecosystem,
                    "version": l.version,
                    "source": l.source.as_str(),
                    "aliases": l.aliases.iter().collect::<Vec<_>>(),
                    "created_at": created_at,
                })
            })
            .collect();
        store.batch_upsert_nodes(NodeLabel::Library, &rows).await?;
    }

    // IMPORTS (repo-internal) and USES_LIBRARY (external) edges.
    let mut internal_rows = Vec::new();
    let mut library_rows = Vec::new();
    for import in &imports {
        match &import.target {
            ImportTarget::Internal(target) => internal_rows.push(json!({
                "from": import.file,
                "to": target,
                "props": {"created_at": created_at},
            })),
            ImportTarget::External(module) => library_rows.push(json!({
                "from": import.file,
                "to": module_to_slug(module),
                "props": {"created_at": created_at, "module": module},
            })),
        }
    }
    t.set("imports_internal", internal_rows.len() as i64);
    t.set("imports_external", library_rows.len() as i64);

    for batch in internal_rows.chunks(ctx.cfg.chunk_batch_size) {
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::Imports, NodeLabel::File, NodeLabel::File),
                batch,
            )
            .await?;
    }
    for batch in library_rows.chunks(ctx.cfg.chunk_batch_size) {
        store
            .batch_upsert_edges(
                EdgeSpec::new(EdgeType::UsesLibrary, NodeLabel::File, NodeLabel::Library),
                batch,
            )
            .await?;
    }

    info!(
        "symbols: {} symbol(s), {} library(ies), {} import(s)",
        symbols_written,
        merged.len(),
        imports.len()
    );
    artifacts.libraries = merged;
    artifacts.imports = imports;
    Ok(t.finish())
}

fn symbol_row(s: &SymbolRecord, created_at: &str) -> Value {
    json!({
        "uid": s.uid,
        "name": s.name,
        "kind": s.kind.as_str(),
        "language": s.language.as_str(),
        "file": s.file,
        "start_line": s.start_line,
        "end_line": s.end_line,
        "created_at": created_at,
    })
}
