//! Graph schema: node labels, edge types, constraints and indexes.
//!
//! Labels and edge types are closed enums so stage code cannot invent ad-hoc
//! strings; the upsert statements are generated from them.

use serde::{Deserialize, Serialize};

/// Fulltext index over `Chunk.text`.
pub const CHUNK_TEXT_INDEX: &str = "chunk_text_ft";
/// Fulltext index over `{File.path, Symbol.name, Library.display_name}`.
pub const ENTITY_NAME_INDEX: &str = "entity_name_ft";

/// Every node label the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLabel {
    Commit,
    File,
    Chunk,
    Document,
    Symbol,
    Library,
    Requirement,
    Sprint,
    Author,
    PipelineState,
    DerivationWatermark,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Commit => "Commit",
            NodeLabel::File => "File",
            NodeLabel::Chunk => "Chunk",
            NodeLabel::Document => "Document",
            NodeLabel::Symbol => "Symbol",
            NodeLabel::Library => "Library",
            NodeLabel::Requirement => "Requirement",
            NodeLabel::Sprint => "Sprint",
            NodeLabel::Author => "Author",
            NodeLabel::PipelineState => "PipelineState",
            NodeLabel::DerivationWatermark => "DerivationWatermark",
        }
    }

    /// The merge key property for this label.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Commit => "hash",
            NodeLabel::File | NodeLabel::Document => "path",
            NodeLabel::Chunk => "id",
            NodeLabel::Symbol => "uid",
            NodeLabel::Library => "slug",
            NodeLabel::Requirement => "id",
            NodeLabel::Sprint => "number",
            NodeLabel::Author => "email",
            NodeLabel::PipelineState => "id",
            NodeLabel::DerivationWatermark => "family",
        }
    }

    /// Labels excluded from orphan auditing (bookkeeping nodes).
    pub fn is_system(&self) -> bool {
        matches!(self, NodeLabel::PipelineState | NodeLabel::DerivationWatermark)
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every relationship type the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    PartOf,
    ContainsChunk,
    DefinedIn,
    ContainsDoc,
    Includes,
    Touched,
    NextCommit,
    PrevCommit,
    InvolvesFile,
    Authored,
    MentionsSymbol,
    MentionsLibrary,
    MentionsFile,
    MentionsCommit,
    UsesLibrary,
    Imports,
    CoOccursWith,
    Implements,
    EvolvesFrom,
    DependsOn,
    RelatesTo,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::PartOf => "PART_OF",
            EdgeType::ContainsChunk => "CONTAINS_CHUNK",
            EdgeType::DefinedIn => "DEFINED_IN",
            EdgeType::ContainsDoc => "CONTAINS_DOC",
            EdgeType::Includes => "INCLUDES",
            EdgeType::Touched => "TOUCHED",
            EdgeType::NextCommit => "NEXT_COMMIT",
            EdgeType::PrevCommit => "PREV_COMMIT",
            EdgeType::InvolvesFile => "INVOLVES_FILE",
            EdgeType::Authored => "AUTHORED",
            EdgeType::MentionsSymbol => "MENTIONS_SYMBOL",
            EdgeType::MentionsLibrary => "MENTIONS_LIBRARY",
            EdgeType::MentionsFile => "MENTIONS_FILE",
            EdgeType::MentionsCommit => "MENTIONS_COMMIT",
            EdgeType::UsesLibrary => "USES_LIBRARY",
            EdgeType::Imports => "IMPORTS",
            EdgeType::CoOccursWith => "CO_OCCURS_WITH",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::EvolvesFrom => "EVOLVES_FROM",
            EdgeType::DependsOn => "DEPENDS_ON",
            EdgeType::RelatesTo => "RELATES_TO",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint description for a batched edge upsert: the edge type plus the
/// labels and key properties used to match both ends.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSpec {
    pub edge: EdgeType,
    pub from: NodeLabel,
    pub to: NodeLabel,
}

impl EdgeSpec {
    pub fn new(edge: EdgeType, from: NodeLabel, to: NodeLabel) -> Self {
        Self { edge, from, to }
    }

    /// UNWIND-style MERGE statement for this edge spec. Rows carry
    /// `{from, to, props}`; endpoints are matched (never created) so a
    /// missing endpoint drops the row instead of fabricating nodes.
    pub fn upsert_statement(&self) -> String {
        format!(
            "UNWIND $rows AS row \
             MATCH (a:{from} {{{fk}: row.from}}) \
             MATCH (b:{to} {{{tk}: row.to}}) \
             MERGE (a)-[r:{edge}]->(b) \
             SET r += row.props",
            from = self.from.as_str(),
            fk = self.from.key_property(),
            to = self.to.as_str(),
            tk = self.to.key_property(),
            edge = self.edge.as_str(),
        )
    }
}

/// UNWIND-style MERGE statement for a node label. Rows are flat property
/// objects that must include the label's key property.
pub fn node_upsert_statement(label: NodeLabel) -> String {
    format!(
        "UNWIND $rows AS row \
         MERGE (n:{label} {{{key}: row.{key}}}) \
         SET n += row",
        label = label.as_str(),
        key = label.key_property(),
    )
}

/// All idempotent schema statements: uniqueness constraints, range indexes on
/// edge timestamps, and the two fulltext indexes.
pub fn schema_statements() -> Vec<String> {
    let mut out = Vec::new();

    for label in [
        NodeLabel::Commit,
        NodeLabel::File,
        NodeLabel::Chunk,
        NodeLabel::Symbol,
        NodeLabel::Library,
        NodeLabel::Requirement,
        NodeLabel::Sprint,
        NodeLabel::Author,
    ] {
        out.push(format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
            name = format!("uniq_{}_{}", label.as_str().to_lowercase(), label.key_property()),
            label = label.as_str(),
            key = label.key_property(),
        ));
    }

    for edge in [
        EdgeType::Touched,
        EdgeType::NextCommit,
        EdgeType::PrevCommit,
        EdgeType::InvolvesFile,
    ] {
        out.push(format!(
            "CREATE INDEX idx_{lower}_timestamp IF NOT EXISTS FOR ()-[r:{edge}]-() ON (r.timestamp)",
            lower = edge.as_str().to_lowercase(),
            edge = edge.as_str(),
        ));
    }
    out.push(String::from(
        "CREATE INDEX idx_edge_created_at IF NOT EXISTS FOR ()-[r:IMPLEMENTS]-() ON (r.created_at)",
    ));

    out.push(format!(
        "CREATE FULLTEXT INDEX {CHUNK_TEXT_INDEX} IF NOT EXISTS FOR (c:Chunk) ON EACH [c.text]"
    ));
    out.push(format!(
        "CREATE FULLTEXT INDEX {ENTITY_NAME_INDEX} IF NOT EXISTS \
         FOR (n:File|Symbol|Library) ON EACH [n.path, n.name, n.display_name]"
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_statement_merges_on_key() {
        let stmt = node_upsert_statement(NodeLabel::File);
        assert!(stmt.contains("MERGE (n:File {path: row.path})"));
        assert!(stmt.contains("SET n += row"));
    }

    #[test]
    fn edge_statement_matches_both_ends() {
        let spec = EdgeSpec::new(EdgeType::DefinedIn, NodeLabel::Symbol, NodeLabel::File);
        let stmt = spec.upsert_statement();
        assert!(stmt.contains("MATCH (a:Symbol {uid: row.from})"));
        assert!(stmt.contains("MATCH (b:File {path: row.to})"));
        assert!(stmt.contains("MERGE (a)-[r:DEFINED_IN]->(b)"));
    }

    #[test]
    fn schema_covers_all_keyed_labels() {
        let stmts = schema_statements();
        for needle in ["Commit", "File", "Chunk", "Symbol", "Library", "Requirement", "Sprint"] {
            assert!(
                stmts.iter().any(|s| s.contains(&format!("(n:{needle})"))),
                "missing constraint for {needle}"
            );
        }
        assert!(stmts.iter().any(|s| s.contains("FULLTEXT INDEX chunk_text_ft")));
    }
}
