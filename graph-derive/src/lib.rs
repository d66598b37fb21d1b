//! Evidence-based relationship derivation and cross-reference scanning.

pub mod evidence;
pub mod strategies;
pub mod xref;

pub use evidence::{
    DerivedEdge, Evidence, EvidenceAccumulator, EvidenceKind, RelKind, combine,
};
pub use strategies::{
    ChunkInput, CommitInput, RequirementRecord, apply_code_comments, apply_commit_mentions,
    apply_depends_on, apply_doc_mentions, apply_evolves, collect_requirements,
    find_requirement_ids,
};
pub use xref::{
    MIN_SYMBOL_TOKEN, MentionHit, cap_top_k, co_occurrence, doc_commit_mentions,
    doc_file_mentions, eligible_symbol_name,
};
