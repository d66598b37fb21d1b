//! Symbol, library and import extraction.
//!
//! Parses code files with Tree-sitter into [`SymbolRecord`]s, seeds
//! [`LibraryRecord`]s from dependency manifests and import discovery, and
//! resolves imports to repo-internal files where possible.

pub mod ast;
pub mod errors;
pub mod imports;
pub mod libraries;
pub mod types;

pub use ast::parse_symbols;
pub use errors::{Error, Result};
pub use imports::{ImportRecord, ImportTarget, discover};
pub use libraries::{
    LibraryRecord, LibrarySource, manifest_kind, merge_by_slug, module_to_slug, parse_package_json,
    parse_requirements, slugify,
};
pub use types::{LanguageKind, SymbolKind, SymbolRecord};
