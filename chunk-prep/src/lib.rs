//! Document and code chunking.

pub mod code;
pub mod doc;
pub mod types;

pub use code::{FALLBACK_OVERLAP_LINES, FALLBACK_WINDOW_LINES, chunk_code};
pub use doc::{chunk_document, document_title};
pub use types::{ChunkKind, ChunkRecord};
