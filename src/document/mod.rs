//! Canonical document tree: construction from normalized HTML and the
//! plain-text/statistics projections derived from it.

mod converter;
pub mod dom;
mod node;
mod text;

pub use converter::{convert_or_fallback, fallback_document, ConversionError, DomConverter, HtmlToTree};
pub use node::{DocNode, Mark, MarkKind, NodeKind};
pub use text::{count_document_stats, extract_text_from_json, DocumentStats};
