//! Legacy note import
//!
//! Turns Evernote `.enex` exports and OneNote web exports into notes:
//! - Container detection and size limits
//! - HTML normalization into a strict subset
//! - Resource resolution and blob writes
//! - Conversion to the editor's document tree
//! - Per-note failure isolation with a batch summary

mod container;
pub mod decode;
mod error;
mod importer;
mod normalize;
mod preview;
mod record;
pub mod resources;
mod settings;

pub use container::{classify, parse_container, size_limit, validate, ParsedContainer};
pub use error::{ImportError, Result};
pub use importer::{ImportRequest, ImportResult, Importer};
pub use normalize::{normalize_html, prepare_note, PreparedNote};
pub use preview::{preview, ImportPreview, NotePreview};
pub use record::{ImportFormat, NoteSeed, ParsedNoteRecord, SourceFlavor};
pub use resources::{PendingResource, ResourceEntry, ResourceMap, ResourceResolver};
pub use settings::{
    get_import_settings_path, load_import_settings, save_import_settings, ImportSettings,
};
