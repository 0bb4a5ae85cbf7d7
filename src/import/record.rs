use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;
use super::resources::ResourceMap;
use crate::evernote::EnexNote;

/// Which family of legacy markup a note came from. Selects the
/// format-specific normalization rules and resource addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFlavor {
    Enex,
    OneNote,
}

/// Container format of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Enex,
    Mht,
    Html,
    Zip,
}

impl ImportFormat {
    pub fn flavor(self) -> SourceFlavor {
        match self {
            ImportFormat::Enex => SourceFlavor::Enex,
            ImportFormat::Mht | ImportFormat::Html | ImportFormat::Zip => SourceFlavor::OneNote,
        }
    }
}

/// One note extracted from a container, ready for normalization
#[derive(Debug, Clone)]
pub struct ParsedNoteRecord {
    pub title: String,
    pub html: String,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Shared by every note of a ZIP export
    pub resources: Arc<ResourceMap>,
    /// Directory of the page inside an archive, for relative image paths
    pub base_dir: Option<String>,
    pub flavor: SourceFlavor,
}

impl ParsedNoteRecord {
    pub fn onenote(title: impl Into<String>, html: String, resources: Arc<ResourceMap>) -> Self {
        Self {
            title: title.into(),
            html,
            tags: Vec::new(),
            created_at: None,
            updated_at: None,
            resources,
            base_dir: None,
            flavor: SourceFlavor::OneNote,
        }
    }

    pub fn with_base_dir(mut self, base_dir: Option<String>) -> Self {
        self.base_dir = base_dir.filter(|dir| !dir.is_empty());
        self
    }
}

/// A note as found in a container, before any per-note decoding.
///
/// ENEX notes still hold their base64 resources; decoding them happens in
/// [`NoteSeed::into_record`] so a corrupt resource fails only its own note.
#[derive(Debug, Clone)]
pub enum NoteSeed {
    Parsed(ParsedNoteRecord),
    Enex(EnexNote),
}

impl NoteSeed {
    pub fn title(&self) -> &str {
        match self {
            NoteSeed::Parsed(record) => &record.title,
            NoteSeed::Enex(note) => &note.title,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            NoteSeed::Parsed(record) => &record.tags,
            NoteSeed::Enex(note) => &note.tags,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            NoteSeed::Parsed(record) => record.created_at,
            NoteSeed::Enex(note) => note.created,
        }
    }

    /// Whether the note carries or references any resource. A ZIP page
    /// shares its pool with its siblings, so only its own images count.
    pub fn has_attachments(&self) -> bool {
        match self {
            NoteSeed::Parsed(record) => {
                !record.resources.is_empty() && record.html.to_ascii_lowercase().contains("<img")
            }
            NoteSeed::Enex(note) => !note.resources.is_empty(),
        }
    }

    pub fn into_record(self) -> Result<ParsedNoteRecord> {
        match self {
            NoteSeed::Parsed(record) => Ok(record),
            NoteSeed::Enex(note) => note.into_record(),
        }
    }
}
