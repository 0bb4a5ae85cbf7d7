use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentStats;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub vault: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notebook {
    pub fn new(owner_id: Uuid, name: String, vault: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            vault,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a notebook is looked up for an import batch
#[derive(Debug, Clone, PartialEq)]
pub enum NotebookFilter {
    /// An explicit notebook, which must be owned by the user
    Id(Uuid),
    /// A notebook with exactly this name in the given vault scope
    Named { name: String, vault: bool },
    /// The user's oldest notebook in the given vault scope
    First { vault: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub vault: bool,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(owner_id: Uuid, name: String, vault: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            vault,
            created_at: Utc::now(),
        }
    }
}

/// An attachment persisted for a note.
///
/// `storage_key` is globally unique; `filename` is display metadata only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredResource {
    pub storage_key: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Everything needed to create a note in a single call
#[derive(Debug, Clone)]
pub struct NewNote {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub notebook_id: Uuid,
    pub title: String,
    /// Serialized canonical document tree
    pub content: String,
    pub search_text: String,
    pub stats: DocumentStats,
    pub tag_ids: Vec<Uuid>,
    pub attachments: Vec<StoredResource>,
    pub vault: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub notebook_id: Uuid,
    pub title: String,
    pub content: String,
    pub search_text: String,
    #[serde(default)]
    pub stats: DocumentStats,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub attachments: Vec<StoredResource>,
    #[serde(default)]
    pub vault: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NewNote> for Note {
    fn from(new: NewNote) -> Self {
        Self {
            id: new.id,
            owner_id: new.owner_id,
            notebook_id: new.notebook_id,
            title: new.title,
            content: new.content,
            search_text: new.search_text,
            stats: new.stats,
            tag_ids: new.tag_ids,
            attachments: new.attachments,
            vault: new.vault,
            created_at: new.created_at,
            updated_at: new.updated_at,
        }
    }
}

/// Outcome of a note creation call. Both variants count as success.
#[derive(Debug, Clone)]
pub enum NoteCreation {
    Created(Note),
    /// A note with the same id already existed and was returned unchanged
    Existing(Note),
}

impl NoteCreation {
    pub fn note(&self) -> &Note {
        match self {
            NoteCreation::Created(note) | NoteCreation::Existing(note) => note,
        }
    }
}
