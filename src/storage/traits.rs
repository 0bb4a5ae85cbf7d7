//! Persistence interfaces consumed by the import pipeline.
//!
//! The importer never touches the disk or a database directly; every write
//! goes through one of these traits so a host application can plug in its
//! own store. [`FileStorage`](super::FileStorage) implements all of them.

use async_trait::async_trait;
use uuid::Uuid;

use super::file_storage::Result;
use super::models::{NewNote, NoteCreation, Notebook, NotebookFilter, Tag};

/// Notebook lookup and creation.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// Find a notebook owned by `user_id` matching `filter`.
    async fn find_notebook(&self, user_id: Uuid, filter: &NotebookFilter)
        -> Result<Option<Notebook>>;

    /// Create a new notebook for `user_id`.
    async fn create_notebook(&self, user_id: Uuid, name: &str, vault: bool) -> Result<Notebook>;
}

/// Tag find-or-create.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Return the tag named exactly `name` in the user's vault scope,
    /// creating it if missing.
    async fn find_or_create_tag(&self, user_id: Uuid, name: &str, vault: bool) -> Result<Tag>;
}

/// Atomic note creation.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Persist a note together with its tags and attachments.
    ///
    /// A note whose id already exists is returned as
    /// [`NoteCreation::Existing`] instead of failing.
    async fn create_note(&self, note: NewNote) -> Result<NoteCreation>;
}

/// Binary resource storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `storage_key`. Keys are never reused.
    async fn write_blob(&self, storage_key: &str, bytes: &[u8]) -> Result<()>;
}
