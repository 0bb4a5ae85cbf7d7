use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{NewNote, Note, NoteCreation, Notebook, NotebookFilter, Tag};
use super::traits::{BlobStore, NoteStore, NotebookStore, TagStore};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notebook not found: {0}")]
    NotebookNotFound(Uuid),

    #[error("Data directory not found")]
    DataDirNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// File-backed store for notebooks, notes, tags and attachment blobs.
///
/// Layout under `base_path`:
///
/// ```text
/// notebooks/<id>/notebook.json
/// notebooks/<id>/notes/<note-id>.json
/// tags.json
/// attachments/<storage-key>
/// ```
pub struct FileStorage {
    base_path: PathBuf,
    // Serializes read-modify-write of tags.json
    tags_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            tags_lock: Mutex::new(()),
        }
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|p| p.join("nous-import"))
            .ok_or(StorageError::DataDirNotFound)
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(self.notebooks_dir()).await?;
        fs::create_dir_all(self.attachments_dir()).await?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn notebooks_dir(&self) -> PathBuf {
        self.base_path.join("notebooks")
    }

    fn notebook_dir(&self, notebook_id: Uuid) -> PathBuf {
        self.notebooks_dir().join(notebook_id.to_string())
    }

    fn notebook_metadata_path(&self, notebook_id: Uuid) -> PathBuf {
        self.notebook_dir(notebook_id).join("notebook.json")
    }

    fn notes_dir(&self, notebook_id: Uuid) -> PathBuf {
        self.notebook_dir(notebook_id).join("notes")
    }

    fn note_path(&self, notebook_id: Uuid, note_id: Uuid) -> PathBuf {
        self.notes_dir(notebook_id).join(format!("{}.json", note_id))
    }

    fn tags_path(&self) -> PathBuf {
        self.base_path.join("tags.json")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.base_path.join("attachments")
    }

    pub fn attachment_path(&self, storage_key: &str) -> PathBuf {
        self.attachments_dir().join(storage_key)
    }

    // ===== Notebook Operations =====

    pub async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        let notebooks_path = self.notebooks_dir();

        if !fs::try_exists(&notebooks_path).await? {
            return Ok(Vec::new());
        }

        let mut notebooks = Vec::new();
        let mut entries = fs::read_dir(&notebooks_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata_path = entry.path().join("notebook.json");
            if fs::try_exists(&metadata_path).await? {
                let content = fs::read_to_string(&metadata_path).await?;
                let notebook: Notebook = serde_json::from_str(&content)?;
                notebooks.push(notebook);
            }
        }

        // Oldest first, so "first notebook" is stable
        notebooks.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(notebooks)
    }

    pub async fn get_notebook(&self, notebook_id: Uuid) -> Result<Notebook> {
        let metadata_path = self.notebook_metadata_path(notebook_id);

        if !fs::try_exists(&metadata_path).await? {
            return Err(StorageError::NotebookNotFound(notebook_id));
        }

        let content = fs::read_to_string(&metadata_path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    // ===== Note Operations =====

    pub async fn list_notes(&self, notebook_id: Uuid) -> Result<Vec<Note>> {
        let notes_dir = self.notes_dir(notebook_id);

        if !fs::try_exists(&notes_dir).await? {
            return Ok(Vec::new());
        }

        let mut notes = Vec::new();
        let mut entries = fs::read_dir(&notes_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path).await?;
                let note: Note = serde_json::from_str(&content)?;
                notes.push(note);
            }
        }

        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(notes)
    }

    pub async fn get_note(&self, notebook_id: Uuid, note_id: Uuid) -> Result<Note> {
        let path = self.note_path(notebook_id, note_id);

        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(format!("note {}", note_id)));
        }

        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    // ===== Tag Operations =====

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let path = self.tags_path();

        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save_tags(&self, tags: &[Tag]) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let content = serde_json::to_string_pretty(tags)?;
        fs::write(self.tags_path(), content).await?;
        Ok(())
    }
}

#[async_trait]
impl NotebookStore for FileStorage {
    async fn find_notebook(
        &self,
        user_id: Uuid,
        filter: &NotebookFilter,
    ) -> Result<Option<Notebook>> {
        if let NotebookFilter::Id(id) = filter {
            return match self.get_notebook(*id).await {
                Ok(notebook) if notebook.owner_id == user_id => Ok(Some(notebook)),
                Ok(_) | Err(StorageError::NotebookNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            };
        }

        let notebooks = self.list_notebooks().await?;
        let found = notebooks.into_iter().find(|nb| {
            nb.owner_id == user_id
                && match filter {
                    NotebookFilter::Named { name, vault } => nb.name == *name && nb.vault == *vault,
                    NotebookFilter::First { vault } => nb.vault == *vault,
                    NotebookFilter::Id(_) => false,
                }
        });

        Ok(found)
    }

    async fn create_notebook(&self, user_id: Uuid, name: &str, vault: bool) -> Result<Notebook> {
        let notebook = Notebook::new(user_id, name.to_string(), vault);

        let notebook_dir = self.notebook_dir(notebook.id);
        fs::create_dir_all(notebook_dir.join("notes")).await?;

        let notebook_json = serde_json::to_string_pretty(&notebook)?;
        fs::write(self.notebook_metadata_path(notebook.id), notebook_json).await?;

        log::info!("Created notebook \"{}\" ({})", notebook.name, notebook.id);
        Ok(notebook)
    }
}

#[async_trait]
impl TagStore for FileStorage {
    async fn find_or_create_tag(&self, user_id: Uuid, name: &str, vault: bool) -> Result<Tag> {
        let _guard = self.tags_lock.lock().await;

        let mut tags = self.list_tags().await?;
        if let Some(tag) = tags
            .iter()
            .find(|t| t.owner_id == user_id && t.name == name && t.vault == vault)
        {
            return Ok(tag.clone());
        }

        let tag = Tag::new(user_id, name.to_string(), vault);
        tags.push(tag.clone());
        self.save_tags(&tags).await?;
        Ok(tag)
    }
}

#[async_trait]
impl NoteStore for FileStorage {
    async fn create_note(&self, note: NewNote) -> Result<NoteCreation> {
        let notebook = self.get_notebook(note.notebook_id).await?;
        if notebook.owner_id != note.owner_id {
            return Err(StorageError::InvalidOperation(format!(
                "notebook {} is not owned by {}",
                notebook.id, note.owner_id
            )));
        }

        let path = self.note_path(note.notebook_id, note.id);
        if fs::try_exists(&path).await? {
            let existing = self.get_note(note.notebook_id, note.id).await?;
            return Ok(NoteCreation::Existing(existing));
        }

        fs::create_dir_all(self.notes_dir(note.notebook_id)).await?;

        // Attachments are part of the note document, so they land in the same write
        let note = Note::from(note);
        let note_json = serde_json::to_string_pretty(&note)?;
        fs::write(&path, note_json).await?;

        Ok(NoteCreation::Created(note))
    }
}

#[async_trait]
impl BlobStore for FileStorage {
    async fn write_blob(&self, storage_key: &str, bytes: &[u8]) -> Result<()> {
        if storage_key.is_empty() || storage_key.contains(['/', '\\']) || storage_key.starts_with('.')
        {
            return Err(StorageError::InvalidOperation(format!(
                "invalid storage key: {:?}",
                storage_key
            )));
        }

        fs::create_dir_all(self.attachments_dir()).await?;
        fs::write(self.attachment_path(storage_key), bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStats;
    use chrono::Utc;
    use tempfile::TempDir;

    fn new_note(owner_id: Uuid, notebook_id: Uuid, id: Uuid, title: &str) -> NewNote {
        let now = Utc::now();
        NewNote {
            id,
            owner_id,
            notebook_id,
            title: title.to_string(),
            content: r#"{"type":"doc","content":[{"type":"paragraph"}]}"#.to_string(),
            search_text: String::new(),
            stats: DocumentStats::default(),
            tag_ids: Vec::new(),
            attachments: Vec::new(),
            vault: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_notebook() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        storage.init().await.unwrap();

        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let created = storage.create_notebook(user, "Imports", false).await.unwrap();

        let by_id = storage
            .find_notebook(user, &NotebookFilter::Id(created.id))
            .await
            .unwrap();
        assert_eq!(by_id, Some(created.clone()));

        // Not visible to another user
        let foreign = storage
            .find_notebook(other, &NotebookFilter::Id(created.id))
            .await
            .unwrap();
        assert!(foreign.is_none());

        let named = storage
            .find_notebook(
                user,
                &NotebookFilter::Named {
                    name: "Imports".to_string(),
                    vault: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(named.map(|n| n.id), Some(created.id));

        let vault_first = storage
            .find_notebook(user, &NotebookFilter::First { vault: true })
            .await
            .unwrap();
        assert!(vault_first.is_none());
    }

    #[tokio::test]
    async fn test_find_or_create_tag_is_case_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        let user = Uuid::new_v4();

        let a = storage.find_or_create_tag(user, "Work", false).await.unwrap();
        let b = storage.find_or_create_tag(user, "Work", false).await.unwrap();
        let c = storage.find_or_create_tag(user, "work", false).await.unwrap();
        let d = storage.find_or_create_tag(user, "Work", true).await.unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_ne!(a.id, d.id);
        assert_eq!(storage.list_tags().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_note_returns_existing_on_duplicate_id() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        let user = Uuid::new_v4();
        let notebook = storage.create_notebook(user, "Imports", false).await.unwrap();
        let id = Uuid::new_v4();

        let first = storage
            .create_note(new_note(user, notebook.id, id, "First"))
            .await
            .unwrap();
        assert!(matches!(first, NoteCreation::Created(_)));

        let second = storage
            .create_note(new_note(user, notebook.id, id, "Second"))
            .await
            .unwrap();
        match second {
            NoteCreation::Existing(note) => assert_eq!(note.title, "First"),
            other => panic!("expected existing note, got {:?}", other),
        }

        assert_eq!(storage.list_notes(notebook.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_note_rejects_foreign_notebook() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());
        let owner = Uuid::new_v4();
        let notebook = storage.create_notebook(owner, "Imports", false).await.unwrap();

        let result = storage
            .create_note(new_note(Uuid::new_v4(), notebook.id, Uuid::new_v4(), "x"))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidOperation(_))));
    }

    #[tokio::test]
    async fn test_write_blob() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf());

        storage.write_blob("abc.png", b"\x89PNG").await.unwrap();
        let written = std::fs::read(storage.attachment_path("abc.png")).unwrap();
        assert_eq!(written, b"\x89PNG");

        assert!(storage.write_blob("../escape.png", b"x").await.is_err());
        assert!(storage.write_blob("", b"x").await.is_err());
    }
}
