//! Import orchestration: container in, persisted notes out.
//!
//! A request either fails as a whole (bad extension, oversized upload,
//! unreadable container, no usable notebook) or succeeds with a count of
//! the notes that made it. Everything that goes wrong inside a single note
//! is logged and skipped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::container::parse_container;
use super::error::{ImportError, Result};
use super::normalize::prepare_note;
use super::record::NoteSeed;
use super::resources::PendingResource;
use super::settings::ImportSettings;
use crate::document::{DomConverter, HtmlToTree};
use crate::storage::{
    BlobStore, NewNote, NoteCreation, NoteStore, Notebook, NotebookFilter, NotebookStore, TagStore,
};

/// An uploaded file and who it is for
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub user_id: Uuid,
    /// Target notebook; ignored unless it belongs to `user_id`
    pub notebook_id: Option<Uuid>,
    pub vault: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported_count: usize,
    pub total_found: usize,
}

pub struct Importer<'a, S> {
    store: &'a S,
    settings: &'a ImportSettings,
    converter: Box<dyn HtmlToTree + Send + Sync>,
}

impl<'a, S> Importer<'a, S>
where
    S: NotebookStore + TagStore + NoteStore + BlobStore,
{
    pub fn new(store: &'a S, settings: &'a ImportSettings) -> Self {
        Self {
            store,
            settings,
            converter: Box::new(DomConverter::new(settings.max_tree_depth)),
        }
    }

    /// Swap the HTML to tree converter
    pub fn with_converter(mut self, converter: Box<dyn HtmlToTree + Send + Sync>) -> Self {
        self.converter = converter;
        self
    }

    pub async fn import(&self, request: &ImportRequest) -> Result<ImportResult> {
        let container = parse_container(&request.bytes, &request.filename, self.settings)?;
        let total_found = container.seeds.len();

        log::info!(
            "Importing {} ({:?}, {} bytes): {} notes, {} resources",
            request.filename,
            container.format,
            request.bytes.len(),
            total_found,
            container.resource_count
        );
        for warning in &container.warnings {
            log::warn!("{}: {}", request.filename, warning);
        }

        if total_found == 0 {
            return Ok(ImportResult::default());
        }

        let notebook = self.resolve_notebook(request).await?;
        log::debug!("Importing into notebook \"{}\" ({})", notebook.name, notebook.id);

        let mut imported_count = 0;
        for (index, seed) in container.seeds.into_iter().enumerate() {
            let title = display_title(seed.title());
            match self.import_note(seed, index, &notebook, request).await {
                Ok(NoteCreation::Created(note)) => {
                    log::debug!("Imported \"{}\" as {}", note.title, note.id);
                    imported_count += 1;
                }
                Ok(NoteCreation::Existing(note)) => {
                    log::debug!("\"{}\" was already imported as {}", note.title, note.id);
                    imported_count += 1;
                }
                Err(e) => {
                    let error = ImportError::for_note(&title, e);
                    log::warn!("Skipping note: {} ({})", error, error_chain(&error));
                }
            }
        }

        log::info!(
            "Imported {}/{} notes from {} into \"{}\"",
            imported_count,
            total_found,
            request.filename,
            notebook.name
        );

        Ok(ImportResult {
            imported_count,
            total_found,
        })
    }

    /// The requested notebook if the user owns it, else the default import
    /// notebook, else the user's first notebook, else a new default one.
    async fn resolve_notebook(&self, request: &ImportRequest) -> Result<Notebook> {
        if let Some(id) = request.notebook_id {
            if let Some(notebook) = self
                .store
                .find_notebook(request.user_id, &NotebookFilter::Id(id))
                .await?
            {
                return Ok(notebook);
            }
            log::warn!(
                "Notebook {} is not available to user {}, using the default",
                id,
                request.user_id
            );
        }

        let name = &self.settings.default_notebook_name;
        let fallbacks = [
            NotebookFilter::Named {
                name: name.clone(),
                vault: request.vault,
            },
            NotebookFilter::First {
                vault: request.vault,
            },
        ];
        for filter in &fallbacks {
            if let Some(notebook) = self.store.find_notebook(request.user_id, filter).await? {
                return Ok(notebook);
            }
        }

        Ok(self
            .store
            .create_notebook(request.user_id, name, request.vault)
            .await?)
    }

    async fn import_note(
        &self,
        seed: NoteSeed,
        index: usize,
        notebook: &Notebook,
        request: &ImportRequest,
    ) -> Result<NoteCreation> {
        let record = seed.into_record()?;
        let tag_ids = self.resolve_tags(&record.tags, request).await?;
        let prepared = prepare_note(&record, self.settings, &*self.converter)?;

        for resource in &prepared.resources {
            self.store
                .write_blob(&resource.storage_key, &resource.bytes)
                .await
                .map_err(|e| {
                    ImportError::ResourceWrite(format!("{}: {}", resource.storage_key, e))
                })?;
        }

        let title = display_title(&record.title);
        let created_at = record.created_at.unwrap_or_else(Utc::now);
        let updated_at = record.updated_at.unwrap_or(created_at);

        let note = NewNote {
            id: note_id(
                notebook.id,
                &request.filename,
                index,
                &title,
                record.created_at,
                &record.html,
            ),
            owner_id: request.user_id,
            notebook_id: notebook.id,
            title,
            content: prepared.content,
            search_text: prepared.search_text,
            stats: prepared.stats,
            tag_ids,
            attachments: prepared
                .resources
                .iter()
                .map(PendingResource::to_stored)
                .collect(),
            vault: request.vault,
            created_at,
            updated_at,
        };

        Ok(self.store.create_note(note).await?)
    }

    /// Trimmed, non-empty, first occurrence wins
    async fn resolve_tags(&self, names: &[String], request: &ImportRequest) -> Result<Vec<Uuid>> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for name in names {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name) {
                continue;
            }
            let tag = self
                .store
                .find_or_create_tag(request.user_id, name, request.vault)
                .await?;
            if !ids.contains(&tag.id) {
                ids.push(tag.id);
            }
        }

        Ok(ids)
    }
}

fn display_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

/// Stable per notebook, so importing the same export twice finds the notes
/// from the first run instead of duplicating them. The note's position in
/// its source file keeps identical notes within one export apart.
fn note_id(
    notebook_id: Uuid,
    source: &str,
    index: usize,
    title: &str,
    created_at: Option<DateTime<Utc>>,
    html: &str,
) -> Uuid {
    let created = created_at.map(|at| at.to_rfc3339()).unwrap_or_default();
    let key = format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        source, index, title, created, html
    );
    Uuid::new_v5(&notebook_id, key.as_bytes())
}

fn error_chain(error: &ImportError) -> String {
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes.join(": ")
}
