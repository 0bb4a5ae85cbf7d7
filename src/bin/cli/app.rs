use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use nous_import::import::{load_import_settings, ImportSettings};
use nous_import::storage::{FileStorage, Note, Notebook};

/// Shared application state for CLI commands
pub struct App {
    pub data_dir: PathBuf,
    pub storage: FileStorage,
    pub settings: ImportSettings,
    pub user_id: Uuid,
}

impl App {
    pub async fn new(data_dir: Option<PathBuf>, user_id: Option<Uuid>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => FileStorage::default_data_dir().context("Failed to get data directory")?,
        };

        let storage = FileStorage::new(data_dir.clone());
        storage
            .init()
            .await
            .context("Failed to initialize storage")?;

        let settings = load_import_settings(&data_dir).context("Failed to load import settings")?;

        Ok(Self {
            data_dir,
            storage,
            settings,
            // Single-user installs own everything under the nil id
            user_id: user_id.unwrap_or(Uuid::nil()),
        })
    }

    pub async fn notebooks(&self) -> Result<Vec<Notebook>> {
        let notebooks = self
            .storage
            .list_notebooks()
            .await
            .context("Failed to list notebooks")?;
        Ok(notebooks
            .into_iter()
            .filter(|nb| nb.owner_id == self.user_id)
            .collect())
    }

    /// Find a notebook by id or name (case-insensitive, exact before prefix)
    pub async fn find_notebook(&self, name: &str) -> Result<Notebook> {
        let notebooks = self.notebooks().await?;

        if let Ok(id) = Uuid::parse_str(name) {
            if let Some(nb) = notebooks.iter().find(|n| n.id == id) {
                return Ok(nb.clone());
            }
        }

        pick(&notebooks, name, "notebook", |n| &n.name)
    }

    /// Find a note by title within a notebook (case-insensitive, exact before prefix)
    pub async fn find_note(&self, notebook: &Notebook, title: &str) -> Result<Note> {
        let notes = self
            .storage
            .list_notes(notebook.id)
            .await
            .with_context(|| format!("Failed to list notes in '{}'", notebook.name))?;

        pick(&notes, title, "note", |n| &n.title)
    }
}

fn pick<T: Clone>(items: &[T], query: &str, what: &str, name: impl Fn(&T) -> &String) -> Result<T> {
    let query_lower = query.to_lowercase();

    if let Some(item) = items.iter().find(|i| name(i).to_lowercase() == query_lower) {
        return Ok(item.clone());
    }

    let matches: Vec<&T> = items
        .iter()
        .filter(|i| name(i).to_lowercase().starts_with(&query_lower))
        .collect();

    let listing = |list: &[&T]| {
        list.iter()
            .map(|i| format!("  - {}", name(i)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    match matches.len() {
        0 => bail!(
            "No {} matching '{}'. Available:\n{}",
            what,
            query,
            listing(&items.iter().collect::<Vec<_>>())
        ),
        1 => Ok(matches[0].clone()),
        _ => bail!(
            "Ambiguous {} name '{}'. Matches:\n{}",
            what,
            query,
            listing(&matches)
        ),
    }
}
