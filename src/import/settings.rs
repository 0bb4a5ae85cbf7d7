use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::Result;

const MIB: u64 = 1024 * 1024;

/// Tunables for the import pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSettings {
    /// Maximum ENEX upload size in bytes
    pub enex_size_limit: u64,
    /// Maximum OneNote (MHT/HTML/ZIP) upload size in bytes
    pub onenote_size_limit: u64,
    /// Maximum decompressed size of a single ZIP entry
    pub max_zip_entry_bytes: u64,
    /// Notebook used when the caller names none
    pub default_notebook_name: String,
    /// Prefix of URLs pointing at persisted attachments
    pub attachment_url_prefix: String,
    /// Nesting depth at which tree conversion gives up
    pub max_tree_depth: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            enex_size_limit: 10 * MIB,
            onenote_size_limit: 50 * MIB,
            max_zip_entry_bytes: 50 * MIB,
            default_notebook_name: "Imports".to_string(),
            attachment_url_prefix: "/attachments/".to_string(),
            max_tree_depth: 512,
        }
    }
}

/// Get the import settings file path
pub fn get_import_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("import_settings.json")
}

/// Load import settings from file, falling back to defaults
pub fn load_import_settings(data_dir: &Path) -> Result<ImportSettings> {
    let settings_path = get_import_settings_path(data_dir);

    if !settings_path.exists() {
        return Ok(ImportSettings::default());
    }

    let content = fs::read_to_string(&settings_path)?;
    let settings: ImportSettings = serde_json::from_str(&content)?;
    Ok(settings)
}

/// Save import settings to file
pub fn save_import_settings(data_dir: &Path, settings: &ImportSettings) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(get_import_settings_path(data_dir), content)?;
    Ok(())
}
