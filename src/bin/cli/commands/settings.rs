use anyhow::{Context, Result};

use nous_import::import::{get_import_settings_path, save_import_settings};

use crate::app::App;
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat) -> Result<()> {
    save_import_settings(&app.data_dir, &app.settings).context("Failed to save import settings")?;
    let path = get_import_settings_path(&app.data_dir);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&app.settings)?),
        OutputFormat::Plain => {
            println!("{}", path.display());
            println!("  enexSizeLimit       {}", app.settings.enex_size_limit);
            println!("  onenoteSizeLimit    {}", app.settings.onenote_size_limit);
            println!("  maxZipEntryBytes    {}", app.settings.max_zip_entry_bytes);
            println!("  defaultNotebookName {}", app.settings.default_notebook_name);
            println!("  attachmentUrlPrefix {}", app.settings.attachment_url_prefix);
            println!("  maxTreeDepth        {}", app.settings.max_tree_depth);
        }
    }

    Ok(())
}
