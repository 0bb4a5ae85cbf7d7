use std::path::Path;

use anyhow::{Context, Result};

use nous_import::import::{ImportRequest, Importer};

use crate::app::App;
use crate::render::terminal::Color;
use crate::OutputFormat;

pub async fn run(
    app: &App,
    file: &Path,
    notebook: Option<&str>,
    vault: bool,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("Import path has no file name")?;

    let notebook_id = match notebook {
        Some(name) => Some(app.find_notebook(name).await?.id),
        None => None,
    };

    let request = ImportRequest {
        bytes,
        filename,
        user_id: app.user_id,
        notebook_id,
        vault,
    };

    let result = Importer::new(&app.storage, &app.settings)
        .import(&request)
        .await
        .with_context(|| format!("Failed to import {}", file.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Plain => {
            let skipped = result.total_found - result.imported_count;
            let summary = format!(
                "Imported {} of {} notes from {}",
                result.imported_count, result.total_found, request.filename
            );
            if use_color {
                let color = if skipped == 0 { Color::GREEN } else { Color::YELLOW };
                println!("{}{}{}", color, summary, Color::RESET);
            } else {
                println!("{}", summary);
            }
            if skipped > 0 {
                println!("{} notes were skipped; run with RUST_LOG=warn for details", skipped);
            }
        }
    }

    Ok(())
}
