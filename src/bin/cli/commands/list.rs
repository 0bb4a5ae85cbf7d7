use anyhow::Result;

use crate::app::App;
use crate::OutputFormat;

pub async fn run(app: &App, format: &OutputFormat) -> Result<()> {
    let notebooks = app.notebooks().await?;

    let mut rows = Vec::new();
    for nb in &notebooks {
        let note_count = app.storage.list_notes(nb.id).await.map(|n| n.len()).unwrap_or(0);
        rows.push((nb, note_count));
    }

    match format {
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = rows
                .iter()
                .map(|(nb, count)| {
                    serde_json::json!({
                        "id": nb.id.to_string(),
                        "name": nb.name,
                        "vault": nb.vault,
                        "noteCount": count,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if rows.is_empty() {
                println!("No notebooks found in {}", app.data_dir.display());
                return Ok(());
            }
            for (nb, count) in &rows {
                let vault = if nb.vault { " [vault]" } else { "" };
                println!("{} ({} notes){}", nb.name, count, vault);
            }
        }
    }

    Ok(())
}
